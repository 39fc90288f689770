//! Tests for the async single-writer service

use proven_broker::protocol::{CommitLog, EntryRequest, Reply, Request};
use proven_broker::{
    Broker, BrokerConfig, BrokerError, BrokerService, ManualClock, NewEntry, ProcOptions,
    RangeQuery, Tone,
};
use proven_kvstore::MemoryStore;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

const T0: u64 = 1_700_000_000_000;

fn broker(config: BrokerConfig) -> Broker {
    Broker::open(
        Arc::new(MemoryStore::new()),
        Arc::new(ManualClock::new(T0)),
        config,
    )
    .unwrap()
}

#[tokio::test]
async fn test_concurrent_commits_get_unique_gap_free_tones() {
    let handle = BrokerService::spawn(broker(BrokerConfig::default()));

    let mut tasks = Vec::new();
    for i in 0..50 {
        let handle = handle.clone();
        tasks.push(tokio::spawn(async move {
            handle.commit(NewEntry::new("t", format!("{i}"))).await
        }));
    }

    let mut tones = HashSet::new();
    for task in tasks {
        let committed = task.await.unwrap().unwrap();
        tones.insert(committed.ids()[0].tone.value());
    }
    assert_eq!(tones, (1..=50).collect::<HashSet<_>>());
    assert_eq!(handle.snapshot().current_tone("t"), Tone::new(50));

    handle.shutdown().await;
}

#[tokio::test]
async fn test_readers_see_published_snapshot() {
    let handle = BrokerService::spawn(broker(BrokerConfig::default()));

    handle
        .commit(vec![NewEntry::new("t", "a"), NewEntry::new("t", "b")])
        .await
        .unwrap();
    let entries = handle.range(&RangeQuery::new("t")).unwrap();
    assert_eq!(entries.len(), 2);

    handle.claim(ProcOptions::new("p", "t")).await.unwrap().unwrap();
    let proc = handle.inspect_proc("p").unwrap();
    assert!(proc.has_outstanding_claim());
    assert!(matches!(
        handle.inspect_proc("ghost"),
        Err(BrokerError::InvalidProc)
    ));

    handle.shutdown().await;
}

#[tokio::test]
async fn test_wait_for_procs_returns_once_caught_up() {
    let handle = BrokerService::spawn(broker(BrokerConfig::default().with_poll_interval(5)));
    handle
        .commit(vec![NewEntry::new("t", "a"), NewEntry::new("t", "b")])
        .await
        .unwrap();
    handle
        .claim(ProcOptions::new("p", "t").with_count(2))
        .await
        .unwrap()
        .unwrap();

    let names = vec!["p".to_string()];
    let pending = tokio::time::timeout(Duration::from_millis(50), handle.wait_for_procs(&names)).await;
    assert!(pending.is_err());

    let waiter = {
        let handle = handle.clone();
        let names = names.clone();
        tokio::spawn(async move { handle.wait_for_procs(&names).await })
    };
    handle.ack("p").await.unwrap();

    tokio::time::timeout(Duration::from_secs(5), waiter)
        .await
        .expect("wait_for_procs did not return")
        .unwrap();

    handle.shutdown().await;
}

#[tokio::test]
async fn test_gc_runs_on_the_timer() {
    let config = BrokerConfig::default()
        .with_gc_interval(10)
        .with_min_prune_time(0);
    let clock = Arc::new(ManualClock::new(T0));
    let broker = Broker::open(Arc::new(MemoryStore::new()), clock.clone(), config).unwrap();
    let handle = BrokerService::spawn(broker);

    handle.commit(NewEntry::new("t", "old")).await.unwrap();
    clock.advance(1);

    tokio::time::timeout(Duration::from_secs(5), async {
        while !handle.range(&RangeQuery::new("t")).unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("entry was not collected");

    handle.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_rejects_later_commands() {
    let handle = BrokerService::spawn(broker(BrokerConfig::default()));
    handle.commit(NewEntry::new("t", "a")).await.unwrap();

    handle.shutdown().await;
    assert!(handle.is_shutting_down());
    assert!(matches!(
        handle.commit(NewEntry::new("t", "b")).await,
        Err(BrokerError::BrokerStopped)
    ));
}

#[tokio::test]
async fn test_dispatch_goes_through_the_writer() {
    let handle = BrokerService::spawn(broker(BrokerConfig::default()));

    let reply = handle
        .dispatch(Request::Commit {
            log: CommitLog::One(EntryRequest {
                topic: "t".to_string(),
                body: serde_json::json!({"a": 1}),
            }),
        })
        .await;
    assert!(matches!(reply, Reply::Committed { .. }));

    let reply = handle
        .dispatch(Request::Ack {
            proc_name: "ghost".to_string(),
        })
        .await;
    assert_eq!(
        reply,
        Reply::Error {
            error: "invalid_proc".to_string()
        }
    );

    handle.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_awaited_writes_are_visible_to_snapshot_reads() {
    for i in 0..200 {
        let handle = BrokerService::spawn(broker(BrokerConfig::default()));
        let topic = format!("t{i}");

        handle.commit(NewEntry::new(topic.as_str(), "a")).await.unwrap();
        let entries = handle.range(&RangeQuery::new(topic.as_str())).unwrap();
        assert_eq!(entries.len(), 1);

        handle
            .claim(ProcOptions::new("p", topic.as_str()))
            .await
            .unwrap()
            .unwrap();
        let proc = handle.inspect_proc("p").unwrap();
        assert!(proc.has_outstanding_claim());

        handle.shutdown().await;
    }
}
