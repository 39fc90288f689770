//! Integration tests for garbage collection

use proven_broker::{
    Broker, BrokerConfig, BrokerError, ManualClock, NewEntry, ProcOptions, RangeQuery, Tone,
};
use proven_kvstore::MemoryStore;
use std::sync::Arc;

const T0: u64 = 1_700_000_000_000;
const MIN_PRUNE: u64 = 1_000;

fn broker() -> (Broker, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(T0));
    let broker = Broker::open(
        Arc::new(MemoryStore::new()),
        clock.clone(),
        BrokerConfig::default().with_min_prune_time(MIN_PRUNE),
    )
    .unwrap();
    (broker, clock)
}

fn tones(broker: &Broker, topic: &str) -> Vec<u64> {
    broker
        .range(&RangeQuery::new(topic))
        .unwrap()
        .into_iter()
        .map(|e| e.id.tone.value())
        .collect()
}

fn commit_n(broker: &mut Broker, topic: &str, n: usize) {
    for i in 0..n {
        broker.commit(NewEntry::new(topic, format!("e{i}"))).unwrap();
    }
}

#[test]
fn test_topic_without_procs_expires_old_entries() {
    let (mut broker, clock) = broker();
    commit_n(&mut broker, "t", 2);
    clock.advance(5 * MIN_PRUNE);
    commit_n(&mut broker, "t", 1);

    let report = broker.collect_garbage().unwrap();
    assert_eq!(report.entries_deleted, 2);
    assert_eq!(tones(&broker, "t"), vec![3]);

    // Index entries went with the primary keys
    assert!(matches!(
        broker.range(&RangeQuery::new("t").start(":1")),
        Err(BrokerError::InvalidToneIdSearch)
    ));
    // The topic itself stays registered with its tone
    assert_eq!(broker.current_tone("t"), Tone::new(3));
}

#[test]
fn test_young_entries_survive() {
    let (mut broker, clock) = broker();
    commit_n(&mut broker, "t", 3);
    clock.advance(MIN_PRUNE);

    let report = broker.collect_garbage().unwrap();
    assert_eq!(report.entries_deleted, 0);
    assert_eq!(tones(&broker, "t"), vec![1, 2, 3]);
}

#[test]
fn test_acked_position_and_later_are_never_collected() {
    let (mut broker, clock) = broker();
    commit_n(&mut broker, "t", 5);
    let options = ProcOptions::new("p", "t");

    // Ack through entry 4
    for _ in 0..4 {
        broker.claim(&options).unwrap().unwrap();
        broker.ack("p").unwrap();
    }
    clock.advance(100 * MIN_PRUNE);

    broker.collect_garbage().unwrap();
    let remaining = tones(&broker, "t");
    assert!(!remaining.contains(&1));
    assert!(remaining.contains(&4) && remaining.contains(&5));

    // Previous claim is still protected so a reclaim can replay it
    assert!(remaining.contains(&3));
}

#[test]
fn test_watermark_is_the_slowest_proc() {
    let (mut broker, clock) = broker();
    commit_n(&mut broker, "t", 6);

    let fast = ProcOptions::new("fast", "t");
    for _ in 0..6 {
        broker.claim(&fast).unwrap().unwrap();
        broker.ack("fast").unwrap();
    }
    let slow = ProcOptions::new("slow", "t");
    broker.claim(&slow).unwrap().unwrap();
    broker.ack("slow").unwrap();

    clock.advance(100 * MIN_PRUNE);
    let report = broker.collect_garbage().unwrap();

    assert_eq!(report.entries_deleted, 0);
    assert_eq!(broker.gc_watermark("t"), Some(Tone::new(1)));
    assert_eq!(tones(&broker, "t").len(), 6);
}

#[test]
fn test_disabled_procs_do_not_hold_back_collection() {
    let (mut broker, clock) = broker();
    commit_n(&mut broker, "t", 3);
    broker.claim(&ProcOptions::new("p", "t")).unwrap().unwrap();
    broker.disable_proc("p").unwrap();

    clock.advance(100 * MIN_PRUNE);
    broker.collect_garbage().unwrap();

    assert!(tones(&broker, "t").is_empty());
    // The proc record itself is kept
    assert!(broker.inspect_proc("p").is_some());
}

#[test]
fn test_claims_skip_collected_gaps() {
    let (mut broker, clock) = broker();
    commit_n(&mut broker, "t", 2);
    clock.advance(5 * MIN_PRUNE);
    commit_n(&mut broker, "t", 1);
    broker.collect_garbage().unwrap();

    let claimed = broker
        .claim(&ProcOptions::new("late", "t"))
        .unwrap()
        .unwrap();
    assert_eq!(claimed.entries[0].id.tone, Tone::new(3));
}
