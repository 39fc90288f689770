//! Integration tests for the range query engine

use proven_broker::{Broker, BrokerConfig, BrokerError, LogId, ManualClock, NewEntry, RangeQuery};
use proven_kvstore::MemoryStore;
use std::sync::Arc;

const T0: u64 = 1_700_000_000_000;

/// Five entries on "t", one per millisecond starting at `T0`
fn seeded() -> (Broker, Vec<LogId>) {
    let clock = Arc::new(ManualClock::new(T0));
    let mut broker = Broker::open(
        Arc::new(MemoryStore::new()),
        clock.clone(),
        BrokerConfig::default(),
    )
    .unwrap();

    let mut ids = Vec::new();
    for i in 0..5 {
        let committed = broker.commit(NewEntry::new("t", format!("e{i}"))).unwrap();
        ids.push(committed.ids()[0]);
        clock.advance(1);
    }
    (broker, ids)
}

fn read(broker: &Broker, query: RangeQuery) -> Vec<LogId> {
    broker
        .range(&query)
        .unwrap()
        .into_iter()
        .map(|e| e.id)
        .collect()
}

#[test]
fn test_open_range_returns_everything_in_order() {
    let (broker, ids) = seeded();
    assert_eq!(read(&broker, RangeQuery::new("t")), ids);

    let mut reversed = ids.clone();
    reversed.reverse();
    assert_eq!(read(&broker, RangeQuery::new("t").reverse(true)), reversed);
}

#[test]
fn test_inclusive_and_exclusive_bounds() {
    let (broker, ids) = seeded();
    let (id2, id3, id4) = (ids[1], ids[2], ids[3]);

    let inclusive = RangeQuery::new("t")
        .start(id2.to_string())
        .end(id4.to_string());
    assert_eq!(read(&broker, inclusive.clone()), vec![id2, id3, id4]);
    assert_eq!(read(&broker, inclusive.exclusive(true)), vec![id3]);
}

#[test]
fn test_reverse_takes_start_as_upper_bound() {
    let (broker, ids) = seeded();
    let (id2, id3, id4) = (ids[1], ids[2], ids[3]);

    let query = RangeQuery::new("t")
        .start(id4.to_string())
        .end(id2.to_string())
        .reverse(true);
    assert_eq!(read(&broker, query.clone()), vec![id4, id3, id2]);
    assert_eq!(read(&broker, query.exclusive(true)), vec![id3]);
}

#[test]
fn test_limit() {
    let (broker, ids) = seeded();
    assert_eq!(read(&broker, RangeQuery::new("t").limit(2)), ids[..2].to_vec());
    assert_eq!(
        read(&broker, RangeQuery::new("t").limit(2).reverse(true)),
        vec![ids[4], ids[3]]
    );
    assert_eq!(read(&broker, RangeQuery::new("t").limit(-1)).len(), 5);
    assert_eq!(read(&broker, RangeQuery::new("t").limit(0)).len(), 5);
}

#[test]
fn test_bare_timestamp_covers_the_whole_millisecond() {
    let clock = Arc::new(ManualClock::new(T0));
    let mut broker = Broker::open(
        Arc::new(MemoryStore::new()),
        clock.clone(),
        BrokerConfig::default(),
    )
    .unwrap();
    broker
        .commit(vec![NewEntry::new("t", "a"), NewEntry::new("t", "b")])
        .unwrap();
    clock.advance(1);
    broker.commit(NewEntry::new("t", "c")).unwrap();

    let t0 = T0.to_string();
    let through_t0 = read(&broker, RangeQuery::new("t").end(t0.clone()));
    assert_eq!(through_t0.len(), 2);

    let after_t0 = read(&broker, RangeQuery::new("t").start(t0.clone()).exclusive(true));
    assert_eq!(after_t0.len(), 1);
    assert_eq!(after_t0[0].timestamp, T0 + 1);

    let before_next = read(
        &broker,
        RangeQuery::new("t")
            .end((T0 + 1).to_string())
            .exclusive(true),
    );
    assert_eq!(before_next.len(), 2);
}

#[test]
fn test_short_tone_is_zero_padded() {
    let (broker, ids) = seeded();
    let token = format!("{}-3", ids[2].timestamp);
    let found = read(&broker, RangeQuery::new("t").start(token.clone()).end(token));
    assert_eq!(found, vec![ids[2]]);
}

#[test]
fn test_sequence_tokens_use_the_id_index() {
    let (broker, ids) = seeded();
    let found = read(&broker, RangeQuery::new("t").start(":2").end(":4"));
    assert_eq!(found, ids[1..4].to_vec());

    assert!(matches!(
        broker.range(&RangeQuery::new("t").start(":99")),
        Err(BrokerError::InvalidToneIdSearch)
    ));
}

#[test]
fn test_inverted_range_is_empty() {
    let (broker, ids) = seeded();
    let query = RangeQuery::new("t")
        .start(ids[3].to_string())
        .end(ids[1].to_string());
    assert!(read(&broker, query).is_empty());
}

#[test]
fn test_validation_errors() {
    let (broker, _) = seeded();
    assert!(matches!(
        broker.range(&RangeQuery::new("missing")),
        Err(BrokerError::InvalidTopic)
    ));
    for token in ["abc", "12", "1700000000000-", ":x"] {
        assert!(matches!(
            broker.range(&RangeQuery::new("t").start(token)),
            Err(BrokerError::InvalidRangeOffset)
        ));
    }
    // Malformed tokens are rejected even for unknown topics
    assert!(matches!(
        broker.range(&RangeQuery::new("missing").end("nope")),
        Err(BrokerError::InvalidRangeOffset)
    ));
}

#[test]
fn test_topics_do_not_bleed_into_each_other() {
    let (mut broker, ids) = seeded();
    broker.commit(NewEntry::new("t2", "other")).unwrap();
    broker.commit(NewEntry::new("s", "other")).unwrap();

    assert_eq!(read(&broker, RangeQuery::new("t")), ids);
    assert_eq!(read(&broker, RangeQuery::new("t2")).len(), 1);
}
