//! Commit path: tone allocation and entry writes

use crate::broker::Broker;
use crate::error::{BrokerError, Result};
use crate::id::LogId;
use crate::keys;
use crate::state::ActiveTopic;
use crate::tone::Tone;
use crate::txn::{Staged, Transaction};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One entry to append
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEntry {
    pub topic: String,
    pub body: String,
}

impl NewEntry {
    pub fn new(topic: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            body: body.into(),
        }
    }
}

/// A commit call carries either one entry or a list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Commit {
    Single(NewEntry),
    Batch(Vec<NewEntry>),
}

impl From<NewEntry> for Commit {
    fn from(entry: NewEntry) -> Self {
        Commit::Single(entry)
    }
}

impl From<Vec<NewEntry>> for Commit {
    fn from(entries: Vec<NewEntry>) -> Self {
        Commit::Batch(entries)
    }
}

/// Ids assigned by a commit, shaped like the request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Committed {
    Single(LogId),
    Batch(Vec<LogId>),
}

impl Committed {
    pub fn ids(&self) -> &[LogId] {
        match self {
            Committed::Single(id) => std::slice::from_ref(id),
            Committed::Batch(ids) => ids,
        }
    }
}

impl Broker {
    /// Validate and stage a commit without writing it
    ///
    /// Every entry of the call shares one timestamp and one batch. Tones are
    /// allocated per topic in input order.
    pub fn stage_commit(&self, commit: impl Into<Commit>) -> Result<Staged<Committed>> {
        let (entries, single) = match commit.into() {
            Commit::Single(entry) => (vec![entry], true),
            Commit::Batch(entries) => (entries, false),
        };
        if entries.is_empty() {
            return Err(BrokerError::InvalidLogFormat);
        }
        for entry in &entries {
            if !keys::is_valid_name(&entry.topic) {
                return Err(BrokerError::InvalidTopicFormat);
            }
            if entry.body.is_empty() {
                return Err(BrokerError::InvalidLogFormat);
            }
        }

        let now = self.now();
        let mut txn = Transaction::new();
        let mut tones: BTreeMap<String, Tone> = BTreeMap::new();
        let mut new_topics = Vec::new();
        let mut ids = Vec::with_capacity(entries.len());

        for NewEntry { topic, body } in entries {
            let previous = match tones.get(&topic) {
                Some(tone) => *tone,
                None => {
                    if !self.state.topics.contains_key(&topic) {
                        txn.put(keys::active_topic_key(&topic), now.to_string());
                        new_topics.push(topic.clone());
                    }
                    self.state.current_tone(&topic)
                }
            };
            let tone = previous.next();
            let id = LogId::new(now, tone);
            let key = keys::entry_key(&topic, &id);

            txn.put(key.clone(), body);
            txn.put(keys::id_index_key(&topic, tone), key);
            tones.insert(topic, tone);
            ids.push(id);
        }
        for (topic, tone) in &tones {
            txn.put(keys::current_tone_key(topic), tone.to_string());
        }

        Ok(Staged::new(txn, move |state| {
            for topic in new_topics {
                state
                    .topics
                    .insert(topic.clone(), ActiveTopic::new(topic, now));
            }
            for (topic, tone) in tones {
                if let Some(active) = state.topics.get_mut(&topic) {
                    active.current_tone = tone;
                }
            }
            tracing::debug!("Committed {} entries at {}", ids.len(), now);
            if single && ids.len() == 1 {
                Committed::Single(ids[0])
            } else {
                Committed::Batch(ids)
            }
        }))
    }

    /// Append one entry or a batch of entries
    pub fn commit(&mut self, commit: impl Into<Commit>) -> Result<Committed> {
        let staged = self.stage_commit(commit)?;
        self.apply(staged)?.ok_or(BrokerError::InvalidLogFormat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::BrokerConfig;
    use proven_kvstore::MemoryStore;
    use std::sync::Arc;

    fn broker() -> Broker {
        Broker::open(
            Arc::new(MemoryStore::new()),
            Arc::new(ManualClock::new(1_700_000_000_000)),
            BrokerConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_tones_start_at_one_and_share_the_timestamp() {
        let mut broker = broker();
        let committed = broker
            .commit(vec![
                NewEntry::new("t", r#"{"a":1}"#),
                NewEntry::new("t", r#"{"a":2}"#),
            ])
            .unwrap();

        let ids: Vec<String> = committed.ids().iter().map(|id| id.to_string()).collect();
        assert_eq!(
            ids,
            vec![
                "1700000000000-0000000000000001",
                "1700000000000-0000000000000002"
            ]
        );
        assert_eq!(broker.current_tone("t"), Tone::new(2));
    }

    #[test]
    fn test_single_commit_returns_single_id() {
        let mut broker = broker();
        let committed = broker.commit(NewEntry::new("t", "x")).unwrap();
        assert!(matches!(committed, Committed::Single(id) if id.tone == Tone::new(1)));
    }

    #[test]
    fn test_tones_are_per_topic() {
        let mut broker = broker();
        broker
            .commit(vec![
                NewEntry::new("a", "1"),
                NewEntry::new("b", "1"),
                NewEntry::new("a", "2"),
            ])
            .unwrap();
        assert_eq!(broker.current_tone("a"), Tone::new(2));
        assert_eq!(broker.current_tone("b"), Tone::new(1));
    }

    #[test]
    fn test_validation_happens_before_writes() {
        let mut broker = broker();
        assert!(matches!(
            broker.commit(NewEntry::new("", "x")),
            Err(BrokerError::InvalidTopicFormat)
        ));
        assert!(matches!(
            broker.commit(NewEntry::new("a#b", "x")),
            Err(BrokerError::InvalidTopicFormat)
        ));
        assert!(matches!(
            broker.commit(vec![NewEntry::new("t", "ok"), NewEntry::new("t", "")]),
            Err(BrokerError::InvalidLogFormat)
        ));
        assert!(matches!(
            broker.commit(Vec::<NewEntry>::new()),
            Err(BrokerError::InvalidLogFormat)
        ));
        assert!(broker.topics().is_empty());
    }
}
