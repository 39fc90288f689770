//! Range queries over a topic's entries
//!
//! Tokens:
//!
//! * `""`: open end
//! * `<13 digits>`: every entry of that millisecond
//! * `<13 digits>-<1..16 digits>`: one id (tone zero padded)
//! * `:<1..16 digits>`: the entry holding that tone, resolved through the id
//!   index
//!
//! Bounds are inclusive unless `exclusive` is set. With `reverse` the `start`
//! token is the upper bound and iteration runs newest first.

use crate::error::{BrokerError, Result};
use crate::id::{LogId, TIMESTAMP_WIDTH};
use crate::keys;
use crate::state::ActiveTopic;
use crate::tone::Tone;
use proven_kvstore::{OrderedStore, ScanRange};
use serde::Serialize;
use std::collections::BTreeMap;
use std::ops::Bound;

/// One stored entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub id: LogId,
    pub body: String,
}

/// A parsed `start` or `end` token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeToken {
    Open,
    Id { timestamp: u64, tone: Option<Tone> },
    Sequence(Tone),
}

impl RangeToken {
    pub fn parse(token: &str) -> Result<Self> {
        if token.is_empty() {
            return Ok(RangeToken::Open);
        }
        if let Some(sequence) = token.strip_prefix(':') {
            return Ok(RangeToken::Sequence(sequence.parse()?));
        }

        let (ts, tone) = match token.split_once('-') {
            Some((ts, tone)) => (ts, Some(tone.parse::<Tone>()?)),
            None => (token, None),
        };
        if ts.len() != TIMESTAMP_WIDTH || !ts.bytes().all(|b| b.is_ascii_digit()) {
            return Err(BrokerError::InvalidRangeOffset);
        }
        let timestamp = ts.parse().map_err(|_| BrokerError::InvalidRangeOffset)?;
        Ok(RangeToken::Id { timestamp, tone })
    }
}

/// Parameters of a range read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeQuery {
    pub topic: String,
    pub start: String,
    pub end: String,
    /// Zero or negative means unbounded
    pub limit: i64,
    pub exclusive: bool,
    pub reverse: bool,
}

impl RangeQuery {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            start: String::new(),
            end: String::new(),
            limit: 0,
            exclusive: false,
            reverse: false,
        }
    }

    pub fn start(mut self, token: impl Into<String>) -> Self {
        self.start = token.into();
        self
    }

    pub fn end(mut self, token: impl Into<String>) -> Self {
        self.end = token.into();
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn exclusive(mut self, exclusive: bool) -> Self {
        self.exclusive = exclusive;
        self
    }

    pub fn reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }
}

/// A resolved token: the key it points at, and whether it names a whole
/// millisecond rather than one id
struct Anchor {
    key: String,
    whole_ms: bool,
}

fn resolve(store: &dyn OrderedStore, topic: &str, token: RangeToken) -> Result<Option<Anchor>> {
    let prefix = keys::entry_prefix(topic);
    match token {
        RangeToken::Open => Ok(None),
        RangeToken::Id {
            timestamp,
            tone: Some(tone),
        } => Ok(Some(Anchor {
            key: keys::entry_key(topic, &LogId::new(timestamp, tone)),
            whole_ms: false,
        })),
        RangeToken::Id {
            timestamp,
            tone: None,
        } => Ok(Some(Anchor {
            key: format!("{prefix}{timestamp:0width$}", width = TIMESTAMP_WIDTH),
            whole_ms: true,
        })),
        RangeToken::Sequence(tone) => {
            let key = store
                .get(&keys::id_index_key(topic, tone))?
                .ok_or(BrokerError::InvalidToneIdSearch)?;
            Ok(Some(Anchor {
                key,
                whole_ms: false,
            }))
        }
    }
}

fn widened(key: String) -> String {
    format!("{key}{}", keys::WIDEN_SUFFIX)
}

fn lower_bound(anchor: Option<Anchor>, prefix: &str, exclusive: bool) -> Bound<String> {
    match anchor {
        None => Bound::Included(prefix.to_string()),
        Some(Anchor { key, whole_ms }) if exclusive => {
            Bound::Excluded(if whole_ms { widened(key) } else { key })
        }
        Some(Anchor { key, .. }) => Bound::Included(key),
    }
}

fn upper_bound(anchor: Option<Anchor>, prefix: &str, exclusive: bool) -> Bound<String> {
    match anchor {
        None => ScanRange::prefix(prefix).upper,
        Some(Anchor { key, .. }) if exclusive => Bound::Excluded(key),
        Some(Anchor { key, whole_ms }) => Bound::Included(if whole_ms { widened(key) } else { key }),
    }
}

/// Read the entries `query` selects
///
/// `topics` is the registry used to reject unknown topics.
pub fn get_range(
    store: &dyn OrderedStore,
    topics: &BTreeMap<String, ActiveTopic>,
    query: &RangeQuery,
) -> Result<Vec<LogEntry>> {
    let start = RangeToken::parse(&query.start)?;
    let end = RangeToken::parse(&query.end)?;
    if !topics.contains_key(&query.topic) {
        return Err(BrokerError::InvalidTopic);
    }

    let topic = query.topic.as_str();
    let prefix = keys::entry_prefix(topic);
    let (low, high) = if query.reverse {
        (end, start)
    } else {
        (start, end)
    };
    let lower = lower_bound(resolve(store, topic, low)?, &prefix, query.exclusive);
    let upper = upper_bound(resolve(store, topic, high)?, &prefix, query.exclusive);

    let mut range = ScanRange::new(lower, upper);
    if query.reverse {
        range = range.reversed();
    }
    let limit = usize::try_from(query.limit).ok().filter(|n| *n > 0);
    scan_entries(store, topic, range, limit)
}

/// Collect up to `limit` entries of `topic` from a raw key range
pub(crate) fn scan_entries(
    store: &dyn OrderedStore,
    topic: &str,
    range: ScanRange,
    limit: Option<usize>,
) -> Result<Vec<LogEntry>> {
    let mut entries = Vec::new();
    if range.is_empty() {
        return Ok(entries);
    }

    for item in store.scan(range)? {
        let (key, body) = item?;
        // Keys of other topics or families can fall inside a widened bound
        let Some(id) = keys::parse_entry_key(topic, &key) else {
            continue;
        };
        entries.push(LogEntry { id, body });
        if limit.is_some_and(|limit| entries.len() >= limit) {
            break;
        }
    }
    Ok(entries)
}

/// Id of the first surviving entry with a tone above `tone`
///
/// Walks the id index, so tones removed by garbage collection are skipped.
pub(crate) fn first_id_after(
    store: &dyn OrderedStore,
    topic: &str,
    tone: Tone,
) -> Result<Option<LogId>> {
    let index = ScanRange::prefix(&keys::id_index_prefix(topic));
    let range = ScanRange::new(
        Bound::Included(keys::id_index_key(topic, tone.next())),
        index.upper,
    );
    for item in store.scan(range)? {
        let (_, primary) = item?;
        if let Some(id) = keys::parse_entry_key(topic, &primary) {
            return Ok(Some(id));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tokens() {
        assert_eq!(RangeToken::parse("").unwrap(), RangeToken::Open);
        assert_eq!(
            RangeToken::parse("1700000000000").unwrap(),
            RangeToken::Id {
                timestamp: 1_700_000_000_000,
                tone: None
            }
        );
        assert_eq!(
            RangeToken::parse("1700000000000-3").unwrap(),
            RangeToken::Id {
                timestamp: 1_700_000_000_000,
                tone: Some(Tone::new(3))
            }
        );
        assert_eq!(
            RangeToken::parse(":42").unwrap(),
            RangeToken::Sequence(Tone::new(42))
        );
    }

    #[test]
    fn test_parse_rejects_malformed_tokens() {
        for bad in [
            "170000000000",
            "17000000000000",
            "1700000000000-",
            "1700000000000-x",
            ":",
            ":12345678901234567",
            "abc",
            "1700000000000-00000000000000001",
        ] {
            assert!(
                matches!(RangeToken::parse(bad), Err(BrokerError::InvalidRangeOffset)),
                "{bad} should be rejected"
            );
        }
    }
}
