//! Composite log ids and claim ranges

use crate::error::BrokerError;
use crate::tone::{TONE_WIDTH, Tone};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Width of the millisecond timestamp component
pub const TIMESTAMP_WIDTH: usize = 13;

/// `<timestamp:13>-<tone:16>`
///
/// Both components are fixed width, so the string form sorts exactly like
/// `(timestamp, tone)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LogId {
    pub timestamp: u64,
    pub tone: Tone,
}

impl LogId {
    pub fn new(timestamp: u64, tone: Tone) -> Self {
        Self { timestamp, tone }
    }
}

impl fmt::Display for LogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:0width$}-{}",
            self.timestamp,
            self.tone,
            width = TIMESTAMP_WIDTH
        )
    }
}

impl FromStr for LogId {
    type Err = BrokerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ts, tone) = s.split_once('-').ok_or(BrokerError::InvalidRangeOffset)?;
        if ts.len() != TIMESTAMP_WIDTH
            || tone.len() != TONE_WIDTH
            || !ts.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(BrokerError::InvalidRangeOffset);
        }
        let timestamp = ts.parse().map_err(|_| BrokerError::InvalidRangeOffset)?;
        Ok(LogId::new(timestamp, tone.parse()?))
    }
}

impl Serialize for LogId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for LogId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Inclusive range of ids handed out by one claim: `<id>..<id>`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClaimRange {
    pub start: LogId,
    pub end: LogId,
}

impl ClaimRange {
    pub fn new(start: LogId, end: LogId) -> Self {
        Self { start, end }
    }

    /// Number of tones covered by the range
    pub fn tone_count(&self) -> u64 {
        (self.end.tone.value() + 1).saturating_sub(self.start.tone.value())
    }

    /// Parse the persisted form, where an empty string means "no range"
    pub fn parse_optional(s: &str) -> Result<Option<Self>, BrokerError> {
        if s.is_empty() {
            Ok(None)
        } else {
            s.parse().map(Some)
        }
    }

    /// Persisted form of an optional range
    pub fn format_optional(range: &Option<Self>) -> String {
        range.map(|r| r.to_string()).unwrap_or_default()
    }
}

impl fmt::Display for ClaimRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

impl FromStr for ClaimRange {
    type Err = BrokerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (start, end) = s.split_once("..").ok_or(BrokerError::InvalidRangeOffset)?;
        Ok(ClaimRange::new(start.parse()?, end.parse()?))
    }
}

impl Serialize for ClaimRange {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ClaimRange {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
