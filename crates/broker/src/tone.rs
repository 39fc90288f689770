//! Tone: the per-topic monotonic sequence number
//!
//! A tone is persisted as a 16-digit zero-padded decimal so that the store's
//! byte ordering matches numeric ordering. Tone 0 is never assigned; it is the
//! "below every entry" sentinel a new topic starts from.

use crate::error::BrokerError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Width of the persisted tone
pub const TONE_WIDTH: usize = 16;

/// Per-topic sequence number
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tone(u64);

impl Tone {
    /// The sentinel below every committed entry
    pub const ZERO: Tone = Tone(0);

    /// Largest tone that still fits the fixed width
    pub const MAX: Tone = Tone(9_999_999_999_999_999);

    pub const fn new(value: u64) -> Self {
        Tone(value)
    }

    pub const fn value(self) -> u64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// The tone allocated to the next committed entry
    pub fn next(self) -> Tone {
        Tone(self.0 + 1)
    }

    /// One below, clamped at zero
    pub fn prev(self) -> Tone {
        Tone(self.0.saturating_sub(1))
    }
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:0width$}", self.0, width = TONE_WIDTH)
    }
}

impl FromStr for Tone {
    type Err = BrokerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s.len() > TONE_WIDTH || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(BrokerError::InvalidRangeOffset);
        }
        s.parse::<u64>()
            .map(Tone)
            .map_err(|_| BrokerError::InvalidRangeOffset)
    }
}

impl Serialize for Tone {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Tone {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
