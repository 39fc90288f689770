//! The ordered store trait and its request types

use crate::error::Result;
use std::ops::Bound;

/// Type-erased iterator over `(key, value)` pairs in scan order
pub type KvIter<'a> = Box<dyn Iterator<Item = Result<(String, String)>> + 'a>;

/// One write inside an atomic batch
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WriteOp {
    Put { key: String, value: String },
    Delete { key: String },
}

impl WriteOp {
    pub fn put(key: impl Into<String>, value: impl Into<String>) -> Self {
        WriteOp::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn delete(key: impl Into<String>) -> Self {
        WriteOp::Delete { key: key.into() }
    }

    pub fn key(&self) -> &str {
        match self {
            WriteOp::Put { key, .. } | WriteOp::Delete { key } => key,
        }
    }
}

/// Bounds and direction of a range scan
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanRange {
    pub lower: Bound<String>,
    pub upper: Bound<String>,
    pub reverse: bool,
}

impl ScanRange {
    pub fn new(lower: Bound<String>, upper: Bound<String>) -> Self {
        Self {
            lower,
            upper,
            reverse: false,
        }
    }

    /// Every key starting with `prefix`
    pub fn prefix(prefix: &str) -> Self {
        // char::MAX encodes to the highest UTF-8 sequence, so it sorts after
        // any continuation of the prefix
        let mut upper = String::with_capacity(prefix.len() + 4);
        upper.push_str(prefix);
        upper.push(char::MAX);
        Self::new(Bound::Included(prefix.to_string()), Bound::Excluded(upper))
    }

    /// Iterate from the upper bound down
    pub fn reversed(mut self) -> Self {
        self.reverse = true;
        self
    }

    /// True when no key can satisfy both bounds
    ///
    /// Backends must check this before handing bounds to an ordered map,
    /// which rejects inverted ranges.
    pub fn is_empty(&self) -> bool {
        let (lower, lower_inclusive) = match &self.lower {
            Bound::Included(k) => (k, true),
            Bound::Excluded(k) => (k, false),
            Bound::Unbounded => return false,
        };
        let (upper, upper_inclusive) = match &self.upper {
            Bound::Included(k) => (k, true),
            Bound::Excluded(k) => (k, false),
            Bound::Unbounded => return false,
        };
        lower > upper || (lower == upper && !(lower_inclusive && upper_inclusive))
    }

    pub fn contains(&self, key: &str) -> bool {
        let above = match &self.lower {
            Bound::Included(k) => key >= k.as_str(),
            Bound::Excluded(k) => key > k.as_str(),
            Bound::Unbounded => true,
        };
        let below = match &self.upper {
            Bound::Included(k) => key <= k.as_str(),
            Bound::Excluded(k) => key < k.as_str(),
            Bound::Unbounded => true,
        };
        above && below
    }
}

/// Ordered string key-value storage with atomic batches
pub trait OrderedStore: Send + Sync {
    /// Read a single key
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Apply every operation atomically: all land or none do
    fn write_batch(&self, ops: Vec<WriteOp>) -> Result<()>;

    /// Iterate over the keys inside `range` in key order (or reverse)
    ///
    /// The iterator is finite and single pass.
    fn scan(&self, range: ScanRange) -> Result<KvIter<'_>>;

    /// Whether data survives a process restart
    fn is_persistent(&self) -> bool;
}
