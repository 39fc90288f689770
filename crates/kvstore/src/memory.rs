//! In-memory store implementation

use crate::error::Result;
use crate::store::{KvIter, OrderedStore, ScanRange, WriteOp};
use parking_lot::RwLock;
use std::collections::{BTreeMap, VecDeque};
use std::ops::Bound;

/// Rows copied out per read-lock acquisition during a scan
const SCAN_CHUNK: usize = 256;

/// Ephemeral store backed by a `BTreeMap`
///
/// Scans copy rows out in chunks of [`SCAN_CHUNK`], taking the read lock once
/// per chunk. A caller that stops early only pays for the chunks it pulled.
/// Writes landing between chunks are visible to the rest of the scan.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl OrderedStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn write_batch(&self, ops: Vec<WriteOp>) -> Result<()> {
        let mut entries = self.entries.write();
        for op in ops {
            match op {
                WriteOp::Put { key, value } => {
                    entries.insert(key, value);
                }
                WriteOp::Delete { key } => {
                    entries.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn scan(&self, range: ScanRange) -> Result<KvIter<'_>> {
        if range.is_empty() {
            return Ok(Box::new(std::iter::empty()));
        }

        Ok(Box::new(ChunkedScan {
            store: self,
            remaining: Some(range),
            buffer: VecDeque::new(),
        }))
    }

    fn is_persistent(&self) -> bool {
        false
    }
}

/// Lazy scan that refills from the map one chunk at a time
struct ChunkedScan<'a> {
    store: &'a MemoryStore,
    /// Bounds not yet copied out; `None` once the range is exhausted
    remaining: Option<ScanRange>,
    buffer: VecDeque<(String, String)>,
}

impl ChunkedScan<'_> {
    fn refill(&mut self) {
        let Some(range) = self.remaining.take() else {
            return;
        };
        if range.is_empty() {
            return;
        }

        let entries = self.store.entries.read();
        let rows = entries.range::<String, _>((range.lower.clone(), range.upper.clone()));
        let chunk: Vec<(String, String)> = if range.reverse {
            rows.rev()
                .take(SCAN_CHUNK)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        } else {
            rows.take(SCAN_CHUNK)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        };
        drop(entries);

        if chunk.len() == SCAN_CHUNK
            && let Some((last, _)) = chunk.last()
        {
            let mut next = range;
            if next.reverse {
                next.upper = Bound::Excluded(last.clone());
            } else {
                next.lower = Bound::Excluded(last.clone());
            }
            self.remaining = Some(next);
        }
        self.buffer.extend(chunk);
    }
}

impl Iterator for ChunkedScan<'_> {
    type Item = Result<(String, String)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() {
            self.refill();
        }
        self.buffer.pop_front().map(Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_batch_and_scan() {
        let store = MemoryStore::new();
        store
            .write_batch(vec![
                WriteOp::put("a#2", "two"),
                WriteOp::put("a#1", "one"),
                WriteOp::put("b#1", "other"),
            ])
            .unwrap();

        let rows: Vec<_> = store
            .scan(ScanRange::prefix("a#"))
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(
            rows,
            vec![
                ("a#1".to_string(), "one".to_string()),
                ("a#2".to_string(), "two".to_string())
            ]
        );

        store.write_batch(vec![WriteOp::delete("a#1")]).unwrap();
        assert_eq!(store.get("a#1").unwrap(), None);
        assert_eq!(store.len(), 2);
        assert!(!store.is_persistent());
    }

    fn numbered(n: usize) -> MemoryStore {
        let store = MemoryStore::new();
        let ops = (0..n)
            .map(|i| WriteOp::put(format!("k#{i:05}"), i.to_string()))
            .collect();
        store.write_batch(ops).unwrap();
        store
    }

    #[test]
    fn test_scan_crosses_chunk_boundaries() {
        let n = SCAN_CHUNK * 2 + 7;
        let store = numbered(n);

        let forward: Vec<String> = store
            .scan(ScanRange::prefix("k#"))
            .unwrap()
            .map(|r| r.unwrap().1)
            .collect();
        assert_eq!(forward.len(), n);
        assert_eq!(forward[SCAN_CHUNK], SCAN_CHUNK.to_string());
        assert_eq!(forward.last().unwrap(), &(n - 1).to_string());

        let backward: Vec<String> = store
            .scan(ScanRange::prefix("k#").reversed())
            .unwrap()
            .map(|r| r.unwrap().1)
            .collect();
        let mut expected = forward.clone();
        expected.reverse();
        assert_eq!(backward, expected);
    }

    #[test]
    fn test_scan_exact_chunk_multiple_terminates() {
        let store = numbered(SCAN_CHUNK);
        let count = store.scan(ScanRange::prefix("k#")).unwrap().count();
        assert_eq!(count, SCAN_CHUNK);
    }

    #[test]
    fn test_limited_scan_sees_writes_made_between_pulls() {
        let store = numbered(SCAN_CHUNK + 1);

        let mut iter = store.scan(ScanRange::prefix("k#")).unwrap();
        let first = iter.next().unwrap().unwrap();
        assert_eq!(first.0, "k#00000");

        // The first chunk was copied out, so the lock is free for writers
        store
            .write_batch(vec![WriteOp::put("k#99999", "tail")])
            .unwrap();
        let last = iter.last().unwrap().unwrap();
        assert_eq!(last.1, "tail");
    }
}
