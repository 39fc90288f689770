//! Atomic write batches with post-commit results
//!
//! A [`Transaction`] only collects writes. A [`Staged`] pairs one with the
//! in-memory effect of the operation that built it; the effect runs after the
//! batch has been written, never before, and never when the write fails.
//! Two staged operations compose with [`Staged::and`] into a single batch.

use crate::error::Result;
use crate::state::BrokerState;
use proven_kvstore::{OrderedStore, WriteOp};

/// Ordered list of writes applied as one atomic batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transaction {
    ops: Vec<WriteOp>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.ops.push(WriteOp::put(key, value));
    }

    pub fn delete(&mut self, key: impl Into<String>) {
        self.ops.push(WriteOp::delete(key));
    }

    /// Append every write of `other` after this transaction's own
    pub fn absorb(&mut self, other: Transaction) {
        self.ops.extend(other.ops);
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    /// Write the batch; returns false without touching the store when empty
    pub fn commit(self, store: &dyn OrderedStore) -> Result<bool> {
        if self.ops.is_empty() {
            return Ok(false);
        }
        store.write_batch(self.ops)?;
        Ok(true)
    }
}

type Producer<T> = Box<dyn FnOnce(&mut BrokerState) -> T>;

/// A transaction plus the result it yields once durable
pub struct Staged<T> {
    txn: Transaction,
    produce: Producer<T>,
}

impl<T: 'static> Staged<T> {
    pub fn new(txn: Transaction, produce: impl FnOnce(&mut BrokerState) -> T + 'static) -> Self {
        Self {
            txn,
            produce: Box::new(produce),
        }
    }

    pub fn transaction(&self) -> &Transaction {
        &self.txn
    }

    /// Transform the result without changing the writes
    pub fn map<U: 'static>(self, f: impl FnOnce(T) -> U + 'static) -> Staged<U> {
        let produce = self.produce;
        Staged::new(self.txn, move |state| f(produce(state)))
    }

    /// One batch holding both write sets; results are produced in order
    pub fn and<U: 'static>(self, other: Staged<U>) -> Staged<(T, U)> {
        let mut txn = self.txn;
        txn.absorb(other.txn);
        let first = self.produce;
        let second = other.produce;
        Staged::new(txn, move |state| {
            let a = first(state);
            let b = second(state);
            (a, b)
        })
    }

    /// Write the batch, then run the producers against `state`
    ///
    /// An empty batch yields `Ok(None)` without touching the store or the
    /// state. A failed write leaves both untouched and returns the store error.
    pub fn commit(self, store: &dyn OrderedStore, state: &mut BrokerState) -> Result<Option<T>> {
        if !self.txn.commit(store)? {
            return Ok(None);
        }
        Ok(Some((self.produce)(state)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ActiveTopic;
    use proven_kvstore::MemoryStore;

    #[test]
    fn test_empty_commit_skips_store_and_producers() {
        let store = MemoryStore::new();
        let mut state = BrokerState::new();

        let staged = Staged::new(Transaction::new(), |state: &mut BrokerState| {
            state
                .topics
                .insert("t".to_string(), ActiveTopic::new("t", 0));
        });

        assert!(staged.commit(&store, &mut state).unwrap().is_none());
        assert!(state.topics.is_empty());
    }

    #[test]
    fn test_composed_writes_land_together() {
        let store = MemoryStore::new();
        let mut state = BrokerState::new();

        let mut left = Transaction::new();
        left.put("a", "1");
        let mut right = Transaction::new();
        right.put("b", "2");
        right.delete("c");

        let staged = Staged::new(left, |_: &mut BrokerState| "left")
            .and(Staged::new(right, |_: &mut BrokerState| 7));
        assert_eq!(staged.transaction().len(), 3);

        let (a, b) = staged.commit(&store, &mut state).unwrap().unwrap();
        assert_eq!((a, b), ("left", 7));
        assert_eq!(store.get("a").unwrap().as_deref(), Some("1"));
        assert_eq!(store.get("b").unwrap().as_deref(), Some("2"));
    }
}
