//! In-memory registries mirroring persisted system keys
//!
//! Only the single writer mutates a [`BrokerState`], and only from the
//! post-commit producers of a [`crate::txn::Staged`] write, so the registry
//! never runs ahead of what is durable.

use crate::proc::Proc;
use crate::system_proc::SystemProc;
use crate::tone::Tone;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// A topic that has received at least one commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveTopic {
    pub name: String,
    pub created_at: u64,
    pub current_tone: Tone,
}

impl ActiveTopic {
    pub fn new(name: impl Into<String>, created_at: u64) -> Self {
        Self {
            name: name.into(),
            created_at,
            current_tone: Tone::ZERO,
        }
    }
}

/// Procs in registration order plus the round-robin cursor
///
/// The order is stable: procs are appended when created and removed only by
/// destroy. The cursor indexes into that order and survives between calls.
#[derive(Debug, Clone, Default)]
pub struct ProcRegistry {
    order: Vec<String>,
    procs: HashMap<String, Proc>,
    cursor: usize,
}

impl ProcRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Proc> {
        self.procs.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.procs.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Insert a new proc at the back of the order, or replace an existing one
    /// in place
    pub fn upsert(&mut self, proc: Proc) {
        if !self.procs.contains_key(&proc.name) {
            self.order.push(proc.name.clone());
        }
        self.procs.insert(proc.name.clone(), proc);
    }

    pub fn remove(&mut self, name: &str) -> Option<Proc> {
        let proc = self.procs.remove(name)?;
        if let Some(index) = self.order.iter().position(|n| n == name) {
            self.order.remove(index);
            if index < self.cursor {
                self.cursor -= 1;
            }
        }
        if self.cursor >= self.order.len() {
            self.cursor = 0;
        }
        Some(proc)
    }

    /// Procs in registration order
    pub fn iter(&self) -> impl Iterator<Item = &Proc> {
        self.order.iter().filter_map(|name| self.procs.get(name))
    }

    /// Every proc exactly once, starting at the rotation cursor
    pub fn rotation(&self) -> impl Iterator<Item = (usize, &Proc)> {
        let len = self.order.len();
        (0..len).filter_map(move |step| {
            let index = (self.cursor + step) % len;
            self.procs.get(&self.order[index]).map(|proc| (index, proc))
        })
    }

    /// Start the next rotation just after `index`
    pub fn advance_past(&mut self, index: usize) {
        if !self.order.is_empty() {
            self.cursor = (index + 1) % self.order.len();
        }
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }
}

/// Everything the broker keeps in memory
#[derive(Debug, Clone, Default)]
pub struct BrokerState {
    pub topics: BTreeMap<String, ActiveTopic>,
    pub procs: ProcRegistry,
    pub system_procs: BTreeMap<String, SystemProc>,
}

impl BrokerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current tone of `topic`, zero when it has never been written
    pub fn current_tone(&self, topic: &str) -> Tone {
        self.topics
            .get(topic)
            .map(|t| t.current_tone)
            .unwrap_or(Tone::ZERO)
    }

    /// True once every proc in `names` (all procs when empty) has acked up to
    /// its topic's current tone
    pub fn procs_caught_up(&self, names: &[String]) -> bool {
        let caught_up = |proc: &Proc| !proc.has_unconsumed(self.current_tone(&proc.topic));
        if names.is_empty() {
            self.procs.iter().all(caught_up)
        } else {
            names
                .iter()
                .all(|name| self.procs.get(name).is_some_and(caught_up))
        }
    }
}
