//! The single-writer broker core
//!
//! [`Broker`] owns the store handle and the in-memory registries. Every
//! mutating operation takes `&mut self`, so whoever owns the broker is the
//! single writer; [`crate::service::BrokerService`] is the usual owner.

use crate::clock::{SharedClock, SystemClock};
use crate::config::BrokerConfig;
use crate::error::Result;
use crate::id::LogId;
use crate::keys;
use crate::proc::Proc;
use crate::range::{self, LogEntry, RangeQuery};
use crate::restore;
use crate::state::{ActiveTopic, BrokerState};
use crate::tone::Tone;
use crate::txn::Staged;
use proven_kvstore::{MemoryStore, OrderedStore};
use std::sync::Arc;

/// Broker over one store namespace
pub struct Broker {
    pub(crate) store: Arc<dyn OrderedStore>,
    pub(crate) state: BrokerState,
    pub(crate) clock: SharedClock,
    pub(crate) config: BrokerConfig,
}

impl Broker {
    /// Open a broker, restoring registries from a persistent store
    ///
    /// Nothing else may touch the store until this returns.
    pub fn open(
        store: Arc<dyn OrderedStore>,
        clock: SharedClock,
        config: BrokerConfig,
    ) -> Result<Self> {
        let state = if store.is_persistent() {
            restore::restore_state(store.as_ref())?
        } else {
            BrokerState::new()
        };
        Ok(Self {
            store,
            state,
            clock,
            config,
        })
    }

    /// Ephemeral broker on the system clock
    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            state: BrokerState::new(),
            clock: Arc::new(SystemClock::new()),
            config: BrokerConfig::default(),
        }
    }

    pub fn now(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn state(&self) -> &BrokerState {
        &self.state
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn OrderedStore> {
        &self.store
    }

    /// Commit a staged write against this broker's store and registries
    pub fn apply<T: 'static>(&mut self, staged: Staged<T>) -> Result<Option<T>> {
        staged.commit(self.store.as_ref(), &mut self.state)
    }

    pub(crate) fn save_proc(&mut self, proc: Proc) -> Result<()> {
        self.apply(proc.stage_save())?;
        Ok(())
    }

    pub fn range(&self, query: &RangeQuery) -> Result<Vec<LogEntry>> {
        range::get_range(self.store.as_ref(), &self.state.topics, query)
    }

    pub fn get_entry(&self, topic: &str, id: &LogId) -> Result<Option<String>> {
        Ok(self.store.get(&keys::entry_key(topic, id))?)
    }

    pub fn current_tone(&self, topic: &str) -> Tone {
        self.state.current_tone(topic)
    }

    pub fn inspect_proc(&self, name: &str) -> Option<&Proc> {
        self.state.procs.get(name)
    }

    /// Procs in registration order
    pub fn procs(&self) -> Vec<Proc> {
        self.state.procs.iter().cloned().collect()
    }

    pub fn topics(&self) -> Vec<ActiveTopic> {
        self.state.topics.values().cloned().collect()
    }
}
