//! Rebuilding the in-memory registries from persisted system keys
//!
//! The four system families are scanned in order into a fresh state. Any
//! failure discards the partial state, so a broker never starts from half a
//! restore.

use crate::error::{BrokerError, Result};
use crate::keys::{self, ACTIVE_TOPICS, CURRENT_TONE, PROC, SYSTEM_PROC};
use crate::proc::Proc;
use crate::state::{ActiveTopic, BrokerState};
use crate::system_proc::SystemProc;
use proven_kvstore::{OrderedStore, ScanRange};
use std::collections::BTreeMap;

pub(crate) fn restore_state(store: &dyn OrderedStore) -> Result<BrokerState> {
    let mut state = BrokerState::new();

    for item in store.scan(ScanRange::prefix(&keys::system_prefix(ACTIVE_TOPICS)))? {
        let (key, value) = item?;
        let topic = keys::parse_topic_key(ACTIVE_TOPICS, &key)
            .ok_or_else(|| BrokerError::CorruptState(key.clone()))?;
        let created_at = value
            .parse()
            .map_err(|_| BrokerError::CorruptState(format!("{key}={value}")))?;
        state
            .topics
            .insert(topic.to_string(), ActiveTopic::new(topic, created_at));
    }

    for item in store.scan(ScanRange::prefix(&keys::system_prefix(CURRENT_TONE)))? {
        let (key, value) = item?;
        let topic = keys::parse_topic_key(CURRENT_TONE, &key)
            .ok_or_else(|| BrokerError::CorruptState(key.clone()))?;
        let tone = value
            .parse()
            .map_err(|_| BrokerError::CorruptState(format!("{key}={value}")))?;
        state
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| ActiveTopic::new(topic, 0))
            .current_tone = tone;
    }

    let mut procs: BTreeMap<(String, String), Proc> = BTreeMap::new();
    for item in store.scan(ScanRange::prefix(&keys::system_prefix(PROC)))? {
        let (key, value) = item?;
        let (topic, name, field) = keys::parse_record_key(PROC, &key)
            .ok_or_else(|| BrokerError::CorruptState(key.clone()))?;
        let proc = procs
            .entry((topic.to_string(), name.to_string()))
            .or_insert_with(|| Proc::blank(topic, name));
        if !proc.apply_field(field, &value)? {
            tracing::warn!("Ignoring unknown proc field {}", key);
        }
    }
    // Registration order is creation order
    let mut procs: Vec<Proc> = procs.into_values().collect();
    procs.sort_by(|a, b| (a.created_at, &a.name).cmp(&(b.created_at, &b.name)));
    for proc in procs {
        state.procs.upsert(proc);
    }

    let mut bindings: BTreeMap<(String, String), SystemProc> = BTreeMap::new();
    for item in store.scan(ScanRange::prefix(&keys::system_prefix(SYSTEM_PROC)))? {
        let (key, value) = item?;
        let (topic, name, field) = keys::parse_record_key(SYSTEM_PROC, &key)
            .ok_or_else(|| BrokerError::CorruptState(key.clone()))?;
        let binding = bindings
            .entry((topic.to_string(), name.to_string()))
            .or_insert_with(|| SystemProc::blank(topic, name));
        if !binding.apply_field(field, &value)? {
            tracing::warn!("Ignoring unknown system proc field {}", key);
        }
    }
    for binding in bindings.into_values() {
        state.system_procs.insert(binding.name.clone(), binding);
    }

    tracing::info!(
        "Restored {} topics, {} procs, {} system procs",
        state.topics.len(),
        state.procs.len(),
        state.system_procs.len()
    );
    Ok(state)
}
