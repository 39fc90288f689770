//! Broker configuration

use crate::error::{BrokerError, Result};
use crate::proc::OnMaxReclaims;
use serde::Deserialize;
use std::time::Duration;

/// Claim settings used when a request leaves them out
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClaimDefaults {
    /// `None` means unlimited
    pub max_reclaims: Option<u32>,

    /// Milliseconds before an unacked claim is reclaimed; `None` means never
    pub reclaim_timeout: Option<u64>,

    pub on_max_reclaims_reached: OnMaxReclaims,
}

impl Default for ClaimDefaults {
    fn default() -> Self {
        Self {
            max_reclaims: Some(10),
            reclaim_timeout: Some(10_000),
            on_max_reclaims_reached: OnMaxReclaims::Disable,
        }
    }
}

/// Configuration for the broker and its service task
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BrokerConfig {
    /// Entries younger than this (ms) are never garbage collected
    pub min_prune_time: u64,

    /// Period of the garbage collection timer (ms)
    pub gc_interval: u64,

    /// Polling period of `wait_for_procs` (ms)
    pub poll_interval: u64,

    /// Capacity of the write queue
    pub command_buffer: usize,

    pub claim_defaults: ClaimDefaults,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            min_prune_time: 60_000,
            gc_interval: 30_000,
            poll_interval: 10,
            command_buffer: 1024,
            claim_defaults: ClaimDefaults::default(),
        }
    }
}

impl BrokerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON document; absent fields keep their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| BrokerError::CorruptState(e.to_string()))
    }

    pub fn with_min_prune_time(mut self, ms: u64) -> Self {
        self.min_prune_time = ms;
        self
    }

    pub fn with_gc_interval(mut self, ms: u64) -> Self {
        self.gc_interval = ms;
        self
    }

    pub fn with_poll_interval(mut self, ms: u64) -> Self {
        self.poll_interval = ms;
        self
    }

    pub fn with_command_buffer(mut self, capacity: usize) -> Self {
        self.command_buffer = capacity;
        self
    }

    pub fn with_claim_defaults(mut self, defaults: ClaimDefaults) -> Self {
        self.claim_defaults = defaults;
        self
    }

    pub fn gc_period(&self) -> Duration {
        Duration::from_millis(self.gc_interval.max(1))
    }

    pub fn poll_period(&self) -> Duration {
        Duration::from_millis(self.poll_interval.max(1))
    }
}
