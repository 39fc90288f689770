//! Embeddable log-structured message broker
//!
//! Entries are appended to named topics and addressed by `<timestamp>-<tone>`
//! ids, where the tone is a per-topic sequence starting at 1. Consumers are
//! procs: named cursors that claim a batch, then ack it or give it back.
//!
//! ## Architecture
//!
//! The broker handles:
//! - Commits with per-topic tone allocation
//! - Range reads by id, timestamp or sequence
//! - Claim/ack/reclaim with at most one outstanding claim per proc
//! - Round-robin selection across a competing-consumer group
//! - Garbage collection of consumed entries
//! - Restoring its registries from a persistent store
//!
//! Storage comes from [`proven_kvstore`]. All mutations go through one
//! writer: either a [`Broker`] owned directly, or a [`BrokerService`] task
//! reached through a [`BrokerHandle`].

pub mod ack;
pub mod broker;
pub mod claim;
pub mod clock;
pub mod config;
pub mod error;
pub mod gc;
pub mod id;
pub mod keys;
pub mod lifecycle;
pub mod log;
pub mod proc;
pub mod protocol;
pub mod range;
mod restore;
pub mod selector;
pub mod service;
pub mod state;
pub mod system_proc;
pub mod tone;
pub mod txn;

pub use broker::Broker;
pub use claim::Claimed;
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{BrokerConfig, ClaimDefaults};
pub use error::{BrokerError, Result};
pub use gc::GcReport;
pub use id::{ClaimRange, LogId};
pub use log::{Commit, Committed, NewEntry};
pub use proc::{Offset, OnMaxReclaims, Proc, ProcOptions, ProcStatus};
pub use protocol::{Reply, Request};
pub use range::{LogEntry, RangeQuery, RangeToken};
pub use service::{BrokerHandle, BrokerService, BrokerSnapshot};
pub use state::{ActiveTopic, BrokerState};
pub use system_proc::{SystemProc, SystemProcSpec};
pub use tone::Tone;
pub use txn::{Staged, Transaction};
