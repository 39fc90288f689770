//! Ordered key-value store used by the broker
//!
//! The broker only needs two things from its storage: atomic batched writes
//! and ordered range iteration over string keys. This crate puts those two
//! capabilities behind the [`OrderedStore`] trait and provides:
//! - [`FjallStore`]: persistent LSM-backed storage with crash recovery
//! - [`MemoryStore`]: ephemeral `BTreeMap` storage for tests and embedded use
//!
//! Keys and values are UTF-8 strings. Byte-wise ordering of the encoded keys
//! is the iteration order, so fixed-width numeric components sort correctly.

pub mod config;
pub mod error;
pub mod memory;
pub mod persistent;
pub mod store;

pub use config::StoreConfig;
pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use persistent::FjallStore;
pub use store::{KvIter, OrderedStore, ScanRange, WriteOp};
