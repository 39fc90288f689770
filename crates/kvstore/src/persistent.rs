//! Fjall-backed persistent store

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::store::{KvIter, OrderedStore, ScanRange, WriteOp};
use fjall::{Keyspace, PartitionCreateOptions, PartitionHandle};
use std::path::Path;

/// Persistent store with crash recovery
///
/// Every broker key lives in a single partition so that one Fjall batch can
/// span log entries, indexes and proc state.
pub struct FjallStore {
    keyspace: Keyspace,
    partition: PartitionHandle,
    config: StoreConfig,
}

impl FjallStore {
    /// Open (or create) the store described by `config`
    pub fn open(config: StoreConfig) -> Result<Self> {
        Self::open_at_path(&config.data_dir.clone(), config)
    }

    /// Open storage at a specific path
    pub fn open_at_path(path: &Path, config: StoreConfig) -> Result<Self> {
        // Ensure directory exists
        std::fs::create_dir_all(path)?;

        let keyspace = fjall::Config::new(path)
            .cache_size(config.block_cache_size)
            .open()?;

        let partition = keyspace.open_partition(
            &config.partition,
            PartitionCreateOptions::default()
                .block_size(32 * 1024)
                .compression(config.compression),
        )?;

        tracing::debug!(
            "Opened fjall store at {:?} (partition {})",
            path,
            config.partition
        );

        Ok(Self {
            keyspace,
            partition,
            config,
        })
    }

    /// Get the keyspace (for custom operations)
    pub fn keyspace(&self) -> &Keyspace {
        &self.keyspace
    }

    /// Flush and fsync everything written so far
    pub fn sync(&self) -> Result<()> {
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        Ok(())
    }
}

fn decode_pair(pair: fjall::Result<(fjall::Slice, fjall::Slice)>) -> Result<(String, String)> {
    let (k, v) = pair.map_err(StoreError::from)?;
    Ok((String::from_utf8(k.to_vec())?, String::from_utf8(v.to_vec())?))
}

impl OrderedStore for FjallStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match self.partition.get(key)? {
            Some(bytes) => Ok(Some(String::from_utf8(bytes.to_vec())?)),
            None => Ok(None),
        }
    }

    fn write_batch(&self, ops: Vec<WriteOp>) -> Result<()> {
        if ops.is_empty() {
            return Ok(());
        }

        let mut batch = self.keyspace.batch();
        for op in ops {
            match op {
                WriteOp::Put { key, value } => batch.insert(&self.partition, key, value),
                WriteOp::Delete { key } => batch.remove(&self.partition, key),
            }
        }
        batch.commit()?;

        self.keyspace.persist(self.config.persist_mode)?;
        Ok(())
    }

    fn scan(&self, range: ScanRange) -> Result<KvIter<'_>> {
        if range.is_empty() {
            return Ok(Box::new(std::iter::empty()));
        }

        let iter = self.partition.range((range.lower, range.upper));
        if range.reverse {
            Ok(Box::new(iter.rev().map(decode_pair)))
        } else {
            Ok(Box::new(iter.map(decode_pair)))
        }
    }

    fn is_persistent(&self) -> bool {
        true
    }
}

impl Drop for FjallStore {
    fn drop(&mut self) {
        // Ensure data is persisted on drop
        let _ = self.keyspace.persist(fjall::PersistMode::SyncAll);
    }
}
