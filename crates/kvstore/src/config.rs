//! Storage configuration

use std::path::PathBuf;

/// Configuration for the persistent store
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Directory for storage data
    pub data_dir: PathBuf,

    /// Name of the partition holding every broker key
    pub partition: String,

    /// Block cache size for Fjall (in bytes)
    pub block_cache_size: u64,

    /// Compression type for data blocks
    pub compression: fjall::CompressionType,

    /// Durability applied after every batch commit
    pub persist_mode: fjall::PersistMode,
}

impl StoreConfig {
    /// Create a new config with the given data directory
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            partition: "log".to_string(),
            block_cache_size: 32 * 1024 * 1024, // 32 MB
            compression: fjall::CompressionType::Lz4,
            persist_mode: fjall::PersistMode::Buffer,
        }
    }

    /// Set the partition name
    pub fn with_partition(mut self, partition: impl Into<String>) -> Self {
        self.partition = partition.into();
        self
    }

    /// Set block cache size
    pub fn with_block_cache_size(mut self, size: u64) -> Self {
        self.block_cache_size = size;
        self
    }

    /// Set compression type
    pub fn with_compression(mut self, compression: fjall::CompressionType) -> Self {
        self.compression = compression;
        self
    }

    /// Set persist mode
    pub fn with_persist_mode(mut self, mode: fjall::PersistMode) -> Self {
        self.persist_mode = mode;
        self
    }
}
