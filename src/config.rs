//! Configuration for AtlasPack
//!
//! Centralized configuration with defaults matching the part-file layout
//! used on large-block filesystems.

use std::path::PathBuf;

use crate::error::{PackError, Result};

/// Main configuration for an AtlasPack store
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory of the store
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── metadata     (global configuration + directory state)
    ///     ├── part-<n>     (append-only payload containers)
    ///     ├── index-<n>    (sorted bucket files)
    ///     └── index-tmp    (write-ahead log, only while entries are pending)
    pub data_dir: PathBuf,

    /// Replication hint passed through to the store
    pub replication_factor: i32,

    /// Size of a part file before rolling over to a new one (in bytes)
    pub part_max_size: u64,

    /// Block size hint for part files; also the maximum payload size
    pub block_size: u64,

    /// Block size hint for bucket files, the WAL and metadata
    pub index_block_size: u64,

    /// Buffer size hint for store writers
    pub io_buffer_size: usize,

    // -------------------------------------------------------------------------
    // Index Configuration
    // -------------------------------------------------------------------------
    /// Max number of entries in a bucket before it splits
    pub bucket_capacity: i32,

    /// What to do when one split leaves the bucket overflowing
    pub split_policy: SplitPolicy,

    /// Upper bound for the directory depth (directory has 2^depth slots)
    pub max_global_depth: u32,

    // -------------------------------------------------------------------------
    // Compression Configuration
    // -------------------------------------------------------------------------
    /// zstd compression level for payloads
    pub compression_level: i32,
}

/// Overflow handling strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitPolicy {
    /// Split exactly once per overflowing insert; the bucket may stay
    /// over capacity when many hashes share a long prefix.
    Once,

    /// Keep splitting the bucket holding the inserted key until it fits
    /// or `max_global_depth` is reached.
    UntilResolved,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./atlaspack_data"),
            replication_factor: 3,
            part_max_size: 2 * 1024 * 1024 * 1024, // 2 GB
            block_size: 512 * 1024 * 1024,         // 512 MB
            index_block_size: 10 * 1024 * 1024,    // 10 MB
            io_buffer_size: 4096,
            bucket_capacity: 1024,
            split_policy: SplitPolicy::Once,
            max_global_depth: 20,
            compression_level: 3,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Largest payload accepted by `put`
    pub fn max_payload_size(&self) -> u64 {
        self.block_size
    }

    /// Reject values the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.bucket_capacity <= 0 {
            return Err(PackError::Config(format!(
                "bucket_capacity must be positive, got {}",
                self.bucket_capacity
            )));
        }
        if self.replication_factor <= 0 {
            return Err(PackError::Config(format!(
                "replication_factor must be positive, got {}",
                self.replication_factor
            )));
        }
        if self.part_max_size == 0 || self.block_size == 0 || self.index_block_size == 0 {
            return Err(PackError::Config(
                "part_max_size, block_size and index_block_size must be non-zero".to_string(),
            ));
        }
        if self.block_size > i32::MAX as u64 {
            return Err(PackError::Config(format!(
                "block_size {} does not fit a 32-bit payload length",
                self.block_size
            )));
        }
        if self.max_global_depth > 30 {
            return Err(PackError::Config(format!(
                "max_global_depth {} is too large (at most 30)",
                self.max_global_depth
            )));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root of the store)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the replication hint
    pub fn replication_factor(mut self, replication: i32) -> Self {
        self.config.replication_factor = replication;
        self
    }

    /// Set the part file rollover threshold (in bytes)
    pub fn part_max_size(mut self, size: u64) -> Self {
        self.config.part_max_size = size;
        self
    }

    /// Set the part file block size hint (also the max payload size)
    pub fn block_size(mut self, size: u64) -> Self {
        self.config.block_size = size;
        self
    }

    /// Set the block size hint for index files
    pub fn index_block_size(mut self, size: u64) -> Self {
        self.config.index_block_size = size;
        self
    }

    /// Set the writer buffer size hint
    pub fn io_buffer_size(mut self, size: usize) -> Self {
        self.config.io_buffer_size = size;
        self
    }

    /// Set the bucket capacity (entries)
    pub fn bucket_capacity(mut self, capacity: i32) -> Self {
        self.config.bucket_capacity = capacity;
        self
    }

    /// Set the overflow split policy
    pub fn split_policy(mut self, policy: SplitPolicy) -> Self {
        self.config.split_policy = policy;
        self
    }

    /// Set the directory depth cap
    pub fn max_global_depth(mut self, depth: u32) -> Self {
        self.config.max_global_depth = depth;
        self
    }

    /// Set the zstd compression level
    pub fn compression_level(mut self, level: i32) -> Self {
        self.config.compression_level = level;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
