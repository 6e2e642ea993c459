use serde::{Deserialize, Serialize};

use crate::store::STORAGE_CEILING_BYTES;
use crate::{Error, Result};

/// Default index record size: one MiB under the storage ceiling.
pub const DEFAULT_MAX_RECORD_BYTES: usize = STORAGE_CEILING_BYTES - 1024 * 1024;

/// Smallest accepted record size threshold.
pub const MIN_RECORD_BYTES: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Documents per raw shard; bounds the memory of every stage.
    pub split_size: usize,
    /// Preprocessing threads, at most the number of logical CPUs.
    pub num_workers: usize,
    /// Lexicon partitions, hence index shards.
    pub num_partitions: usize,
    /// Largest encoded index record before a posting list is split.
    pub max_record_bytes: usize,
    pub show_progress: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            split_size: 200_000,
            num_workers: 1,
            num_partitions: 1,
            max_record_bytes: DEFAULT_MAX_RECORD_BYTES,
            show_progress: false,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.split_size == 0 {
            return Err(Error::Config("split size must be at least 1".into()));
        }
        if self.num_workers == 0 {
            return Err(Error::Config("number of workers must be at least 1".into()));
        }
        let cpus = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        if self.num_workers > cpus {
            return Err(Error::Config(format!(
                "{} workers requested but this machine has {cpus} logical CPUs",
                self.num_workers
            )));
        }
        if self.num_partitions == 0 {
            return Err(Error::Config("number of partitions must be at least 1".into()));
        }
        if !(MIN_RECORD_BYTES..STORAGE_CEILING_BYTES).contains(&self.max_record_bytes) {
            return Err(Error::Config(format!(
                "record size threshold must be in [{MIN_RECORD_BYTES}, {STORAGE_CEILING_BYTES}), got {}",
                self.max_record_bytes
            )));
        }
        Ok(())
    }
}
