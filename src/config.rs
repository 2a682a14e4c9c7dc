//! STRATA - Engine Configuration
//! Defines tunable parameters for the LSM storage engine.

use std::path::PathBuf;

use crate::error::{Result, StrataError};

/// Default number of buffered entries before a flush is forced.
pub const DEFAULT_MEMTABLE_CAPACITY: usize = 100;

/// Configuration for the Strata storage engine.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding every segment of this engine instance.
    pub data_dir: PathBuf,

    /// Number of entries (values and tombstones) the MemTable holds before flushing.
    pub memtable_capacity: usize,

    /// Whether to fsync segment files and the directory when publishing a segment.
    pub sync_writes: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            memtable_capacity: DEFAULT_MEMTABLE_CAPACITY,
            sync_writes: true,
        }
    }
}

impl Config {
    /// Create a new Config with a custom data directory.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    /// Set the MemTable entry capacity.
    pub fn with_memtable_capacity(mut self, capacity: usize) -> Self {
        self.memtable_capacity = capacity;
        self
    }

    /// Enable or disable fsync on segment publication.
    pub fn with_sync_writes(mut self, sync: bool) -> Self {
        self.sync_writes = sync;
        self
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.memtable_capacity == 0 {
            return Err(StrataError::Config(
                "memtable_capacity must be at least 1".to_string(),
            ));
        }
        if self.data_dir.as_os_str().is_empty() {
            return Err(StrataError::Config("data_dir must not be empty".to_string()));
        }
        Ok(())
    }

    /// Ensure the data directory exists.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)
    }
}
