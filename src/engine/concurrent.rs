//! STRATA - Shared Engine Handle
//! Thread-safe wrapper around the Strata engine using Arc + RwLock.
//!
//! ## Concurrency Model
//! - **Read operations** (`get`, `scan`, ...) acquire a **read lock** (shared)
//! - **Write operations** (`put`, `delete`, `flush`, `compact`) acquire a **write lock** (exclusive)
//!
//! The engine itself has no internal locking; this handle is the external
//! serialization it requires. It does not protect a directory against a
//! second process.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::config::Config;
use crate::error::{Result, StrataError};
use crate::types::{Key, Value};

use super::metrics::EngineMetrics;
use super::Strata;

/// Thread-safe handle to one Strata storage engine.
///
/// ## Example
/// ```no_run
/// use strata::engine::concurrent::SharedStrata;
/// use strata::config::Config;
/// use std::thread;
///
/// let engine = SharedStrata::open(Config::new("./data")).unwrap();
///
/// let writer = engine.clone();
/// thread::spawn(move || {
///     writer.put("key", "value").unwrap();
/// });
///
/// let result = engine.get("key").unwrap();
/// ```
#[derive(Clone)]
pub struct SharedStrata {
    inner: Arc<RwLock<Strata>>,
}

impl SharedStrata {
    /// Open or create a shared Strata storage engine.
    pub fn open(config: Config) -> Result<Self> {
        Ok(Self::from_engine(Strata::open(config)?))
    }

    /// Wrap an already opened engine.
    pub fn from_engine(engine: Strata) -> Self {
        Self {
            inner: Arc::new(RwLock::new(engine)),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Strata>> {
        self.inner.read().map_err(|_| StrataError::LockPoisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Strata>> {
        self.inner.write().map_err(|_| StrataError::LockPoisoned)
    }

    /// Insert a key-value pair (write lock).
    pub fn put(&self, key: impl Into<Key>, value: impl Into<Value>) -> Result<()> {
        self.write()?.put(key, value)
    }

    /// Delete a key (write lock).
    pub fn delete(&self, key: impl Into<Key>) -> Result<()> {
        self.write()?.delete(key)
    }

    /// Get a value by key (read lock).
    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        self.read()?.get(key)
    }

    /// Scan all live key-value pairs (read lock).
    pub fn scan(&self) -> Result<Vec<(Key, Value)>> {
        self.read()?.scan()
    }

    /// Flush the MemTable (write lock).
    pub fn flush(&self) -> Result<()> {
        self.write()?.flush()
    }

    /// Compact all segments (write lock).
    pub fn compact(&self) -> Result<()> {
        self.write()?.compact()
    }

    /// Number of published segments (read lock).
    pub fn segment_count(&self) -> Result<usize> {
        Ok(self.read()?.segment_count())
    }

    /// Run `f` against the engine metrics while holding the read lock.
    pub fn with_metrics<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&EngineMetrics) -> R,
    {
        let engine = self.read()?;
        Ok(f(engine.metrics()))
    }

    /// Flush and release the engine if this is the last handle.
    /// Otherwise only flushes; the other handles keep the engine open.
    pub fn close(self) -> Result<()> {
        match Arc::try_unwrap(self.inner) {
            Ok(lock) => lock
                .into_inner()
                .map_err(|_| StrataError::LockPoisoned)?
                .close(),
            Err(shared) => {
                let mut engine = shared.write().map_err(|_| StrataError::LockPoisoned)?;
                engine.flush()
            }
        }
    }
}
