//! STRATA - Custom Error Types
//! Defines the error hierarchy for the LSM storage engine.

use std::path::PathBuf;

use thiserror::Error;

/// Custom Result type for the Strata engine.
pub type Result<T> = std::result::Result<T, StrataError>;

/// Error types for the Strata storage engine.
#[derive(Error, Debug)]
pub enum StrataError {
    /// I/O errors from file operations (segment data, index, directory).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A segment data file failed validation.
    #[error("Corrupt segment {path:?}: {reason}")]
    Corruption { path: PathBuf, reason: String },

    /// Caller handed the engine something it cannot store.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A thread panicked while holding the shared engine lock.
    #[error("Engine lock poisoned")]
    LockPoisoned,
}

impl StrataError {
    pub(crate) fn corruption(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        StrataError::Corruption {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
