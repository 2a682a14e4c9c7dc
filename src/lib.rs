//! STRATA - Embedded LSM Key-Value Storage Engine
//!
//! A single-process storage engine based on the Log-Structured Merge-Tree
//! (LSM-Tree) architecture.
//!
//! ## Features
//! - **MemTable**: In-memory BTreeMap write buffer with explicit tombstones
//! - **Segments**: Immutable sorted JSON-line files with a full key index sidecar
//! - **Atomic publication**: temp-file-then-rename for every segment
//! - **Integrity**: CRC32 per record, index rebuild when the sidecar is missing or stale
//! - **Compaction**: Full merge of all segments, newest generation wins
//! - **Metrics**: Atomic counters for observability
//! - **Sharing**: Arc + RwLock handle for multi-threaded callers
//!
//! There is no write-ahead log: writes still in the MemTable are lost if
//! the process dies before the next flush.
//!
//! ## Example
//! ```no_run
//! use strata::{config::Config, engine::Strata, types::Value};
//!
//! let mut engine = Strata::open(Config::new("./data")).unwrap();
//!
//! engine.put("name", "Alice").unwrap();
//! assert_eq!(engine.get("name").unwrap(), Some(Value::from("Alice")));
//! engine.close().unwrap();
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod types;

pub use config::Config;
pub use engine::Strata;
pub use error::{Result, StrataError};
pub use types::{Key, Lookup, Stored, Value};
