//! # Disk Queue
//!
//! Disk-persisted queue shared by independent threads and processes through a
//! common storage location.
//!
//! This library provides:
//! - `offer` / atomic `poll` / `count_items` / `is_empty` over serde values
//! - Two selection disciplines: oldest-first and newest-first
//! - A SQLite backend with exclusive-transaction removal
//! - A flat-file fallback guarded by an advisory file lock
//!
//! ## Module Organization
//!
//! - [error] - Error types for all queue operations
//! - [config] - Configuration, disciplines and backend detection
//! - [item] - Stored items and their metadata
//! - [backend] - The storage backend trait
//! - [backends] - SQLite and flat-file implementations
//! - [lock] - Advisory locking used by the flat-file backend
//! - [queue] - The typed queue facade

// Module declarations
pub mod backend;
pub mod backends;
pub mod config;
pub mod error;
pub mod item;
pub mod lock;
pub mod queue;

// Re-export commonly used types at crate root for convenience
pub use backend::StorageBackend;
pub use backends::FlatFileBackend;
#[cfg(feature = "sqlite")]
pub use backends::SqliteBackend;
pub use config::{BackendKind, Discipline, QueueConfig};
pub use error::{ConfigurationError, QueueError, SerializationError};
pub use item::{QueueItem, SequenceId, StoredItem};
pub use lock::{FileLock, LockGuard};
pub use queue::{BackendFactory, DiskQueue};
