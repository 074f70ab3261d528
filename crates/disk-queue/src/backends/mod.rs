//! Storage backend implementations.
//!
//! This module contains the concrete implementations of the `StorageBackend`
//! trait: a SQLite store with exclusive transactions, and a flat-file fallback
//! guarded by an advisory lock.

pub mod flat_file;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use flat_file::FlatFileBackend;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteBackend;
