//! Storage backend interface shared by the SQLite and flat-file implementations.

use crate::config::{BackendKind, Discipline};
use crate::error::QueueError;
use crate::item::StoredItem;
use std::path::Path;

/// Interface implemented by the queue storage backends.
///
/// Implementations own the storage location and create it lazily on the first
/// call. They keep no in-process copy of the queue contents: every call goes
/// to disk so that independent handles and processes observe one queue.
pub trait StorageBackend: Send + Sync {
    /// Append a payload as the newest item. Returns whether a record was written.
    fn append(&self, payload: &[u8]) -> Result<bool, QueueError>;

    /// Atomically remove and return the item selected by the discipline.
    ///
    /// An empty queue is `Ok(None)`.
    fn remove_next(&self) -> Result<Option<StoredItem>, QueueError>;

    /// Number of stored items
    fn count(&self) -> Result<usize, QueueError>;

    /// Reclaim space left by removed items
    fn compact(&self) -> Result<(), QueueError>;

    /// Teardown: compact and release storage handles or lock files.
    fn close(&self) -> Result<(), QueueError>;

    /// Resolved storage location
    fn location(&self) -> &Path;

    fn discipline(&self) -> Discipline;

    fn kind(&self) -> BackendKind;
}
