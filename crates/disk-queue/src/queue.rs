//! The queue facade: typed operations over one storage backend.

use crate::backend::StorageBackend;
use crate::backends::FlatFileBackend;
use crate::config::{BackendKind, Discipline, QueueConfig};
use crate::error::{QueueError, SerializationError};
use crate::item::QueueItem;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[cfg(all(test, feature = "sqlite"))]
#[path = "queue_tests.rs"]
mod tests;

/// Disk-persisted queue of serde values.
///
/// Values are serialized to JSON and handed to the backend as opaque bytes.
/// The backend is chosen once, when the queue is opened, by
/// [`BackendKind::detect`]; the queue never branches on it afterwards.
///
/// # Examples
///
/// ```no_run
/// use disk_queue::{Discipline, DiskQueue, QueueConfig};
/// # fn example() -> Result<(), disk_queue::QueueError> {
/// let config = QueueConfig::new(Discipline::OldestFirst).with_path("/var/lib/app/jobs.db");
/// let queue: DiskQueue<String> = DiskQueue::open(config)?;
///
/// queue.offer(&"resize image 42".to_string())?;
/// if let Some(job) = queue.poll()? {
///     println!("processing {}", job);
/// }
/// queue.close()?;
/// # Ok(())
/// # }
/// ```
pub struct DiskQueue<T> {
    backend: Box<dyn StorageBackend>,
    _item: PhantomData<fn() -> T>,
}

impl<T> DiskQueue<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Open a queue for `config`. Storage is created lazily on first use.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Configuration`] if the default storage location
    /// cannot be resolved.
    pub fn open(config: QueueConfig) -> Result<Self, QueueError> {
        let kind = BackendKind::detect();
        let location = kind.storage_location(&config.base_location()?);
        let backend = BackendFactory::create(kind, location, &config)?;

        info!(
            path = %backend.location().display(),
            backend = %kind,
            discipline = %config.discipline,
            "Opened disk queue"
        );
        Ok(Self::with_backend(backend))
    }

    /// Wrap an explicitly constructed backend
    pub fn with_backend(backend: Box<dyn StorageBackend>) -> Self {
        Self {
            backend,
            _item: PhantomData,
        }
    }

    /// Add an item as the newest entry. Returns whether a record was written.
    pub fn offer(&self, item: &T) -> Result<bool, QueueError> {
        let payload = serde_json::to_vec(item).map_err(SerializationError::from)?;
        self.backend.append(&payload)
    }

    /// Remove and return the item selected by the discipline, if any
    pub fn poll(&self) -> Result<Option<T>, QueueError> {
        Ok(self.poll_item()?.map(QueueItem::into_value))
    }

    /// Like [`poll`](Self::poll), keeping the backend's item metadata
    pub fn poll_item(&self) -> Result<Option<QueueItem<T>>, QueueError> {
        let Some(stored) = self.backend.remove_next()? else {
            debug!(path = %self.queue_file().display(), "Poll found empty queue");
            return Ok(None);
        };

        let value = serde_json::from_slice(&stored.payload).map_err(SerializationError::from)?;
        Ok(Some(QueueItem {
            sequence_id: stored.sequence_id,
            enqueued_at: stored.enqueued_at,
            value,
        }))
    }

    pub fn is_empty(&self) -> Result<bool, QueueError> {
        Ok(self.count_items()? == 0)
    }

    /// Number of currently stored items
    pub fn count_items(&self) -> Result<usize, QueueError> {
        self.backend.count()
    }

    /// Resolved storage location, including any backend suffix
    pub fn queue_file(&self) -> &Path {
        self.backend.location()
    }

    pub fn discipline(&self) -> Discipline {
        self.backend.discipline()
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// Reclaim space left by removed items without closing the queue
    pub fn compact(&self) -> Result<(), QueueError> {
        self.backend.compact()
    }

    /// Tear the queue down: compact and release the store, or remove the lock file.
    pub fn close(self) -> Result<(), QueueError> {
        self.backend.close()
    }
}

impl<T> fmt::Debug for DiskQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiskQueue")
            .field("queue_file", &self.backend.location())
            .field("backend", &self.backend.kind())
            .field("discipline", &self.backend.discipline())
            .finish()
    }
}

/// Factory for creating the storage backend a queue runs on
pub struct BackendFactory;

impl BackendFactory {
    /// Create the backend of `kind` at `location`
    pub fn create(
        kind: BackendKind,
        location: PathBuf,
        config: &QueueConfig,
    ) -> Result<Box<dyn StorageBackend>, QueueError> {
        match kind {
            BackendKind::Transactional => Self::create_transactional(location, config),
            BackendKind::FlatFile => Ok(Box::new(FlatFileBackend::new(
                location,
                config.discipline,
            ))),
        }
    }

    #[cfg(feature = "sqlite")]
    fn create_transactional(
        location: PathBuf,
        config: &QueueConfig,
    ) -> Result<Box<dyn StorageBackend>, QueueError> {
        Ok(Box::new(crate::backends::SqliteBackend::new(
            location,
            config.discipline,
            std::time::Duration::from_millis(config.busy_timeout_ms),
        )))
    }

    #[cfg(not(feature = "sqlite"))]
    fn create_transactional(
        _location: PathBuf,
        _config: &QueueConfig,
    ) -> Result<Box<dyn StorageBackend>, QueueError> {
        Err(crate::error::ConfigurationError::UnsupportedBackend {
            backend: BackendKind::Transactional.to_string(),
            message: "built without the 'sqlite' feature".to_string(),
        }
        .into())
    }
}
