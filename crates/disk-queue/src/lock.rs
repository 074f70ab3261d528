//! Exclusive advisory locking for the flat-file backend.
//!
//! The lock lives in a sibling file (`<location>.lock`) so the queue file itself
//! can be replaced while the lock is held. The lock is advisory: it only excludes
//! other handles that also go through [`FileLock::acquire`].

use crate::config::with_suffix;
use crate::error::QueueError;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Suffix of the lock file derived from a storage location
pub const LOCK_SUFFIX: &str = ".lock";

/// Advisory lock associated with one storage location
#[derive(Debug, Clone)]
pub struct FileLock {
    path: PathBuf,
}

impl FileLock {
    /// Lock guarding `location`, stored at `<location>.lock`
    pub fn for_location(location: &Path) -> Self {
        Self {
            path: with_suffix(location, LOCK_SUFFIX),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Block until the exclusive lock is held.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::LockAcquisition`] if the lock file cannot be opened
    /// or locked.
    pub fn acquire(&self) -> Result<LockGuard, QueueError> {
        let lock_error = |source| QueueError::LockAcquisition {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(lock_error)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.path)
            .map_err(lock_error)?;

        file.lock_exclusive().map_err(lock_error)?;
        debug!(lock = %self.path.display(), "Acquired queue lock");

        Ok(LockGuard {
            file: Some(file),
            path: self.path.clone(),
        })
    }

    /// Delete the lock file. A missing file is not an error.
    pub fn remove(&self) -> Result<(), QueueError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(QueueError::Storage {
                message: format!("Failed to remove lock file {}: {}", self.path.display(), e),
            }),
        }
    }
}

/// Held exclusive lock. Dropping the guard releases the lock.
#[derive(Debug)]
pub struct LockGuard {
    file: Option<File>,
    path: PathBuf,
}

impl LockGuard {
    /// Release the lock, reporting failure instead of logging it.
    pub fn release(mut self) -> Result<(), QueueError> {
        match self.file.take() {
            Some(file) => {
                FileExt::unlock(&file).map_err(|e| QueueError::Storage {
                    message: format!("Failed to release lock {}: {}", self.path.display(), e),
                })?;
                debug!(lock = %self.path.display(), "Released queue lock");
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            if let Err(e) = FileExt::unlock(&file) {
                warn!(lock = %self.path.display(), error = %e, "Failed to release queue lock");
            }
        }
    }
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
