//! Flat-file queue backend for environments without transactional storage.
//!
//! Items are stored one per line as base64 text, oldest nearest the start of the
//! file. Every operation holds the advisory [`FileLock`] for its whole
//! read-modify-write, which makes each call O(total stored bytes). That is the
//! price of needing nothing but a filesystem; keep queue depths modest.
//!
//! Appends write `"\n" + line`, so a file may begin with an empty segment. Parsing
//! skips it.

use crate::backend::StorageBackend;
use crate::config::{with_suffix, BackendKind, Discipline};
use crate::error::QueueError;
use crate::item::StoredItem;
use crate::lock::FileLock;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[cfg(test)]
#[path = "flat_file_tests.rs"]
mod tests;

const TEMP_SUFFIX: &str = ".tmp";

/// Advisory-locked, line-oriented file backend
#[derive(Debug)]
pub struct FlatFileBackend {
    path: PathBuf,
    discipline: Discipline,
    lock: FileLock,
}

impl FlatFileBackend {
    /// Create a backend over `path`. Nothing is touched on disk until first use.
    pub fn new(path: impl Into<PathBuf>, discipline: Discipline) -> Self {
        let path = path.into();
        let lock = FileLock::for_location(&path);
        Self {
            path,
            discipline,
            lock,
        }
    }

    pub fn lock(&self) -> &FileLock {
        &self.lock
    }

    /// Create the queue file (and its directory) if absent
    fn ensure_exists(&self) -> Result<(), QueueError> {
        if self.path.exists() {
            return Ok(());
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.unavailable(e))?;
        }

        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.unavailable(e))?;

        info!(path = %self.path.display(), "Created flat-file queue");
        Ok(())
    }

    fn read_lines(&self) -> Result<Vec<String>, QueueError> {
        let contents = fs::read_to_string(&self.path).map_err(|e| QueueError::Storage {
            message: format!("Failed to read {}: {}", self.path.display(), e),
        })?;
        Ok(parse_lines(&contents))
    }

    /// Replace the queue file with `lines` (write to a temp file, then rename)
    fn rewrite(&self, lines: &[String]) -> Result<(), QueueError> {
        let storage_error = |e: std::io::Error| QueueError::Storage {
            message: format!("Failed to rewrite {}: {}", self.path.display(), e),
        };

        let temp_path = with_suffix(&self.path, TEMP_SUFFIX);
        let mut file = fs::File::create(&temp_path).map_err(storage_error)?;
        // Same shape as appends: every line is preceded by a newline, so the
        // leading empty segment is the only one `parse_lines` skips.
        let contents: String = lines.iter().map(|line| format!("\n{}", line)).collect();
        file.write_all(contents.as_bytes()).map_err(storage_error)?;
        file.sync_all().map_err(storage_error)?;
        drop(file);

        fs::rename(&temp_path, &self.path).map_err(storage_error)
    }

    fn unavailable(&self, e: std::io::Error) -> QueueError {
        QueueError::StorageUnavailable {
            path: self.path.clone(),
            message: e.to_string(),
        }
    }
}

impl StorageBackend for FlatFileBackend {
    fn append(&self, payload: &[u8]) -> Result<bool, QueueError> {
        let guard = self.lock.acquire()?;
        self.ensure_exists()?;

        let line = format!("\n{}", STANDARD.encode(payload));
        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|e| self.unavailable(e))?;
        file.write_all(line.as_bytes())
            .map_err(|e| QueueError::Storage {
                message: format!("Failed to append to {}: {}", self.path.display(), e),
            })?;

        guard.release()?;
        debug!(path = %self.path.display(), bytes = payload.len(), "Appended item");
        Ok(true)
    }

    fn remove_next(&self) -> Result<Option<StoredItem>, QueueError> {
        let guard = self.lock.acquire()?;
        self.ensure_exists()?;

        let mut lines = self.read_lines()?;
        if lines.is_empty() {
            guard.release()?;
            return Ok(None);
        }

        let line = match self.discipline {
            Discipline::OldestFirst => lines.remove(0),
            Discipline::NewestFirst => lines.pop().unwrap_or_default(),
        };
        let decoded = STANDARD.decode(line.as_bytes());

        // A line that cannot be decoded is dropped so it cannot block the queue.
        self.rewrite(&lines)?;
        guard.release()?;

        match decoded {
            Ok(payload) => {
                debug!(
                    path = %self.path.display(),
                    remaining = lines.len(),
                    "Removed item"
                );
                Ok(Some(StoredItem::from_payload(Bytes::from(payload))))
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Dropped undecodable queue line");
                Err(QueueError::CorruptItem {
                    message: format!("Line is not valid base64: {}", e),
                })
            }
        }
    }

    fn count(&self) -> Result<usize, QueueError> {
        let guard = self.lock.acquire()?;
        self.ensure_exists()?;
        let count = self.read_lines()?.len();
        guard.release()?;
        Ok(count)
    }

    fn compact(&self) -> Result<(), QueueError> {
        // Every removal already rewrites the file without the removed line.
        Ok(())
    }

    fn close(&self) -> Result<(), QueueError> {
        self.lock.remove()?;
        debug!(lock = %self.lock.path().display(), "Removed lock file");
        Ok(())
    }

    fn location(&self) -> &Path {
        &self.path
    }

    fn discipline(&self) -> Discipline {
        self.discipline
    }

    fn kind(&self) -> BackendKind {
        BackendKind::FlatFile
    }
}

/// Split file contents into item lines, skipping the empty leading segment.
fn parse_lines(contents: &str) -> Vec<String> {
    let mut lines: Vec<String> = contents.split('\n').map(str::to_string).collect();
    if lines.first().is_some_and(|first| first.is_empty()) {
        lines.remove(0);
    }
    lines
}
