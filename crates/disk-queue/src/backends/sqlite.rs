//! SQLite queue backend.
//!
//! Items live in a single `queue` table keyed by an `AUTOINCREMENT` id, so ids
//! are strictly increasing and never reused after deletion. Removal runs inside
//! a `BEGIN EXCLUSIVE` transaction: select the extreme id for the discipline,
//! delete it by id, commit. No two connections can observe and remove the same
//! row.
//!
//! SQLite occasionally fails the first read of a fresh exclusive transaction
//! under concurrent access (`database schema has changed`). A failed or empty
//! selection is therefore read a second time before it is accepted.

use crate::backend::StorageBackend;
use crate::config::{BackendKind, Discipline};
use crate::error::QueueError;
use crate::item::{parse_sqlite_timestamp, SequenceId, StoredItem};
use bytes::Bytes;
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, TransactionBehavior};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

#[cfg(test)]
#[path = "sqlite_tests.rs"]
mod tests;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS queue(\
    id INTEGER PRIMARY KEY AUTOINCREMENT, \
    date TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP, \
    item BLOB)";

/// Selections attempted inside one removal before giving up
pub(crate) const READ_ATTEMPTS: usize = 2;

/// Transactional backend over a SQLite database file
#[derive(Debug)]
pub struct SqliteBackend {
    path: PathBuf,
    discipline: Discipline,
    busy_timeout: Duration,
    connection: Mutex<Option<Connection>>,
}

/// A selected row, before deletion
struct QueueRow {
    id: i64,
    date: Option<String>,
    item: Vec<u8>,
}

impl QueueRow {
    /// Build a row from `id, date, item`.
    ///
    /// Other writers of the same table may store items as TEXT and dates in
    /// any storage class, so neither column is read with a strict type.
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        let date = match row.get_ref(1)? {
            ValueRef::Text(text) => Some(String::from_utf8_lossy(text).into_owned()),
            _ => None,
        };
        let item = match row.get_ref(2)? {
            ValueRef::Blob(bytes) | ValueRef::Text(bytes) => bytes.to_vec(),
            ValueRef::Integer(value) => value.to_string().into_bytes(),
            ValueRef::Real(value) => value.to_string().into_bytes(),
            ValueRef::Null => Vec::new(),
        };
        Ok(Self {
            id: row.get(0)?,
            date,
            item,
        })
    }

    fn into_item(self) -> StoredItem {
        StoredItem {
            sequence_id: Some(SequenceId::new(self.id)),
            enqueued_at: self.date.as_deref().and_then(parse_sqlite_timestamp),
            payload: Bytes::from(self.item),
        }
    }
}

/// Result of the retried selection
#[derive(Debug)]
enum ReadOutcome<T, E> {
    Found(T),
    Empty,
    Failed(E),
}

impl SqliteBackend {
    /// Create a backend over `path`. The database is opened on first use.
    pub fn new(path: impl Into<PathBuf>, discipline: Discipline, busy_timeout: Duration) -> Self {
        Self {
            path: path.into(),
            discipline,
            busy_timeout,
            connection: Mutex::new(None),
        }
    }

    /// Whether the database connection has been opened
    pub fn is_open(&self) -> bool {
        self.slot().is_some()
    }

    fn slot(&self) -> MutexGuard<'_, Option<Connection>> {
        // A panic while holding the slot leaves the connection usable: an
        // unfinished transaction is rolled back when it is dropped.
        self.connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` with the connection, opening it and creating the schema if needed.
    fn with_connection<R>(
        &self,
        f: impl FnOnce(&mut Connection) -> Result<R, QueueError>,
    ) -> Result<R, QueueError> {
        let mut slot = self.slot();
        let connection = match slot.take() {
            Some(connection) => connection,
            None => self.open()?,
        };
        f(slot.insert(connection))
    }

    fn open(&self) -> Result<Connection, QueueError> {
        let unavailable = |message: String| QueueError::StorageUnavailable {
            path: self.path.clone(),
            message,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| unavailable(e.to_string()))?;
        }

        let connection = Connection::open(&self.path).map_err(|e| unavailable(e.to_string()))?;
        connection
            .busy_timeout(self.busy_timeout)
            .map_err(|e| unavailable(e.to_string()))?;
        connection.execute_batch(SCHEMA).map_err(|e| match e.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => {
                map_sqlite_error(e)
            }
            _ => unavailable(e.to_string()),
        })?;

        info!(path = %self.path.display(), "Opened SQLite queue");
        Ok(connection)
    }

    fn select_next(&self, connection: &Connection) -> rusqlite::Result<Option<QueueRow>> {
        let sql = format!(
            "SELECT id, date, item FROM queue ORDER BY id {} LIMIT 1",
            self.discipline.sql_order()
        );
        connection
            .query_row(&sql, [], QueueRow::from_row)
            .optional()
    }
}

impl StorageBackend for SqliteBackend {
    fn append(&self, payload: &[u8]) -> Result<bool, QueueError> {
        self.with_connection(|connection| {
            let changed = connection
                .execute("INSERT INTO queue (item) VALUES (?1)", params![payload])
                .map_err(map_sqlite_error)?;
            debug!(
                path = %self.path.display(),
                id = connection.last_insert_rowid(),
                bytes = payload.len(),
                "Appended item"
            );
            Ok(changed == 1)
        })
    }

    fn remove_next(&self) -> Result<Option<StoredItem>, QueueError> {
        self.with_connection(|connection| {
            let transaction = connection
                .transaction_with_behavior(TransactionBehavior::Exclusive)
                .map_err(map_sqlite_error)?;

            match read_with_retry(|| self.select_next(&transaction)) {
                ReadOutcome::Found(row) => {
                    transaction
                        .execute("DELETE FROM queue WHERE id = ?1", params![row.id])
                        .map_err(map_sqlite_error)?;
                    transaction.commit().map_err(map_sqlite_error)?;
                    debug!(path = %self.path.display(), id = row.id, "Removed item");
                    Ok(Some(row.into_item()))
                }
                ReadOutcome::Empty => {
                    transaction.rollback().map_err(map_sqlite_error)?;
                    Ok(None)
                }
                ReadOutcome::Failed(e) => {
                    warn!(
                        path = %self.path.display(),
                        error = %e,
                        "Queue read failed after retry; returning no item"
                    );
                    transaction.rollback().map_err(map_sqlite_error)?;
                    Ok(None)
                }
            }
        })
    }

    /// Number of stored rows.
    ///
    /// A failed read, including one that timed out on a busy database, is
    /// logged and reported as `0`. Under contention a zero count therefore
    /// does not prove the queue is drained.
    fn count(&self) -> Result<usize, QueueError> {
        self.with_connection(|connection| {
            match connection.query_row("SELECT count(id) FROM queue", [], |row| {
                row.get::<_, i64>(0)
            }) {
                Ok(count) => Ok(usize::try_from(count).unwrap_or(0)),
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "Failed to count queue items");
                    Ok(0)
                }
            }
        })
    }

    fn compact(&self) -> Result<(), QueueError> {
        self.with_connection(|connection| {
            connection
                .execute_batch("VACUUM")
                .map_err(map_sqlite_error)?;
            info!(path = %self.path.display(), "Compacted SQLite queue");
            Ok(())
        })
    }

    fn close(&self) -> Result<(), QueueError> {
        let Some(connection) = self.slot().take() else {
            return Ok(());
        };

        connection
            .execute_batch("VACUUM")
            .map_err(map_sqlite_error)?;
        connection
            .close()
            .map_err(|(_, e)| map_sqlite_error(e))?;
        info!(path = %self.path.display(), "Compacted and closed SQLite queue");
        Ok(())
    }

    fn location(&self) -> &Path {
        &self.path
    }

    fn discipline(&self) -> Discipline {
        self.discipline
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Transactional
    }
}

/// Run `read` up to [`READ_ATTEMPTS`] times until it finds a row.
fn read_with_retry<T, E: fmt::Display>(
    mut read: impl FnMut() -> Result<Option<T>, E>,
) -> ReadOutcome<T, E> {
    let mut outcome = ReadOutcome::Empty;
    for attempt in 1..=READ_ATTEMPTS {
        outcome = match read() {
            Ok(Some(row)) => return ReadOutcome::Found(row),
            Ok(None) => ReadOutcome::Empty,
            Err(e) => {
                debug!(attempt, error = %e, "Queue read failed");
                ReadOutcome::Failed(e)
            }
        };
    }
    outcome
}

/// Busy and locked conditions are transient; everything else is a storage failure.
fn map_sqlite_error(e: rusqlite::Error) -> QueueError {
    match e.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => {
            QueueError::StorageBusy {
                message: e.to_string(),
            }
        }
        _ => QueueError::Storage {
            message: e.to_string(),
        },
    }
}
