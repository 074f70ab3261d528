//! Stored item types and their metadata.

use bytes::Bytes;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Identifiers
// ============================================================================

/// Backend-assigned ordering key. Strictly increasing and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SequenceId(i64);

impl SequenceId {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for SequenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Items
// ============================================================================

/// An opaque payload as removed from a backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredItem {
    /// Ordering key, when the backend records one
    pub sequence_id: Option<SequenceId>,
    /// Insertion time, when the backend records one
    pub enqueued_at: Option<DateTime<Utc>>,
    pub payload: Bytes,
}

impl StoredItem {
    /// An item known only by its payload (flat-file backend)
    pub fn from_payload(payload: Bytes) -> Self {
        Self {
            sequence_id: None,
            enqueued_at: None,
            payload,
        }
    }
}

/// A deserialized item together with its metadata
#[derive(Debug, Clone, PartialEq)]
pub struct QueueItem<T> {
    pub sequence_id: Option<SequenceId>,
    pub enqueued_at: Option<DateTime<Utc>>,
    pub value: T,
}

impl<T> QueueItem<T> {
    pub fn into_value(self) -> T {
        self.value
    }
}

/// Parse the `CURRENT_TIMESTAMP` text SQLite stores (`YYYY-MM-DD HH:MM:SS`, UTC).
pub(crate) fn parse_sqlite_timestamp(text: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
#[path = "item_tests.rs"]
mod tests;
