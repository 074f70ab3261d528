//! Common test utilities for disk-queue integration tests
//!
//! This module provides:
//! - Queue construction over either backend for a shared location
//! - Retry helpers for transient storage contention
//! - Shared test data builders

use disk_queue::{
    BackendKind, Discipline, DiskQueue, FlatFileBackend, QueueError, SqliteBackend,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::Path;
use std::thread;
use std::time::Duration;

/// Backends exercised by every cross-backend test
pub const BACKENDS: [BackendKind; 2] = [BackendKind::Transactional, BackendKind::FlatFile];

/// Open an independent queue handle on `base` with the given backend.
///
/// Handles opened on the same `base` share storage, like separate processes.
pub fn open_queue<T>(base: &Path, backend: BackendKind, discipline: Discipline) -> DiskQueue<T>
where
    T: Serialize + DeserializeOwned,
{
    let location = backend.storage_location(base);
    match backend {
        BackendKind::Transactional => DiskQueue::with_backend(Box::new(SqliteBackend::new(
            location,
            discipline,
            Duration::from_secs(30),
        ))),
        BackendKind::FlatFile => {
            DiskQueue::with_backend(Box::new(FlatFileBackend::new(location, discipline)))
        }
    }
}

/// Retry `op` while it fails with a transient error
#[allow(dead_code)]
pub fn with_retry<R>(mut op: impl FnMut() -> Result<R, QueueError>) -> R {
    for _ in 0..100 {
        match op() {
            Ok(value) => return value,
            Err(e) if e.is_transient() => thread::sleep(Duration::from_millis(10)),
            Err(e) => panic!("queue operation failed: {}", e),
        }
    }
    panic!("queue operation stayed busy after 100 attempts");
}

/// Work item used as a structured payload
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkItem {
    pub producer: u32,
    pub index: u32,
    pub body: String,
}

#[allow(dead_code)]
pub fn work_item(producer: u32, index: u32) -> WorkItem {
    WorkItem {
        producer,
        index,
        body: format!("producer {} item {}\nwith a second line", producer, index),
    }
}
