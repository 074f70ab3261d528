//! Tests for the advisory lock utility.

use super::*;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

fn try_lock_from_other_handle(path: &Path) -> bool {
    let file = OpenOptions::new().write(true).open(path).unwrap();
    let locked = file.try_lock_exclusive().is_ok();
    if locked {
        FileExt::unlock(&file).unwrap();
    }
    locked
}

#[test]
fn test_lock_path_is_derived_from_location() {
    let lock = FileLock::for_location(Path::new("/data/queue.db.notrans"));
    assert_eq!(lock.path(), Path::new("/data/queue.db.notrans.lock"));
}

#[test]
fn test_acquire_creates_lock_file() {
    let temp_dir = TempDir::new().unwrap();
    let lock = FileLock::for_location(&temp_dir.path().join("queue.db"));

    let guard = lock.acquire().expect("Failed to acquire lock");
    assert!(lock.path().exists());
    guard.release().unwrap();
}

#[test]
fn test_acquire_creates_missing_parent_directory() {
    let temp_dir = TempDir::new().unwrap();
    let lock = FileLock::for_location(&temp_dir.path().join("nested/dir/queue.db"));

    let guard = lock.acquire().expect("Failed to acquire lock");
    assert!(lock.path().exists());
    drop(guard);
}

#[test]
fn test_release_keeps_lock_file() {
    let temp_dir = TempDir::new().unwrap();
    let lock = FileLock::for_location(&temp_dir.path().join("queue.db"));

    lock.acquire().unwrap().release().unwrap();
    assert!(lock.path().exists());

    // Reacquiring after release must not block
    lock.acquire().unwrap().release().unwrap();
}

#[test]
fn test_held_lock_excludes_other_handles() {
    let temp_dir = TempDir::new().unwrap();
    let lock = FileLock::for_location(&temp_dir.path().join("queue.db"));

    let guard = lock.acquire().unwrap();
    assert!(!try_lock_from_other_handle(lock.path()));

    guard.release().unwrap();
    assert!(try_lock_from_other_handle(lock.path()));
}

#[test]
fn test_drop_releases_lock() {
    let temp_dir = TempDir::new().unwrap();
    let lock = FileLock::for_location(&temp_dir.path().join("queue.db"));

    {
        let _guard = lock.acquire().unwrap();
        assert!(!try_lock_from_other_handle(lock.path()));
    }

    assert!(try_lock_from_other_handle(lock.path()));
}

#[test]
fn test_acquire_blocks_until_released() {
    let temp_dir = TempDir::new().unwrap();
    let lock = FileLock::for_location(&temp_dir.path().join("queue.db"));
    let guard = lock.acquire().unwrap();

    let (tx, rx) = mpsc::channel();
    let waiter_lock = lock.clone();
    let waiter = thread::spawn(move || {
        let guard = waiter_lock.acquire().unwrap();
        tx.send(()).unwrap();
        guard.release().unwrap();
    });

    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    guard.release().unwrap();
    assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());
    waiter.join().unwrap();
}

#[test]
fn test_remove_deletes_lock_file_and_tolerates_missing() {
    let temp_dir = TempDir::new().unwrap();
    let lock = FileLock::for_location(&temp_dir.path().join("queue.db"));

    lock.acquire().unwrap().release().unwrap();
    lock.remove().unwrap();
    assert!(!lock.path().exists());

    lock.remove().unwrap();
}
