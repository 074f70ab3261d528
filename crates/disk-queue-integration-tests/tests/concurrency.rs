//! Integration tests for multi-actor access to one storage location
//!
//! These tests verify:
//! - Concurrent pollers never receive the same item
//! - Every item offered by concurrent producers is delivered exactly once
//!
//! Each thread opens its own queue handle, so the threads contend through the
//! storage layer exactly as separate processes would.

mod common;

use common::{open_queue, with_retry, work_item, WorkItem, BACKENDS};
use disk_queue::Discipline;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use tempfile::TempDir;

const CONSUMERS: usize = 4;

#[test]
fn test_concurrent_pollers_receive_distinct_items() {
    for backend in BACKENDS {
        for discipline in [Discipline::OldestFirst, Discipline::NewestFirst] {
            let temp_dir = TempDir::new().unwrap();
            let base = temp_dir.path().join("queue.db");

            let producer = open_queue::<WorkItem>(&base, backend, discipline);
            for index in 0..120 {
                producer.offer(&work_item(0, index)).unwrap();
            }

            let barrier = Arc::new(Barrier::new(CONSUMERS));
            let consumers: Vec<_> = (0..CONSUMERS)
                .map(|_| {
                    let base = base.clone();
                    let barrier = Arc::clone(&barrier);
                    thread::spawn(move || {
                        let queue = open_queue::<WorkItem>(&base, backend, discipline);
                        barrier.wait();

                        let mut taken = Vec::new();
                        while let Some(item) = with_retry(|| queue.poll()) {
                            taken.push(item);
                        }
                        taken
                    })
                })
                .collect();

            let mut seen = HashSet::new();
            for consumer in consumers {
                for item in consumer.join().unwrap() {
                    assert!(
                        seen.insert(item.clone()),
                        "{:?} delivered twice by {} backend",
                        item,
                        backend
                    );
                }
            }

            assert_eq!(seen.len(), 120, "backend {}", backend);
            assert_eq!(producer.count_items().unwrap(), 0);
        }
    }
}

#[test]
fn test_concurrent_producers_and_consumers_deliver_exactly_once() {
    const PRODUCERS: u32 = 3;
    const PER_PRODUCER: u32 = 40;

    for backend in BACKENDS {
        let temp_dir = TempDir::new().unwrap();
        let base: PathBuf = temp_dir.path().join("queue.db");
        let producers_done = Arc::new(AtomicBool::new(false));

        let producers: Vec<_> = (0..PRODUCERS)
            .map(|producer| {
                let base = base.clone();
                thread::spawn(move || {
                    let queue = open_queue::<WorkItem>(&base, backend, Discipline::OldestFirst);
                    for index in 0..PER_PRODUCER {
                        let item = work_item(producer, index);
                        assert!(with_retry(|| queue.offer(&item)));
                    }
                })
            })
            .collect();

        let consumers: Vec<_> = (0..CONSUMERS)
            .map(|_| {
                let base = base.clone();
                let producers_done = Arc::clone(&producers_done);
                thread::spawn(move || {
                    let queue = open_queue::<WorkItem>(&base, backend, Discipline::OldestFirst);
                    let mut taken = Vec::new();
                    loop {
                        // Read the flag before polling so an empty poll after it
                        // was set means the queue is drained.
                        let finished = producers_done.load(Ordering::SeqCst);
                        match with_retry(|| queue.poll()) {
                            Some(item) => taken.push(item),
                            None if finished => break,
                            None => thread::yield_now(),
                        }
                    }
                    taken
                })
            })
            .collect();

        for producer in producers {
            producer.join().unwrap();
        }
        producers_done.store(true, Ordering::SeqCst);

        let mut seen = HashSet::new();
        for consumer in consumers {
            for item in consumer.join().unwrap() {
                assert!(seen.insert(item.clone()), "{:?} delivered twice", item);
            }
        }

        let expected: HashSet<_> = (0..PRODUCERS)
            .flat_map(|p| (0..PER_PRODUCER).map(move |i| work_item(p, i)))
            .collect();
        assert_eq!(seen, expected, "backend {}", backend);
    }
}

#[test]
fn test_oldest_first_preserves_per_producer_order() {
    for backend in BACKENDS {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path().join("queue.db");

        let producers: Vec<_> = (0..2u32)
            .map(|producer| {
                let base = base.clone();
                thread::spawn(move || {
                    let queue = open_queue::<WorkItem>(&base, backend, Discipline::OldestFirst);
                    for index in 0..30 {
                        let item = work_item(producer, index);
                        with_retry(|| queue.offer(&item));
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }

        let queue = open_queue::<WorkItem>(&base, backend, Discipline::OldestFirst);
        let mut last_index = [None::<u32>; 2];
        while let Some(item) = queue.poll().unwrap() {
            let slot = &mut last_index[item.producer as usize];
            if let Some(previous) = *slot {
                assert!(item.index > previous, "backend {} reordered {:?}", backend, item);
            }
            *slot = Some(item.index);
        }
        assert_eq!(last_index, [Some(29), Some(29)]);
    }
}
