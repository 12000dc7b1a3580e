//! Multi-threaded admission tests for the transaction manager.

use lattice_core::{LocalHandle, TransactionManager};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn h(raw: u32) -> LocalHandle {
    LocalHandle::new(raw)
}

#[test]
fn test_reentrant_holder_keeps_handle_until_last_end() {
    let manager = Arc::new(TransactionManager::new());
    let first = manager.begin(&[h(5)], |_| {});
    let second = manager.begin(&[h(5)], |_| {});

    let acquired = Arc::new(AtomicBool::new(false));
    let worker = {
        let manager = Arc::clone(&manager);
        let acquired = Arc::clone(&acquired);
        thread::spawn(move || {
            let token = manager.begin(&[h(5)], |_| {});
            acquired.store(true, Ordering::SeqCst);
            manager.end(token, |_| {});
        })
    };

    manager.end(second, |_| {});
    thread::sleep(Duration::from_millis(100));
    assert!(!acquired.load(Ordering::SeqCst), "handle 5 released after one end");

    manager.end(first, |_| {});
    worker.join().unwrap();
    assert!(acquired.load(Ordering::SeqCst));
}

#[test]
fn test_overlapping_sets_are_mutually_exclusive() {
    let manager = Arc::new(TransactionManager::new());
    let inside = Arc::new(AtomicUsize::new(0));
    let overlaps = Arc::new(AtomicUsize::new(0));
    let num_threads = 8;
    let rounds = 200;

    let workers: Vec<_> = (0..num_threads)
        .map(|t| {
            let manager = Arc::clone(&manager);
            let inside = Arc::clone(&inside);
            let overlaps = Arc::clone(&overlaps);
            thread::spawn(move || {
                // Every set contains handle 1, plus one handle private to the thread.
                let handles = [h(1), h(100 + t)];
                for _ in 0..rounds {
                    let token = manager.begin(&handles, |_| {});
                    if inside.fetch_add(1, Ordering::SeqCst) != 0 {
                        overlaps.fetch_add(1, Ordering::SeqCst);
                    }
                    thread::yield_now();
                    inside.fetch_sub(1, Ordering::SeqCst);
                    manager.end(token, |_| {});
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }
    assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    assert_eq!(manager.active_threads(), 0);
}

#[test]
fn test_first_acquire_flags_follow_outermost_transaction() {
    let manager = TransactionManager::new();
    let flagged = AtomicUsize::new(0);

    let outer = manager.begin(&[h(1), h(2)], |_| {
        flagged.fetch_add(1, Ordering::SeqCst);
    });
    let inner = manager.begin_with_extra(&[h(2)], h(3), |_| {
        flagged.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(flagged.load(Ordering::SeqCst), 3);

    manager.end(inner, |_| {
        flagged.fetch_sub(1, Ordering::SeqCst);
    });
    assert_eq!(flagged.load(Ordering::SeqCst), 2);

    manager.end(outer, |_| {
        flagged.fetch_sub(1, Ordering::SeqCst);
    });
    assert_eq!(flagged.load(Ordering::SeqCst), 0);
}

#[test]
fn test_waiters_all_wake_on_release() {
    let manager = Arc::new(TransactionManager::new());
    let token = manager.begin(&[h(7)], |_| {});
    let woken = Arc::new(AtomicUsize::new(0));

    let waiters: Vec<_> = (0..4)
        .map(|_| {
            let manager = Arc::clone(&manager);
            let woken = Arc::clone(&woken);
            thread::spawn(move || {
                manager.wait_on(h(7));
                woken.fetch_add(1, Ordering::SeqCst);
            })
        })
        .collect();

    thread::sleep(Duration::from_millis(50));
    assert_eq!(woken.load(Ordering::SeqCst), 0);

    manager.end(token, |_| {});
    for waiter in waiters {
        waiter.join().unwrap();
    }
    assert_eq!(woken.load(Ordering::SeqCst), 4);
}
