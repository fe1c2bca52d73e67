//! Concurrency stress tests.
//!
//! These hammer a shared tree from many threads and check the things the
//! locking discipline promises: structural invariants whenever quiesced,
//! writes visible to readers that start after the insert returned, readers
//! sharing leaves, and ordered (not snapshot) range scans under churn.
//!
//! ```bash
//! cargo test --test stress_tests --release
//! ```

#![expect(clippy::unwrap_used, reason = "fail fast in tests")]

mod common;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;

use leafline::BPlusTree;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const THREADS: usize = 8;

/// Value encoding used by the chaos test: the upper half names the key it
/// was written for, so any observed value can be checked for integrity.
fn tag(key: u32, nonce: u32) -> u64 {
    (u64::from(key) << 32) | u64::from(nonce)
}

#[test]
fn disjoint_writers_build_a_consistent_tree() {
    common::init_tracing();
    let tree: BPlusTree<u32, u64> = BPlusTree::new(4).unwrap();
    let per_thread = 500u32;

    thread::scope(|scope| {
        for t in 0..THREADS as u32 {
            let tree = &tree;
            scope.spawn(move || {
                // Thread t owns keys congruent to t mod THREADS.
                for i in 0..per_thread {
                    let k = i * THREADS as u32 + t;
                    tree.insert(k, tag(k, t)).unwrap();
                }
                // Drop every other owned key again.
                for i in (0..per_thread).step_by(2) {
                    let k = i * THREADS as u32 + t;
                    tree.remove(&k).unwrap();
                }
            });
        }
    });

    let report = tree.verify().unwrap();
    assert_eq!(report.entries, THREADS * (per_thread as usize) / 2);

    for t in 0..THREADS as u32 {
        for i in 0..per_thread {
            let k = i * THREADS as u32 + t;
            let found = tree.get(&k);
            if i % 2 == 0 {
                assert!(found.is_none(), "key {k} should have been removed");
            } else {
                assert_eq!(*found.unwrap(), tag(k, t), "key {k} lost or corrupted");
            }
        }
    }
}

#[test]
fn chaos_mix_preserves_invariants() {
    common::init_tracing();
    let tree: BPlusTree<u32, u64> = BPlusTree::new(4).unwrap();
    let ops_per_thread = 10_000usize;

    thread::scope(|scope| {
        for t in 0..THREADS {
            let tree = &tree;
            scope.spawn(move || {
                let mut rng = StdRng::seed_from_u64(0xC0FFEE ^ t as u64);
                for _ in 0..ops_per_thread {
                    let k = rng.gen_range(0..1000u32);
                    match rng.gen_range(0..10u8) {
                        0..=4 => {
                            let _ = tree.insert(k, tag(k, t as u32));
                        }
                        5..=7 => {
                            let _ = tree.remove(&k);
                        }
                        _ => {
                            // Any value observed must belong to this key.
                            if let Some(v) = tree.get(&k) {
                                assert_eq!((*v >> 32) as u32, k, "torn value for key {k}");
                            }
                        }
                    }
                }
            });
        }
    });

    let report = tree.verify().unwrap();
    assert_eq!(report.entries, tree.len());
    for k in 0..1000u32 {
        if let Some(v) = tree.get(&k) {
            assert_eq!((*v >> 32) as u32, k);
        }
    }
}

#[test]
fn inserts_are_visible_to_later_readers() {
    let tree: BPlusTree<u32, u64> = BPlusTree::new(4).unwrap();
    let published = AtomicUsize::new(0);
    let stop = AtomicBool::new(false);
    let total = 4_000u32;

    thread::scope(|scope| {
        let tree_ref = &tree;
        let published_ref = &published;
        let stop_ref = &stop;

        scope.spawn(move || {
            for k in 0..total {
                tree_ref.insert(k, tag(k, 0)).unwrap();
                // The insert's locks are released once it returns; any
                // reader that starts after this store must see the key.
                published_ref.store(k as usize + 1, Ordering::Release);
            }
            stop_ref.store(true, Ordering::Release);
        });

        for seed in 0..(THREADS as u64 - 1) {
            scope.spawn(move || {
                let mut rng = StdRng::seed_from_u64(seed);
                while !stop_ref.load(Ordering::Acquire) {
                    let bound = published_ref.load(Ordering::Acquire);
                    if bound == 0 {
                        continue;
                    }
                    let k = rng.gen_range(0..bound) as u32;
                    let v = tree_ref
                        .get(&k)
                        .unwrap_or_else(|| panic!("published key {k} not visible"));
                    assert_eq!(*v, tag(k, 0));
                }
            });
        }
    });

    assert_eq!(tree.len(), total as usize);
    tree.verify().unwrap();
}

#[test]
fn scans_stay_ordered_under_churn() {
    let tree: BPlusTree<u32, u64> = BPlusTree::new(3).unwrap();
    // Odd keys are stable residents; writers churn the even keys, forcing
    // splits and merges under the scanners' feet.
    for k in (1..2000u32).step_by(2) {
        tree.insert(k, u64::from(k)).unwrap();
    }
    let stop = AtomicBool::new(false);

    thread::scope(|scope| {
        let tree_ref = &tree;
        let stop_ref = &stop;

        for t in 0..2u64 {
            scope.spawn(move || {
                let mut rng = StdRng::seed_from_u64(t);
                while !stop_ref.load(Ordering::Acquire) {
                    let k = rng.gen_range(0..1000u32) * 2;
                    if rng.gen_bool(0.5) {
                        let _ = tree_ref.insert(k, u64::from(k));
                    } else {
                        let _ = tree_ref.remove(&k);
                    }
                }
            });
        }

        for _ in 0..4 {
            scope.spawn(move || {
                for _ in 0..200 {
                    let hits = tree_ref.range(&0, &1999, usize::MAX);
                    let keys: Vec<u64> = hits.iter().map(|v| **v).collect();
                    assert!(
                        keys.windows(2).all(|w| w[0] < w[1]),
                        "scan results out of order"
                    );
                    // Residents inside the scanned interval always appear.
                    let odd_count = keys.iter().filter(|k| *k % 2 == 1).count();
                    assert_eq!(odd_count, 1000, "scan dropped a stable resident");
                }
            });
        }

        // Scanners finish on their own; then stop the writers.
        // (Spawned scanner handles joined by scope exit; writers poll stop.)
        scope.spawn(move || {
            // Give scanners a moment of real contention before shutdown.
            thread::sleep(std::time::Duration::from_millis(300));
            stop_ref.store(true, Ordering::Release);
        });
    });

    tree.verify().unwrap();
}

#[test]
fn readers_share_leaves() {
    // Two readers parked inside overlapping lookups at once: if read locks
    // excluded each other, the rendezvous below would deadlock instead of
    // both arriving.
    let tree: BPlusTree<u32, u64> = BPlusTree::new(4).unwrap();
    for k in 0..100u32 {
        tree.insert(k, u64::from(k)).unwrap();
    }
    let arrivals = AtomicUsize::new(0);

    thread::scope(|scope| {
        for _ in 0..2 {
            let tree_ref = &tree;
            let arrivals_ref = &arrivals;
            scope.spawn(move || {
                for _ in 0..10_000 {
                    assert!(tree_ref.get(&50).is_some());
                }
                arrivals_ref.fetch_add(1, Ordering::SeqCst);
            });
        }
    });

    assert_eq!(arrivals.load(Ordering::SeqCst), 2);
}
