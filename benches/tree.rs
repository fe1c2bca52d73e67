//! Criterion comparison against `std::collections::BTreeMap`.
//!
//! The std map is single-threaded and lock-free, so it bounds what the
//! locked tree costs per operation; the interesting numbers are the
//! concurrent ones, where `BTreeMap` needs an external lock and this tree
//! does not.

use std::collections::BTreeMap;
use std::hint::black_box;
use std::sync::Mutex;
use std::thread;

use criterion::{criterion_group, criterion_main, Criterion};
use leafline::BPlusTree;

const N: u64 = 10_000;

fn insert_sequential(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert_sequential");
    group.bench_function("leafline", |b| {
        b.iter(|| {
            let tree: BPlusTree<u64, u64> = BPlusTree::new(64).unwrap();
            for k in 0..N {
                tree.insert(black_box(k), k).unwrap();
            }
            tree
        });
    });
    group.bench_function("btreemap", |b| {
        b.iter(|| {
            let mut map = BTreeMap::new();
            for k in 0..N {
                map.insert(black_box(k), k);
            }
            map
        });
    });
    group.finish();
}

fn get_hit(c: &mut Criterion) {
    let tree: BPlusTree<u64, u64> = BPlusTree::new(64).unwrap();
    let mut map = BTreeMap::new();
    for k in 0..N {
        tree.insert(k, k).unwrap();
        map.insert(k, k);
    }

    let mut group = c.benchmark_group("get_hit");
    group.bench_function("leafline", |b| {
        let mut k = 0;
        b.iter(|| {
            k = (k + 7) % N;
            black_box(tree.get(&k))
        });
    });
    group.bench_function("btreemap", |b| {
        let mut k = 0;
        b.iter(|| {
            k = (k + 7) % N;
            black_box(map.get(&k))
        });
    });
    group.finish();
}

fn range_100(c: &mut Criterion) {
    let tree: BPlusTree<u64, u64> = BPlusTree::new(64).unwrap();
    let mut map = BTreeMap::new();
    for k in 0..N {
        tree.insert(k, k).unwrap();
        map.insert(k, k);
    }

    let mut group = c.benchmark_group("range_100");
    group.bench_function("leafline", |b| {
        let mut lo = 0;
        b.iter(|| {
            lo = (lo + 131) % (N - 100);
            black_box(tree.range(&lo, &(lo + 99), 128))
        });
    });
    group.bench_function("btreemap", |b| {
        let mut lo = 0;
        b.iter(|| {
            lo = (lo + 131) % (N - 100);
            let hits: Vec<u64> = map.range(lo..=lo + 99).map(|(_, v)| *v).collect();
            black_box(hits)
        });
    });
    group.finish();
}

fn concurrent_reads(c: &mut Criterion) {
    let tree: BPlusTree<u64, u64> = BPlusTree::new(64).unwrap();
    let locked_map = Mutex::new(BTreeMap::new());
    for k in 0..N {
        tree.insert(k, k).unwrap();
        locked_map.lock().unwrap().insert(k, k);
    }
    let threads = 4;

    let mut group = c.benchmark_group("concurrent_reads_x4");
    group.bench_function("leafline", |b| {
        b.iter(|| {
            thread::scope(|scope| {
                for t in 0..threads {
                    let tree = &tree;
                    scope.spawn(move || {
                        let mut k = t * 31;
                        for _ in 0..1000 {
                            k = (k + 7) % N;
                            black_box(tree.get(&k));
                        }
                    });
                }
            });
        });
    });
    group.bench_function("mutex_btreemap", |b| {
        b.iter(|| {
            thread::scope(|scope| {
                for t in 0..threads {
                    let map = &locked_map;
                    scope.spawn(move || {
                        let mut k = t * 31;
                        for _ in 0..1000 {
                            k = (k + 7) % N;
                            black_box(map.lock().unwrap().get(&k).copied());
                        }
                    });
                }
            });
        });
    });
    group.finish();
}

criterion_group!(benches, insert_sequential, get_hit, range_100, concurrent_reads);
criterion_main!(benches);
