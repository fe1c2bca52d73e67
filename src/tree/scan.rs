//! Ordered range scans over the leaf chain.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::compare::KeyComparator;
use crate::node::search_keys;

use super::BPlusTree;

impl<K, V, C: KeyComparator<K>> BPlusTree<K, V, C> {
    /// Collect the values of all keys in `[lo, hi]`, ascending, capped at
    /// `cap` results.
    ///
    /// An inverted range (`lo > hi`) yields nothing; truncation at `cap` is
    /// silent. A writer racing the scan may or may not be observed, but the
    /// emitted values are always in strictly ascending key order — the scan
    /// is ordered, not a point-in-time snapshot.
    #[must_use]
    pub fn range(&self, lo: &K, hi: &K, cap: usize) -> Vec<Arc<V>> {
        let mut out = Vec::new();
        self.range_into(lo, hi, &mut out, cap);
        out
    }

    /// Append up to `cap` values of keys in `[lo, hi]` to `out`, returning
    /// how many were written.
    ///
    /// The scan descends to the leaf covering `lo` and then walks the
    /// chain, taking each next leaf's read lock before releasing the
    /// current one. At most two leaves are locked at any moment, and
    /// writers proceed on leaves outside that window.
    pub fn range_into(&self, lo: &K, hi: &K, out: &mut Vec<Arc<V>>, cap: usize) -> usize {
        if cap == 0 || self.comparator.compare(lo, hi) == Ordering::Greater {
            return 0;
        }

        let mut guard = self.locate_leaf_read(lo);
        let mut slot = {
            let leaf = guard.expect_leaf();
            match search_keys(&leaf.keys, lo, &self.comparator) {
                Ok(slot) | Err(slot) => slot,
            }
        };

        let mut emitted = 0usize;
        loop {
            let next_ref = {
                let leaf = guard.expect_leaf();
                while slot < leaf.keys.len() {
                    if self.comparator.compare(&leaf.keys[slot], hi) == Ordering::Greater {
                        return emitted;
                    }
                    out.push(leaf.records[slot].clone_value());
                    emitted += 1;
                    if emitted == cap {
                        return emitted;
                    }
                    slot += 1;
                }
                match &leaf.next {
                    Some(next) => Arc::clone(next),
                    None => return emitted,
                }
            };

            // Forward hand-off: the next leaf locks before this one
            // unlocks.
            let next_guard = next_ref.read_arc();
            guard = next_guard;
            slot = 0;
        }
    }
}
