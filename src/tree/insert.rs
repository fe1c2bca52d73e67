//! Insertion and split propagation.
//!
//! Duplicate detection is fused into the mutating descent: one pass under
//! write locks that aborts before taking ownership when the key is already
//! present. A full leaf absorbs the new entry first and then sheds its
//! upper half into a fresh right sibling; separators propagate up the
//! retained ancestor path, growing a new root when the old one splits.

use std::sync::atomic::Ordering as AtomicOrdering;
use std::sync::Arc;

use parking_lot::lock_api::ArcRwLockWriteGuard;
use parking_lot::RwLock;

use crate::compare::KeyComparator;
use crate::error::InsertError;
use crate::node::{max_keys, InternalNode, LeafNode, Node, NodeRef, Record, WriteGuard};
use crate::tracing_helpers::{debug_log, trace_log};

use super::descend::{PathEntry, WriteIntent};
use super::BPlusTree;

impl<K, V, C> BPlusTree<K, V, C>
where
    K: Clone,
    C: KeyComparator<K>,
{
    /// Insert `key` mapped to `value`.
    ///
    /// # Errors
    ///
    /// [`InsertError::Duplicate`] when the key is already present: the tree
    /// is unchanged and ownership of both key and value returns to the
    /// caller.
    pub fn insert(&self, key: K, value: V) -> Result<(), InsertError<K, V>> {
        let (ancestors, mut leaf_guard) = self.locate_leaf_write(&key, WriteIntent::Insert);

        let leaf = leaf_guard.expect_leaf_mut();
        let slot = match leaf.search(&key, &self.comparator) {
            Ok(_) => return Err(InsertError::Duplicate { key, value }),
            Err(slot) => slot,
        };
        leaf.keys.insert(slot, key);
        leaf.records.insert(slot, Record::new(value));
        let overflow = leaf.keys.len() > max_keys(self.order);
        self.len.fetch_add(1, AtomicOrdering::Relaxed);

        if overflow {
            self.split_leaf(ancestors, leaf_guard);
        }
        Ok(())
    }

    /// Shed the upper half of an overflowing leaf into a new right sibling,
    /// thread it into the chain, and push the separator upward.
    fn split_leaf(&self, ancestors: Vec<PathEntry<K, V>>, mut left_guard: WriteGuard<K, V>) {
        // Keep ⌈order/2⌉ entries on the left.
        let split_at = self.order.div_ceil(2);

        let (sep, right_ref) = {
            let left = left_guard.expect_leaf_mut();
            let right_keys = left.keys.split_off(split_at);
            let right_records = left.records.split_off(split_at);
            let sep = right_keys[0].clone();
            let right = LeafNode {
                keys: right_keys,
                records: right_records,
                next: left.next.take(),
            };
            let right_ref: NodeRef<K, V> = Arc::new(RwLock::new(Node::Leaf(right)));
            left.next = Some(Arc::clone(&right_ref));
            (sep, right_ref)
        };
        debug_log!(split_at, "leaf split");

        // The new sibling stays write-locked until it is reachable through
        // its parent, matching the old leaf's lock scope.
        let right_guard = right_ref.write_arc();
        let left_ref = Arc::clone(ArcRwLockWriteGuard::rwlock(&left_guard));
        let held = vec![left_guard, right_guard];
        self.insert_into_parent(ancestors, left_ref, sep, right_ref, held);
    }

    /// Install `(sep, right)` just after `left` in its parent, splitting
    /// upward while parents overflow. `held` pins the write guards of every
    /// node split so far; they release together once propagation lands.
    fn insert_into_parent(
        &self,
        mut ancestors: Vec<PathEntry<K, V>>,
        mut left: NodeRef<K, V>,
        mut sep: K,
        mut right: NodeRef<K, V>,
        mut held: Vec<WriteGuard<K, V>>,
    ) {
        loop {
            let Some(PathEntry {
                mut guard,
                child_idx,
            }) = ancestors.pop()
            else {
                // `left` was the root: grow the tree by one level. The old
                // root's write guard is still pinned in `held`, so no
                // descent can have trusted the stale handle.
                let new_root: NodeRef<K, V> = Arc::new(RwLock::new(Node::Internal(InternalNode {
                    keys: vec![sep],
                    children: vec![left, right],
                })));
                *self.root.write() = new_root;
                debug_log!("root split, tree grew one level");
                return;
            };

            {
                let parent = guard.expect_internal_mut();
                debug_assert!(Arc::ptr_eq(&parent.children[child_idx], &left));
                parent.keys.insert(child_idx, sep);
                parent.children.insert(child_idx + 1, right);
                if parent.keys.len() <= max_keys(self.order) {
                    return;
                }
            }

            // Parent overflowed: promote its middle key. The promoted key
            // is retained in neither half.
            let new_right = {
                let parent = guard.expect_internal_mut();
                let mid = self.order / 2;
                sep = parent.keys.remove(mid);
                let right_keys = parent.keys.split_off(mid);
                let right_children = parent.children.split_off(mid + 1);
                Arc::new(RwLock::new(Node::Internal(InternalNode {
                    keys: right_keys,
                    children: right_children,
                })))
            };
            trace_log!("internal split");

            let right_guard = new_right.write_arc();
            left = Arc::clone(ArcRwLockWriteGuard::rwlock(&guard));
            right = new_right;
            held.push(guard);
            held.push(right_guard);
        }
    }
}
