//! Leaf location: hand-over-hand reads, latch-crabbing writes.
//!
//! Both descents resolve the unique leaf whose key range contains the
//! search key. The read path holds at most two node locks at any moment.
//! The write path also runs two-locks-deep in the common case, but keeps an
//! ancestor's write lock for as long as a split or merge below could still
//! reach it; propagation then runs entirely on locks already held, so no
//! lock is ever acquired upward against the descent direction.

use std::sync::Arc;

use crate::compare::KeyComparator;
use crate::node::{max_keys, min_internal_keys, min_leaf_keys, Node, ReadGuard, WriteGuard};
use crate::tracing_helpers::trace_log;

use super::BPlusTree;

/// What a write descent is about to do. Decides when a just-locked child
/// makes the ancestors above it releasable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteIntent {
    /// Insertion: a node below max occupancy cannot split.
    Insert,
    /// Removal: a node above min occupancy cannot underflow.
    Remove,
}

/// Ancestor retained by a write descent: its write guard and the child
/// slot the descent took out of it.
pub(crate) struct PathEntry<K, V> {
    pub(crate) guard: WriteGuard<K, V>,
    pub(crate) child_idx: usize,
}

impl<K, V, C: KeyComparator<K>> BPlusTree<K, V, C> {
    /// Lock the current root node for reading.
    ///
    /// The root handle is re-read once the lock lands; if a root swap raced
    /// the acquisition, the stale node is released and the attempt retried.
    /// Swaps happen only under the old root's write lock, so a verified
    /// guard pins the node as root for as long as it is held.
    fn lock_root_read(&self) -> ReadGuard<K, V> {
        loop {
            let root = self.root_handle();
            let guard = root.read_arc();
            if Arc::ptr_eq(&root, &self.root.read()) {
                return guard;
            }
            trace_log!("read descent raced a root swap, retrying");
        }
    }

    /// Lock the current root node for writing. Same retry discipline as
    /// [`Self::lock_root_read`].
    fn lock_root_write(&self) -> WriteGuard<K, V> {
        loop {
            let root = self.root_handle();
            let guard = root.write_arc();
            if Arc::ptr_eq(&root, &self.root.read()) {
                return guard;
            }
            trace_log!("write descent raced a root swap, retrying");
        }
    }

    /// Descend to the leaf covering `key`, hand-over-hand under read locks.
    ///
    /// Each child's lock is acquired before the parent's is released, so
    /// the returned leaf is exactly the one responsible for `key` at the
    /// moment its lock landed.
    pub(crate) fn locate_leaf_read(&self, key: &K) -> ReadGuard<K, V> {
        let mut cur = self.lock_root_read();
        loop {
            let child = match &*cur {
                Node::Leaf(_) => return cur,
                Node::Internal(node) => Arc::clone(node.child_for(key, &self.comparator)),
            };
            let next = child.read_arc();
            cur = next;
        }
    }

    /// Descend to the leaf covering `key` under write locks, crabbing.
    ///
    /// Returns the retained ancestor path (outermost first, possibly empty)
    /// and the locked leaf. The path holds exactly the chain of nodes a
    /// split or merge starting at the leaf could propagate into: each
    /// retained node's child on the path was unsafe for `intent` when
    /// locked, and the topmost retained node is either the root or was
    /// itself safe.
    pub(crate) fn locate_leaf_write(
        &self,
        key: &K,
        intent: WriteIntent,
    ) -> (Vec<PathEntry<K, V>>, WriteGuard<K, V>) {
        let mut ancestors: Vec<PathEntry<K, V>> = Vec::new();
        let mut cur = self.lock_root_write();
        loop {
            let (child, child_idx) = match &*cur {
                Node::Leaf(_) => return (ancestors, cur),
                Node::Internal(node) => {
                    let idx = node.child_index(key, &self.comparator);
                    (Arc::clone(&node.children[idx]), idx)
                }
            };
            let child_guard = child.write_arc();
            ancestors.push(PathEntry {
                guard: cur,
                child_idx,
            });
            if self.is_safe(&child_guard, intent) {
                ancestors.clear();
            }
            cur = child_guard;
        }
    }

    /// Whether a mutation below `node` can propagate past it.
    fn is_safe(&self, node: &Node<K, V>, intent: WriteIntent) -> bool {
        match intent {
            WriteIntent::Insert => node.key_count() < max_keys(self.order),

            WriteIntent::Remove => match node {
                Node::Leaf(leaf) => leaf.keys.len() > min_leaf_keys(self.order),
                Node::Internal(internal) => internal.keys.len() > min_internal_keys(self.order),
            },
        }
    }
}
