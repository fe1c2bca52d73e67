//! Deletion with full rebalancing: redistribution, merge, root demotion.
//!
//! After the leaf-side removal, an underfull node is repaired under its
//! parent's write lock. The left sibling is preferred; a sibling with slack
//! donates its adjacent entry, otherwise the right node of the pair folds
//! into the left. Merges drain one separator from the parent and the
//! repair cascades up the retained ancestor path, demoting the root when an
//! internal root runs out of separators.

use std::sync::atomic::Ordering as AtomicOrdering;
use std::sync::Arc;

use parking_lot::lock_api::ArcRwLockWriteGuard;

use crate::compare::KeyComparator;
use crate::error::TreeError;
use crate::node::{min_internal_keys, min_leaf_keys, Node, WriteGuard};
use crate::tracing_helpers::{debug_log, trace_log};

use super::descend::{PathEntry, WriteIntent};
use super::BPlusTree;

/// How an underflow was repaired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Repair {
    /// An entry moved over from a sibling; the parent kept its key count.
    Redistributed,
    /// The right node of the pair folded into the left; the parent lost a
    /// separator.
    Merged,
}

impl<K, V, C> BPlusTree<K, V, C>
where
    K: Clone,
    C: KeyComparator<K>,
{
    /// Remove `key`, returning the detached value handle.
    ///
    /// The removal hook, if configured, observes the value exactly once
    /// before this returns. Handles previously given out by
    /// [`get`](Self::get) stay valid.
    ///
    /// # Errors
    ///
    /// [`TreeError::KeyNotFound`] when the key is absent; the tree is
    /// unchanged.
    pub fn remove(&self, key: &K) -> Result<Arc<V>, TreeError> {
        let (ancestors, mut leaf_guard) = self.locate_leaf_write(key, WriteIntent::Remove);

        let (value, underflow) = {
            let leaf = leaf_guard.expect_leaf_mut();
            let slot = match leaf.search(key, &self.comparator) {
                Ok(slot) => slot,
                Err(_) => return Err(TreeError::KeyNotFound),
            };
            leaf.keys.remove(slot);
            let record = leaf.records.remove(slot);
            let underflow = leaf.keys.len() < min_leaf_keys(self.order);
            (record.into_value(), underflow)
        };
        self.len.fetch_sub(1, AtomicOrdering::Relaxed);

        // The removal is structurally complete on the leaf; rebalancing
        // below moves records without revisiting them.
        if let Some(hook) = &self.removal_hook {
            hook(&value);
        }

        // An empty ancestor stack means the leaf is the root or cannot have
        // gone deficient; either way there is nothing to repair.
        if underflow && !ancestors.is_empty() {
            drop(leaf_guard);
            self.rebalance(ancestors);
        }

        Ok(value)
    }

    /// Repair underflow bottom-up along the retained ancestor path.
    fn rebalance(&self, mut ancestors: Vec<PathEntry<K, V>>) {
        while let Some(PathEntry {
            mut guard,
            child_idx,
        }) = ancestors.pop()
        {
            if self.fix_underflow(&mut guard, child_idx) == Repair::Redistributed {
                return;
            }

            // A merge drained one separator out of this node.
            if self.is_root(&guard) {
                if let Node::Internal(internal) = &*guard {
                    if internal.keys.is_empty() {
                        // Promote the root's single remaining child; the
                        // swap happens under the old root's write lock.
                        let child = Arc::clone(&internal.children[0]);
                        *self.root.write() = child;
                        debug_log!("root demoted, tree shrank one level");
                    }
                }
                return;
            }

            if guard.key_count() >= min_internal_keys(self.order) {
                return;
            }
            // Still deficient: the next loop round repairs this node
            // against its own siblings. Its guard drops here; the parent's
            // write lock in `ancestors` keeps every other writer out until
            // the repair re-locks it.
        }
    }

    /// Repair the deficient child at `child_idx` of the node behind
    /// `parent_guard`.
    ///
    /// The deficient child's lock is not held on entry. Sibling pairs lock
    /// left before right, the same direction the range scan hands off, so
    /// the two cannot close a wait cycle. Re-locking is benign: the
    /// parent's write lock has kept all writers away from both children
    /// since the descent.
    fn fix_underflow(&self, parent_guard: &mut WriteGuard<K, V>, child_idx: usize) -> Repair {
        let order = self.order;

        // Prefer the left sibling; the leftmost child pairs with its right.
        let (left_idx, deficient_is_left) = if child_idx > 0 {
            (child_idx - 1, false)
        } else {
            (child_idx, true)
        };
        let sep_idx = left_idx;

        let (left_ref, right_ref) = {
            let parent = parent_guard.expect_internal_mut();
            (
                Arc::clone(&parent.children[left_idx]),
                Arc::clone(&parent.children[left_idx + 1]),
            )
        };
        let mut left_g = left_ref.write_arc();
        let mut right_g = right_ref.write_arc();
        let parent = parent_guard.expect_internal_mut();

        match (&mut *left_g, &mut *right_g) {
            (Node::Leaf(left), Node::Leaf(right)) => {
                let donor_len = if deficient_is_left {
                    right.keys.len()
                } else {
                    left.keys.len()
                };
                if donor_len > min_leaf_keys(order) {
                    if deficient_is_left {
                        left.keys.push(right.keys.remove(0));
                        left.records.push(right.records.remove(0));
                    } else {
                        let last = left.keys.len() - 1;
                        right.keys.insert(0, left.keys.remove(last));
                        right.records.insert(0, left.records.remove(last));
                    }
                    // The boundary moved: the separator becomes the right
                    // leaf's new first key.
                    parent.keys[sep_idx] = right.keys[0].clone();
                    trace_log!("leaf redistribution");
                    Repair::Redistributed
                } else {
                    // Fold right into left and bridge the chain past it.
                    // The defunct right leaf keeps its own `next`, so a
                    // chain reader that already reached it still walks on.
                    left.keys.append(&mut right.keys);
                    left.records.append(&mut right.records);
                    left.next = right.next.clone();
                    parent.keys.remove(sep_idx);
                    parent.children.remove(left_idx + 1);
                    debug_log!("leaf merge");
                    Repair::Merged
                }
            }

            (Node::Internal(left), Node::Internal(right)) => {
                let donor_len = if deficient_is_left {
                    right.keys.len()
                } else {
                    left.keys.len()
                };
                if donor_len > min_internal_keys(order) {
                    if deficient_is_left {
                        // Rotate leftward: the separator comes down, the
                        // right sibling's first key goes up.
                        let down =
                            std::mem::replace(&mut parent.keys[sep_idx], right.keys.remove(0));
                        left.keys.push(down);
                        left.children.push(right.children.remove(0));
                    } else {
                        // Rotate rightward.
                        let last = left.keys.len() - 1;
                        let down =
                            std::mem::replace(&mut parent.keys[sep_idx], left.keys.remove(last));
                        right.keys.insert(0, down);
                        let last_child = left.children.len() - 1;
                        right.children.insert(0, left.children.remove(last_child));
                    }
                    trace_log!("internal redistribution");
                    Repair::Redistributed
                } else {
                    // Merge through the separator: it comes down between
                    // the two halves.
                    let down = parent.keys.remove(sep_idx);
                    left.keys.push(down);
                    left.keys.append(&mut right.keys);
                    left.children.append(&mut right.children);
                    parent.children.remove(left_idx + 1);
                    debug_log!("internal merge");
                    Repair::Merged
                }
            }

            _ => unreachable!("siblings share a level and therefore a kind"),
        }
    }

    /// Whether the node behind `guard` is the current root. Stable while
    /// the guard is held: root swaps require the old root's write lock.
    fn is_root(&self, guard: &WriteGuard<K, V>) -> bool {
        Arc::ptr_eq(ArcRwLockWriteGuard::rwlock(guard), &self.root.read())
    }
}
