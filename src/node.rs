//! Node and record layout.
//!
//! Every node lives behind its own [`parking_lot::RwLock`]; tree structure
//! is expressed through [`NodeRef`] handles. Strong edges point only
//! downward (parent to child) and rightward (leaf to next leaf), so node
//! teardown needs no cycle breaking.
//!
//! A node holds at most `order - 1` keys. Leaves pair each key with a
//! [`Record`]; internal nodes hold `n + 1` children around `n` separators,
//! where child `i` covers keys `>=` separator `i - 1` (if any) and `<`
//! separator `i` (if any).

use std::cmp::Ordering;
use std::sync::Arc;

use parking_lot::lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};
use parking_lot::{RawRwLock, RwLock};

use crate::compare::KeyComparator;

/// Shared handle to a locked node.
pub(crate) type NodeRef<K, V> = Arc<RwLock<Node<K, V>>>;

/// Owned read guard; can outlive the binding the lock was reached through,
/// which is what makes hand-over-hand traversal expressible without
/// self-referential lifetimes.
pub(crate) type ReadGuard<K, V> = ArcRwLockReadGuard<RawRwLock, Node<K, V>>;

/// Owned write guard, same rationale as [`ReadGuard`].
pub(crate) type WriteGuard<K, V> = ArcRwLockWriteGuard<RawRwLock, Node<K, V>>;

// ============================================================================
//  Occupancy bounds
// ============================================================================

/// Maximum keys any node may hold: `order - 1`.
#[inline]
pub(crate) const fn max_keys(order: usize) -> usize {
    order - 1
}

/// Minimum keys a non-root leaf must hold: ⌈(order − 1) / 2⌉.
#[inline]
pub(crate) const fn min_leaf_keys(order: usize) -> usize {
    order / 2
}

/// Minimum keys a non-root internal node must hold: ⌈order / 2⌉ − 1.
#[inline]
pub(crate) const fn min_internal_keys(order: usize) -> usize {
    (order - 1) / 2
}

// ============================================================================
//  Record
// ============================================================================

/// Per-key wrapper owned by a leaf slot.
///
/// Holds the stored value behind an [`Arc`] so lookups can hand out a
/// handle without pinning the leaf's lock.
pub(crate) struct Record<V> {
    value: Arc<V>,
}

impl<V> Record<V> {
    /// Take ownership of `value` into a fresh record.
    pub(crate) fn new(value: V) -> Self {
        Self {
            value: Arc::new(value),
        }
    }

    /// Borrow the stored value.
    #[inline]
    pub(crate) fn value(&self) -> &V {
        &self.value
    }

    /// Clone the value handle (reference-count bump).
    #[inline]
    pub(crate) fn clone_value(&self) -> Arc<V> {
        Arc::clone(&self.value)
    }

    /// Unwrap the record into its value handle.
    #[inline]
    pub(crate) fn into_value(self) -> Arc<V> {
        self.value
    }
}

// ============================================================================
//  Leaf and internal nodes
// ============================================================================

/// Terminal node: sorted keys paired with records, chained to the next leaf.
pub(crate) struct LeafNode<K, V> {
    pub(crate) keys: Vec<K>,
    pub(crate) records: Vec<Record<V>>,
    /// Next leaf in ascending key order, none for the rightmost leaf.
    pub(crate) next: Option<NodeRef<K, V>>,
}

impl<K, V> LeafNode<K, V> {
    /// Empty leaf sized for `order`.
    pub(crate) fn new(order: usize) -> Self {
        Self {
            keys: Vec::with_capacity(order),
            records: Vec::with_capacity(order),
            next: None,
        }
    }

    /// Locate `key`: `Ok(slot)` on a hit, `Err(insertion point)` on a miss.
    #[inline]
    pub(crate) fn search<C: KeyComparator<K>>(&self, key: &K, cmp: &C) -> Result<usize, usize> {
        search_keys(&self.keys, key, cmp)
    }
}

/// Non-terminal node: `n` separators around `n + 1` children.
pub(crate) struct InternalNode<K, V> {
    pub(crate) keys: Vec<K>,
    pub(crate) children: Vec<NodeRef<K, V>>,
}

impl<K, V> InternalNode<K, V> {
    /// Index of the child whose key range contains `key`.
    ///
    /// Keys equal to a separator belong to the child on its right.
    #[inline]
    pub(crate) fn child_index<C: KeyComparator<K>>(&self, key: &K, cmp: &C) -> usize {
        match search_keys(&self.keys, key, cmp) {
            Ok(at) => at + 1,
            Err(at) => at,
        }
    }

    /// The child guiding descent for `key`.
    #[inline]
    pub(crate) fn child_for<C: KeyComparator<K>>(&self, key: &K, cmp: &C) -> &NodeRef<K, V> {
        &self.children[self.child_index(key, cmp)]
    }
}

// ============================================================================
//  Node
// ============================================================================

/// A tree node, either kind behind the same lock type.
pub(crate) enum Node<K, V> {
    Leaf(LeafNode<K, V>),
    Internal(InternalNode<K, V>),
}

impl<K, V> Node<K, V> {
    #[inline]
    pub(crate) fn key_count(&self) -> usize {
        match self {
            Self::Leaf(leaf) => leaf.keys.len(),
            Self::Internal(node) => node.keys.len(),
        }
    }

    /// # Panics
    /// Panics if the node is internal; callers hold a leaf by construction.
    #[expect(clippy::panic, reason = "descent invariant: this node is a leaf")]
    pub(crate) fn expect_leaf(&self) -> &LeafNode<K, V> {
        match self {
            Self::Leaf(leaf) => leaf,
            Self::Internal(_) => panic!("expected a leaf node"),
        }
    }

    /// # Panics
    /// Panics if the node is internal.
    #[expect(clippy::panic, reason = "descent invariant: this node is a leaf")]
    pub(crate) fn expect_leaf_mut(&mut self) -> &mut LeafNode<K, V> {
        match self {
            Self::Leaf(leaf) => leaf,
            Self::Internal(_) => panic!("expected a leaf node"),
        }
    }

    /// # Panics
    /// Panics if the node is a leaf.
    #[expect(clippy::panic, reason = "rebalance invariant: parents are internal")]
    pub(crate) fn expect_internal_mut(&mut self) -> &mut InternalNode<K, V> {
        match self {
            Self::Internal(node) => node,
            Self::Leaf(_) => panic!("expected an internal node"),
        }
    }
}

/// Binary search over a sorted key slice through the comparator.
///
/// Same contract as [`slice::binary_search_by`]: `Ok` carries the matching
/// slot, `Err` the insertion point that keeps the slice sorted.
#[inline]
pub(crate) fn search_keys<K, C: KeyComparator<K>>(
    keys: &[K],
    key: &K,
    cmp: &C,
) -> Result<usize, usize> {
    let mut lo = 0usize;
    let mut hi = keys.len();
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        match cmp.compare(&keys[mid], key) {
            Ordering::Less => lo = mid + 1,
            Ordering::Greater => hi = mid,
            Ordering::Equal => return Ok(mid),
        }
    }
    Err(lo)
}
