//! The `BPlusTree` handle: configuration, point lookup, and teardown.
//!
//! All public operations enter through [`BPlusTree`]. Mutations live in the
//! `insert`/`remove` submodules, ordered enumeration in `scan`, and the
//! shared descent machinery in `descend`.

pub mod check;
mod descend;
mod insert;
mod remove;
mod scan;

use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::compare::{KeyComparator, NaturalOrder};
use crate::error::TreeError;
use crate::node::{LeafNode, Node, NodeRef};

/// Callback applied exactly once to each value as it leaves the tree,
/// whether through [`BPlusTree::remove`] or tree teardown.
///
/// The hook observes the value; the `Arc` handle itself is returned to the
/// caller on `remove` and dropped on teardown. Hooks must not call back
/// into the tree.
pub type RemovalHook<V> = Arc<dyn Fn(&V) + Send + Sync>;

/// A thread-safe, in-memory B+ tree index.
///
/// Keys are kept in ascending order under a caller-supplied
/// [`KeyComparator`]; values are held behind [`Arc`] handles so lookups can
/// return without pinning any internal lock. Leaves are chained left to
/// right, which is what makes inclusive range scans a linear walk.
///
/// Every node carries its own reader-writer lock. Readers traverse
/// hand-over-hand and never block other readers; writers latch-crab,
/// keeping an ancestor locked only while a split or merge might still reach
/// it.
///
/// # Example
///
/// ```
/// use leafline::BPlusTree;
///
/// let tree: BPlusTree<u64, String> = BPlusTree::new(16).unwrap();
/// tree.insert(42, "answer".to_string()).unwrap();
/// assert_eq!(*tree.get(&42).unwrap(), "answer");
///
/// let hits = tree.range(&0, &100, 8);
/// assert_eq!(hits.len(), 1);
/// ```
pub struct BPlusTree<K, V, C = NaturalOrder> {
    /// Current root node. Swapped only while the old root's write lock is
    /// held, so a descent that locked the node it read here can trust it.
    root: RwLock<NodeRef<K, V>>,

    /// Branching factor: max children per internal node, max keys per node
    /// is `order - 1`. Immutable after construction.
    order: usize,

    comparator: C,

    removal_hook: Option<RemovalHook<V>>,

    /// Number of stored entries, maintained under leaf write locks.
    len: AtomicUsize,
}

impl<K: Ord, V> BPlusTree<K, V> {
    /// Create an empty tree ordered by `K`'s own [`Ord`].
    ///
    /// # Errors
    ///
    /// [`TreeError::InvalidOrder`] if `order < 3`.
    pub fn new(order: usize) -> Result<Self, TreeError> {
        Self::with_comparator(order, NaturalOrder)
    }
}

impl<K, V, C: KeyComparator<K>> BPlusTree<K, V, C> {
    /// Create an empty tree with an explicit comparator.
    ///
    /// # Errors
    ///
    /// [`TreeError::InvalidOrder`] if `order < 3`.
    pub fn with_comparator(order: usize, comparator: C) -> Result<Self, TreeError> {
        if order < 3 {
            return Err(TreeError::InvalidOrder { order });
        }

        let root: NodeRef<K, V> = Arc::new(RwLock::new(Node::Leaf(LeafNode::new(order))));
        Ok(Self {
            root: RwLock::new(root),
            order,
            comparator,
            removal_hook: None,
            len: AtomicUsize::new(0),
        })
    }

    /// Assemble a tree around an existing node graph (snapshot load).
    pub(crate) fn from_parts(
        order: usize,
        comparator: C,
        root: NodeRef<K, V>,
        len: usize,
    ) -> Result<Self, TreeError> {
        if order < 3 {
            return Err(TreeError::InvalidOrder { order });
        }
        Ok(Self {
            root: RwLock::new(root),
            order,
            comparator,
            removal_hook: None,
            len: AtomicUsize::new(len),
        })
    }

    /// Install a removal hook. Must be called before the tree is shared.
    #[must_use]
    pub fn with_removal_hook(mut self, hook: impl Fn(&V) + Send + Sync + 'static) -> Self {
        self.removal_hook = Some(Arc::new(hook));
        self
    }

    /// The configured branching factor.
    #[inline]
    #[must_use]
    pub const fn order(&self) -> usize {
        self.order
    }

    /// Number of entries currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len.load(AtomicOrdering::Relaxed)
    }

    /// Whether the tree holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up `key`, returning a handle to its value.
    ///
    /// The handle stays valid after the call; a later `remove` detaches the
    /// value from the index without invalidating handles already given out.
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        let guard = self.locate_leaf_read(key);
        let leaf = guard.expect_leaf();
        match leaf.search(key, &self.comparator) {
            Ok(slot) => Some(leaf.records[slot].clone_value()),
            Err(_) => None,
        }
    }

    /// Whether `key` is present.
    pub fn contains_key(&self, key: &K) -> bool {
        let guard = self.locate_leaf_read(key);
        guard.expect_leaf().search(key, &self.comparator).is_ok()
    }

    /// Snapshot of the current root handle, for crate-internal walkers.
    pub(crate) fn root_handle(&self) -> NodeRef<K, V> {
        Arc::clone(&self.root.read())
    }
}

impl<K, V, C> Drop for BPlusTree<K, V, C> {
    /// Tear down all nodes, firing the removal hook once per live record.
    ///
    /// The leaf chain is severed iteratively so that dropping the node
    /// graph recurses only along tree height, never along the chain.
    fn drop(&mut self) {
        let mut node = Arc::clone(self.root.get_mut());
        loop {
            let child = match &*node.read() {
                Node::Internal(internal) => Arc::clone(&internal.children[0]),
                Node::Leaf(_) => break,
            };
            node = child;
        }

        let mut cur = Some(node);
        while let Some(leaf_ref) = cur {
            let mut guard = leaf_ref.write();
            let Node::Leaf(leaf) = &mut *guard else { break };
            if let Some(hook) = &self.removal_hook {
                for record in &leaf.records {
                    hook(record.value());
                }
            }
            cur = leaf.next.take();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn tree_is_send_and_sync() {
        assert_send_sync::<BPlusTree<u64, String>>();
    }

    #[test]
    fn order_below_three_is_rejected() {
        for order in [0usize, 1, 2] {
            let res: Result<BPlusTree<u32, u32>, _> = BPlusTree::new(order);
            assert_eq!(res.err(), Some(TreeError::InvalidOrder { order }));
        }
        assert!(BPlusTree::<u32, u32>::new(3).is_ok());
    }

    #[test]
    fn empty_tree_lookups() {
        let tree: BPlusTree<u32, u32> = BPlusTree::new(4).unwrap();
        assert!(tree.is_empty());
        assert_eq!(tree.len(), 0);
        assert!(tree.get(&1).is_none());
        assert!(!tree.contains_key(&1));
    }
}
