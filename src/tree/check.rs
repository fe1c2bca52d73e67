//! Quiescent full-tree invariant verification.
//!
//! [`BPlusTree::verify`] walks every node and the leaf chain, checking the
//! structural invariants the mutators are supposed to preserve: per-node
//! key ordering, arity, separator ranges, occupancy minima, uniform leaf
//! depth, and chain linkage. The test suites call it after every mutation
//! batch; it is also usable as a debugging aid on any tree that is not
//! being written concurrently.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::compare::KeyComparator;
use crate::node::{max_keys, min_internal_keys, min_leaf_keys, Node, NodeRef};

use super::BPlusTree;

// ============================================================================
//  Report and errors
// ============================================================================

/// Summary of a successfully verified tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckReport {
    /// Total nodes visited.
    pub nodes: usize,
    /// Number of leaves.
    pub leaves: usize,
    /// Entries counted across the leaves.
    pub entries: usize,
    /// Levels from root to leaves; 1 means the root is a leaf.
    pub height: usize,
}

/// A structural invariant violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckError {
    /// A node's keys are not strictly ascending.
    KeysOutOfOrder,
    /// Key/child (or key/record) counts disagree.
    ArityMismatch { keys: usize, pointers: usize },
    /// A node holds more than `order - 1` keys.
    Overfull { keys: usize, max: usize },
    /// A non-root node (or empty internal root) is below minimum occupancy.
    Underfull { keys: usize, min: usize },
    /// A key escaped the range its parent separators define.
    SeparatorViolated,
    /// Leaves sit at different depths.
    UnevenDepth,
    /// The leaf chain does not visit the leaves in tree order.
    BrokenChain,
    /// Leaf-counted entries disagree with the tree's length counter.
    CountMismatch { counted: usize, reported: usize },
}

impl fmt::Display for CheckError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeysOutOfOrder => write!(f, "node keys are not strictly ascending"),
            Self::ArityMismatch { keys, pointers } => {
                write!(f, "node has {keys} keys but {pointers} pointers")
            }
            Self::Overfull { keys, max } => write!(f, "node holds {keys} keys, max is {max}"),
            Self::Underfull { keys, min } => write!(f, "node holds {keys} keys, min is {min}"),
            Self::SeparatorViolated => write!(f, "key outside its parent separator range"),
            Self::UnevenDepth => write!(f, "leaves at different depths"),
            Self::BrokenChain => write!(f, "leaf chain out of step with tree order"),
            Self::CountMismatch { counted, reported } => {
                write!(f, "leaves hold {counted} entries, tree reports {reported}")
            }
        }
    }
}

impl std::error::Error for CheckError {}

// ============================================================================
//  Verification walk
// ============================================================================

impl<K, V, C: KeyComparator<K>> BPlusTree<K, V, C> {
    /// Verify all structural invariants, returning a tree summary.
    ///
    /// Intended for quiescent trees: the walk read-locks whole subpaths at
    /// once, so concurrent writers will block against it (and it against
    /// them), but results are only meaningful when nothing is mutating.
    ///
    /// # Errors
    ///
    /// The first [`CheckError`] encountered.
    pub fn verify(&self) -> Result<CheckReport, CheckError> {
        let root = self.root_handle();
        let mut report = CheckReport {
            nodes: 0,
            leaves: 0,
            entries: 0,
            height: 0,
        };
        let mut leaves: Vec<NodeRef<K, V>> = Vec::new();
        let mut leaf_depth: Option<usize> = None;

        self.check_node(
            &root,
            0,
            true,
            None,
            None,
            &mut leaves,
            &mut report,
            &mut leaf_depth,
        )?;
        report.height = leaf_depth.unwrap_or(0) + 1;

        self.check_chain(&leaves)?;

        let reported = self.len();
        if report.entries != reported {
            return Err(CheckError::CountMismatch {
                counted: report.entries,
                reported,
            });
        }
        Ok(report)
    }

    /// Check one node and recurse into its children. `lo`/`hi` are the
    /// parent separators bounding this subtree: every key must be `>= lo`
    /// and `< hi`.
    #[expect(clippy::too_many_arguments, reason = "internal recursive walker")]
    fn check_node(
        &self,
        node: &NodeRef<K, V>,
        depth: usize,
        is_root: bool,
        lo: Option<&K>,
        hi: Option<&K>,
        leaves: &mut Vec<NodeRef<K, V>>,
        report: &mut CheckReport,
        leaf_depth: &mut Option<usize>,
    ) -> Result<(), CheckError> {
        let guard = node.read();
        report.nodes += 1;

        let keys: &[K] = match &*guard {
            Node::Leaf(leaf) => &leaf.keys,
            Node::Internal(internal) => &internal.keys,
        };

        for pair in keys.windows(2) {
            if self.comparator.compare(&pair[0], &pair[1]) != Ordering::Less {
                return Err(CheckError::KeysOutOfOrder);
            }
        }
        if keys.len() > max_keys(self.order) {
            return Err(CheckError::Overfull {
                keys: keys.len(),
                max: max_keys(self.order),
            });
        }
        if let (Some(lo), Some(first)) = (lo, keys.first()) {
            if self.comparator.compare(first, lo) == Ordering::Less {
                return Err(CheckError::SeparatorViolated);
            }
        }
        if let (Some(hi), Some(last)) = (hi, keys.last()) {
            if self.comparator.compare(last, hi) != Ordering::Less {
                return Err(CheckError::SeparatorViolated);
            }
        }

        match &*guard {
            Node::Leaf(leaf) => {
                if leaf.records.len() != leaf.keys.len() {
                    return Err(CheckError::ArityMismatch {
                        keys: leaf.keys.len(),
                        pointers: leaf.records.len(),
                    });
                }
                if !is_root && leaf.keys.len() < min_leaf_keys(self.order) {
                    return Err(CheckError::Underfull {
                        keys: leaf.keys.len(),
                        min: min_leaf_keys(self.order),
                    });
                }
                match *leaf_depth {
                    None => *leaf_depth = Some(depth),
                    Some(expected) if expected != depth => return Err(CheckError::UnevenDepth),
                    Some(_) => {}
                }
                report.leaves += 1;
                report.entries += leaf.keys.len();
                leaves.push(Arc::clone(node));
            }

            Node::Internal(internal) => {
                if internal.children.len() != internal.keys.len() + 1 {
                    return Err(CheckError::ArityMismatch {
                        keys: internal.keys.len(),
                        pointers: internal.children.len(),
                    });
                }
                let min = if is_root { 1 } else { min_internal_keys(self.order) };
                if internal.keys.len() < min {
                    return Err(CheckError::Underfull {
                        keys: internal.keys.len(),
                        min,
                    });
                }
                for (i, child) in internal.children.iter().enumerate() {
                    let child_lo = if i == 0 { lo } else { Some(&internal.keys[i - 1]) };
                    let child_hi = if i == internal.keys.len() {
                        hi
                    } else {
                        Some(&internal.keys[i])
                    };
                    self.check_node(
                        child,
                        depth + 1,
                        false,
                        child_lo,
                        child_hi,
                        leaves,
                        report,
                        leaf_depth,
                    )?;
                }
            }
        }
        Ok(())
    }

    /// The `next` chain must visit exactly the leaves the tree walk found,
    /// in the same order, ending with no successor.
    fn check_chain(&self, leaves: &[NodeRef<K, V>]) -> Result<(), CheckError> {
        for pair in leaves.windows(2) {
            let guard = pair[0].read();
            let leaf = guard.expect_leaf();
            match &leaf.next {
                Some(next) if Arc::ptr_eq(next, &pair[1]) => {}
                _ => return Err(CheckError::BrokenChain),
            }
        }
        if let Some(last) = leaves.last() {
            if last.read().expect_leaf().next.is_some() {
                return Err(CheckError::BrokenChain);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{InternalNode, LeafNode, Record};
    use parking_lot::RwLock;

    fn leaf(order: usize, keys: &[u32]) -> NodeRef<u32, u32> {
        let mut node = LeafNode::new(order);
        for &k in keys {
            node.keys.push(k);
            node.records.push(Record::new(k));
        }
        Arc::new(RwLock::new(Node::Leaf(node)))
    }

    #[test]
    fn empty_tree_verifies() {
        let tree: BPlusTree<u32, u32> = BPlusTree::new(4).unwrap();
        let report = tree.verify().unwrap();
        assert_eq!(report.nodes, 1);
        assert_eq!(report.leaves, 1);
        assert_eq!(report.entries, 0);
        assert_eq!(report.height, 1);
    }

    #[test]
    fn broken_chain_is_detected() {
        // Hand-build a two-leaf tree whose chain link is missing.
        let tree: BPlusTree<u32, u32> = BPlusTree::new(4).unwrap();
        let left = leaf(4, &[1, 2]);
        let right = leaf(4, &[10, 11]);
        let root = Arc::new(RwLock::new(Node::Internal(InternalNode {
            keys: vec![10],
            children: vec![Arc::clone(&left), Arc::clone(&right)],
        })));
        *tree.root.write() = root;
        tree.len.store(4, std::sync::atomic::Ordering::Relaxed);

        assert_eq!(tree.verify(), Err(CheckError::BrokenChain));

        // Repair the chain and the same tree verifies.
        left.write().expect_leaf_mut().next = Some(Arc::clone(&right));
        let report = tree.verify().unwrap();
        assert_eq!(report.leaves, 2);
        assert_eq!(report.height, 2);
    }

    #[test]
    fn separator_violation_is_detected() {
        let tree: BPlusTree<u32, u32> = BPlusTree::new(4).unwrap();
        let left = leaf(4, &[1, 99]); // 99 >= separator 10
        let right = leaf(4, &[10, 11]);
        left.write().expect_leaf_mut().next = Some(Arc::clone(&right));
        let root = Arc::new(RwLock::new(Node::Internal(InternalNode {
            keys: vec![10],
            children: vec![left, right],
        })));
        *tree.root.write() = root;
        tree.len.store(4, std::sync::atomic::Ordering::Relaxed);

        assert_eq!(tree.verify(), Err(CheckError::SeparatorViolated));
    }
}
