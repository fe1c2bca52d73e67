//! # Leafline
//!
//! A thread-safe, in-memory ordered index: a B+ tree with per-node
//! reader-writer locks and leaves chained in key order.
//!
//! - Point lookup, duplicate-free insertion, deletion with full
//!   redistribution/merge rebalancing, and inclusive range scans.
//! - Readers traverse hand-over-hand and never block each other; writers
//!   latch-crab so disjoint subtrees mutate in parallel. There is no
//!   tree-wide lock.
//! - Values come back as [`std::sync::Arc`] handles, so lookups return
//!   without pinning any internal lock; an optional removal hook observes
//!   each value exactly once as it leaves the tree.
//!
//! ## Example
//!
//! ```
//! use leafline::BPlusTree;
//!
//! let tree: BPlusTree<u32, String> = BPlusTree::new(8).unwrap();
//! for k in 1..=10u32 {
//!     tree.insert(k, format!("v{k}")).unwrap();
//! }
//!
//! assert_eq!(*tree.get(&3).unwrap(), "v3");
//!
//! // Inclusive on both ends, ascending, capped.
//! let hits = tree.range(&3, &7, 16);
//! assert_eq!(hits.len(), 5);
//! assert_eq!(*hits[0], "v3");
//!
//! tree.remove(&3).unwrap();
//! assert!(tree.get(&3).is_none());
//! ```
//!
//! ## Ordering
//!
//! Keys are ordered by [`NaturalOrder`] (`K: Ord`) unless a custom
//! [`KeyComparator`] is supplied via
//! [`BPlusTree::with_comparator`].

pub mod compare;
pub mod error;
mod node;
pub mod snapshot;
mod tracing_helpers;
pub mod tree;
pub mod viz;

pub use compare::{FnComparator, KeyComparator, NaturalOrder};
pub use error::{InsertError, TreeError};
pub use tree::check::{CheckError, CheckReport};
pub use tree::{BPlusTree, RemovalHook};
