//! Persistent collections.
//!
//! Every collection here is immutable. An update returns a new collection
//! that shares all untouched nodes with the old one, so forking a state for a
//! branch, or keeping the old state at a program point while computing a new
//! one, never copies more than a path from the root to the changed entry.
//!
//! Nodes are held behind `crate::RC`, which is `Arc` when the `thread_safe`
//! feature is enabled.

mod avl;
mod balance;
mod int_trie;
mod range_tree;

pub use self::avl::{AvlMap, AvlSet, Iter, ThreeWaySplit};
pub use self::int_trie::IntTrie;
pub use self::range_tree::RangeTree;
