//! AVL rebalancing shared by the persistent trees.

use crate::RC;

/// A node of a persistent AVL tree.
pub(super) trait AvlNode: Sized {
    /// Everything a node holds besides its subtrees.
    type Entry;

    fn height(&self) -> usize;
    fn left(&self) -> &Option<RC<Self>>;
    fn right(&self) -> &Option<RC<Self>>;
    /// A copy of this node's entry.
    fn entry(&self) -> Self::Entry;
    /// Build a node over two subtrees, recomputing whatever it caches about
    /// them.
    fn make(entry: Self::Entry, left: Option<RC<Self>>, right: Option<RC<Self>>) -> RC<Self>;
}

pub(super) fn height<N: AvlNode>(tree: &Option<RC<N>>) -> usize {
    tree.as_ref().map_or(0, |node| node.height())
}

/// Build a node from two subtrees whose heights differ by at most two,
/// rotating to restore the AVL balance.
pub(super) fn balance<N: AvlNode>(
    entry: N::Entry,
    left: Option<RC<N>>,
    right: Option<RC<N>>,
) -> RC<N> {
    let (hl, hr) = (height(&left), height(&right));
    if hl > hr + 1 {
        if let Some(l) = &left {
            if height(l.left()) >= height(l.right()) {
                let new_right = N::make(entry, l.right().clone(), right);
                return N::make(l.entry(), l.left().clone(), Some(new_right));
            } else if let Some(lr) = l.right() {
                let new_left = N::make(l.entry(), l.left().clone(), lr.left().clone());
                let new_right = N::make(entry, lr.right().clone(), right);
                return N::make(lr.entry(), Some(new_left), Some(new_right));
            }
        }
    } else if hr > hl + 1 {
        if let Some(r) = &right {
            if height(r.right()) >= height(r.left()) {
                let new_left = N::make(entry, left, r.left().clone());
                return N::make(r.entry(), Some(new_left), r.right().clone());
            } else if let Some(rl) = r.left() {
                let new_left = N::make(entry, left, rl.left().clone());
                let new_right = N::make(r.entry(), rl.right().clone(), r.right().clone());
                return N::make(rl.entry(), Some(new_left), Some(new_right));
            }
        }
    }
    N::make(entry, left, right)
}

/// Detach the smallest entry below `node`, returning it with the rebalanced
/// rest of the subtree.
pub(super) fn remove_min<N: AvlNode>(node: &RC<N>) -> (N::Entry, Option<RC<N>>) {
    match node.left() {
        None => (node.entry(), node.right().clone()),
        Some(left) => {
            let (entry, rest) = remove_min(left);
            (entry, Some(balance(node.entry(), rest, node.right().clone())))
        }
    }
}
