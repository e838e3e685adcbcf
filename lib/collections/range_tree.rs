use super::balance::{balance, remove_min, AvlNode};
use crate::numeric::FiniteRange;
use crate::RC;
use num_bigint::BigInt;
use std::cmp::Ordering;
use std::fmt;
use std::iter::FromIterator;

/// An AVL node augmented with the largest `high` bound in its subtree.
struct Node<V> {
    range: FiniteRange,
    value: V,
    height: usize,
    size: usize,
    max_high: BigInt,
    left: Tree<V>,
    right: Tree<V>,
}

type Tree<V> = Option<RC<Node<V>>>;

fn height<V>(tree: &Tree<V>) -> usize {
    tree.as_ref().map_or(0, |node| node.height)
}

fn size<V>(tree: &Tree<V>) -> usize {
    tree.as_ref().map_or(0, |node| node.size)
}

fn make<V>(range: FiniteRange, value: V, left: Tree<V>, right: Tree<V>) -> RC<Node<V>> {
    let mut max_high = range.high().clone();
    for child in left.iter().chain(right.iter()) {
        if child.max_high > max_high {
            max_high = child.max_high.clone();
        }
    }
    RC::new(Node {
        height: 1 + height(&left).max(height(&right)),
        size: 1 + size(&left) + size(&right),
        max_high,
        range,
        value,
        left,
        right,
    })
}

impl<V: Clone> AvlNode for Node<V> {
    type Entry = (FiniteRange, V);

    fn height(&self) -> usize {
        self.height
    }

    fn left(&self) -> &Tree<V> {
        &self.left
    }

    fn right(&self) -> &Tree<V> {
        &self.right
    }

    fn entry(&self) -> (FiniteRange, V) {
        (self.range.clone(), self.value.clone())
    }

    fn make((range, value): (FiniteRange, V), left: Tree<V>, right: Tree<V>) -> RC<Node<V>> {
        make(range, value, left, right)
    }
}

fn insert<V: Clone>(tree: &Tree<V>, range: FiniteRange, value: V) -> RC<Node<V>> {
    match tree {
        None => make(range, value, None, None),
        Some(node) => match range.cmp(&node.range) {
            Ordering::Less => balance(
                node.entry(),
                Some(insert(&node.left, range, value)),
                node.right.clone(),
            ),
            Ordering::Greater => balance(
                node.entry(),
                node.left.clone(),
                Some(insert(&node.right, range, value)),
            ),
            Ordering::Equal => make(range, value, node.left.clone(), node.right.clone()),
        },
    }
}

fn remove<V: Clone>(tree: &Tree<V>, range: &FiniteRange) -> Option<Tree<V>> {
    let node = tree.as_ref()?;
    match range.cmp(&node.range) {
        Ordering::Less => {
            let left = remove(&node.left, range)?;
            Some(Some(balance(node.entry(), left, node.right.clone())))
        }
        Ordering::Greater => {
            let right = remove(&node.right, range)?;
            Some(Some(balance(node.entry(), node.left.clone(), right)))
        }
        Ordering::Equal => Some(match (&node.left, &node.right) {
            (None, right) => right.clone(),
            (left, None) => left.clone(),
            (left, Some(right)) => {
                let (entry, rest) = remove_min(right);
                Some(balance(entry, left.clone(), rest))
            }
        }),
    }
}

fn search<'a, V>(tree: &'a Tree<V>, query: &FiniteRange, found: &mut Vec<&'a Node<V>>) {
    let node = match tree {
        Some(node) => node.as_ref(),
        None => return,
    };
    // nothing below reaches the query
    if &node.max_high < query.low() {
        return;
    }
    search(&node.left, query, found);
    if node.range.overlaps(query) {
        found.push(node);
    }
    // everything to the right starts after the query ends
    if node.range.low() <= query.high() {
        search(&node.right, query, found);
    }
}

/// Stops at the first entry that overlaps `query`.
fn any_overlap<V>(tree: &Tree<V>, query: &FiniteRange) -> bool {
    let node = match tree {
        Some(node) => node,
        None => return false,
    };
    if &node.max_high < query.low() {
        return false;
    }
    node.range.overlaps(query)
        || any_overlap(&node.left, query)
        || (node.range.low() <= query.high() && any_overlap(&node.right, query))
}

/// A persistent map from closed ranges to values, supporting overlap queries.
///
/// Entries are ordered by range. Ranges may overlap each other. Each node
/// also stores the largest upper bound in its subtree, so an overlap search
/// only visits subtrees that can hold a match.
pub struct RangeTree<V> {
    root: Tree<V>,
}

impl<V> RangeTree<V> {
    pub fn new() -> RangeTree<V> {
        RangeTree { root: None }
    }

    pub fn len(&self) -> usize {
        size(&self.root)
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Iterate over all entries, ordered by range.
    pub fn iter(&self) -> impl Iterator<Item = (&FiniteRange, &V)> {
        let mut nodes = Vec::with_capacity(self.len());
        fn walk<'a, V>(tree: &'a Tree<V>, nodes: &mut Vec<&'a Node<V>>) {
            if let Some(node) = tree {
                walk(&node.left, nodes);
                nodes.push(node.as_ref());
                walk(&node.right, nodes);
            }
        }
        walk(&self.root, &mut nodes);
        nodes.into_iter().map(|node| (&node.range, &node.value))
    }

    /// Returns true if any entry overlaps `range`.
    pub fn has_overlaps(&self, range: &FiniteRange) -> bool {
        any_overlap(&self.root, range)
    }
}

impl<V: Clone> RangeTree<V> {
    pub fn get(&self, range: &FiniteRange) -> Option<&V> {
        let mut tree = &self.root;
        while let Some(node) = tree {
            tree = match range.cmp(&node.range) {
                Ordering::Less => &node.left,
                Ordering::Greater => &node.right,
                Ordering::Equal => return Some(&node.value),
            };
        }
        None
    }

    pub fn insert(&self, range: FiniteRange, value: V) -> RangeTree<V> {
        RangeTree {
            root: Some(insert(&self.root, range, value)),
        }
    }

    pub fn remove(&self, range: &FiniteRange) -> RangeTree<V> {
        match remove(&self.root, range) {
            Some(root) => RangeTree { root },
            None => self.clone(),
        }
    }

    /// All entries whose range intersects `range`, ordered by range.
    pub fn search_overlaps(&self, range: &FiniteRange) -> Vec<(FiniteRange, V)> {
        let mut found = Vec::new();
        search(&self.root, range, &mut found);
        found
            .into_iter()
            .map(|node| (node.range.clone(), node.value.clone()))
            .collect()
    }
}

impl<V> Clone for RangeTree<V> {
    fn clone(&self) -> RangeTree<V> {
        RangeTree {
            root: self.root.clone(),
        }
    }
}

impl<V> Default for RangeTree<V> {
    fn default() -> RangeTree<V> {
        RangeTree::new()
    }
}

impl<V: PartialEq> PartialEq for RangeTree<V> {
    fn eq(&self, other: &RangeTree<V>) -> bool {
        self.len() == other.len() && self.iter().eq(other.iter())
    }
}

impl<V: Eq> Eq for RangeTree<V> {}

impl<V: Clone> FromIterator<(FiniteRange, V)> for RangeTree<V> {
    fn from_iter<I: IntoIterator<Item = (FiniteRange, V)>>(iter: I) -> RangeTree<V> {
        iter.into_iter()
            .fold(RangeTree::new(), |tree, (range, value)| tree.insert(range, value))
    }
}

impl<V: fmt::Debug> fmt::Debug for RangeTree<V> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}
