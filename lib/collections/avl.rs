use super::balance::{balance, remove_min, AvlNode};
use crate::RC;
use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::iter::FromIterator;

struct Node<K, V> {
    key: K,
    value: V,
    height: usize,
    size: usize,
    left: Tree<K, V>,
    right: Tree<K, V>,
}

type Tree<K, V> = Option<RC<Node<K, V>>>;

fn height<K, V>(tree: &Tree<K, V>) -> usize {
    tree.as_ref().map_or(0, |node| node.height)
}

fn size<K, V>(tree: &Tree<K, V>) -> usize {
    tree.as_ref().map_or(0, |node| node.size)
}

fn make<K, V>(key: K, value: V, left: Tree<K, V>, right: Tree<K, V>) -> RC<Node<K, V>> {
    RC::new(Node {
        height: 1 + height(&left).max(height(&right)),
        size: 1 + size(&left) + size(&right),
        key,
        value,
        left,
        right,
    })
}

impl<K: Clone, V: Clone> AvlNode for Node<K, V> {
    type Entry = (K, V);

    fn height(&self) -> usize {
        self.height
    }

    fn left(&self) -> &Tree<K, V> {
        &self.left
    }

    fn right(&self) -> &Tree<K, V> {
        &self.right
    }

    fn entry(&self) -> (K, V) {
        (self.key.clone(), self.value.clone())
    }

    fn make((key, value): (K, V), left: Tree<K, V>, right: Tree<K, V>) -> RC<Node<K, V>> {
        make(key, value, left, right)
    }
}

fn insert<K: Ord + Clone, V: Clone>(tree: &Tree<K, V>, key: K, value: V) -> RC<Node<K, V>> {
    match tree {
        None => make(key, value, None, None),
        Some(node) => match key.cmp(&node.key) {
            Ordering::Less => balance(
                node.entry(),
                Some(insert(&node.left, key, value)),
                node.right.clone(),
            ),
            Ordering::Greater => balance(
                node.entry(),
                node.left.clone(),
                Some(insert(&node.right, key, value)),
            ),
            Ordering::Equal => make(key, value, node.left.clone(), node.right.clone()),
        },
    }
}

/// Returns `None` when `key` is not in the tree, so the caller can keep the
/// original tree.
fn remove<K: Ord + Clone, V: Clone>(tree: &Tree<K, V>, key: &K) -> Option<Tree<K, V>> {
    let node = tree.as_ref()?;
    match key.cmp(&node.key) {
        Ordering::Less => {
            let left = remove(&node.left, key)?;
            Some(Some(balance(node.entry(), left, node.right.clone())))
        }
        Ordering::Greater => {
            let right = remove(&node.right, key)?;
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

fn map_node<K: Clone, V, W, F: Fn(&K, &V) -> W>(node: &RC<Node<K, V>>, f: &F) -> RC<Node<K, W>> {
    RC::new(Node {
        key: node.key.clone(),
        value: f(&node.key, &node.value),
        height: node.height,
        size: node.size,
        left: node.left.as_ref().map(|left| map_node(left, f)),
        right: node.right.as_ref().map(|right| map_node(right, f)),
    })
}

/// A persistent map implemented as an AVL tree.
pub struct AvlMap<K, V> {
    root: Tree<K, V>,
}

/// The result of comparing two maps entry by entry.
#[derive(Clone, Debug)]
pub struct ThreeWaySplit<K, V> {
    /// Entries whose key only appears in the first map.
    pub only_in_first: AvlMap<K, V>,
    /// Entries whose key only appears in the second map.
    pub only_in_second: AvlMap<K, V>,
    /// Keys in both maps with unequal values, holding the (first, second) values.
    pub in_both_but_differing: AvlMap<K, (V, V)>,
}

impl<K, V> AvlMap<K, V> {
    pub fn new() -> AvlMap<K, V> {
        AvlMap { root: None }
    }

    pub fn len(&self) -> usize {
        size(&self.root)
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// True if both maps share the same root node.
    pub fn ptr_eq(&self, other: &AvlMap<K, V>) -> bool {
        match (&self.root, &other.root) {
            (None, None) => true,
            (Some(a), Some(b)) => RC::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Iterate over the entries in ascending key order.
    pub fn iter(&self) -> Iter<K, V> {
        Iter::new(&self.root)
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.iter().map(|(key, _)| key)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.iter().map(|(_, value)| value)
    }

    /// The entry with the smallest key.
    pub fn min(&self) -> Option<(&K, &V)> {
        let mut node = self.root.as_ref()?;
        while let Some(left) = &node.left {
            node = left;
        }
        Some((&node.key, &node.value))
    }

    /// The entry with the largest key.
    pub fn max(&self) -> Option<(&K, &V)> {
        let mut node = self.root.as_ref()?;
        while let Some(right) = &node.right {
            node = right;
        }
        Some((&node.key, &node.value))
    }
}

impl<K: Ord + Clone, V: Clone> AvlMap<K, V> {
    pub fn get(&self, key: &K) -> Option<&V> {
        let mut tree = &self.root;
        while let Some(node) = tree {
            tree = match key.cmp(&node.key) {
                Ordering::Less => &node.left,
                Ordering::Greater => &node.right,
                Ordering::Equal => return Some(&node.value),
            };
        }
        None
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Returns a new map with `key` bound to `value`.
    pub fn insert(&self, key: K, value: V) -> AvlMap<K, V> {
        AvlMap {
            root: Some(insert(&self.root, key, value)),
        }
    }

    /// Returns a new map without `key`. If `key` is absent the result shares
    /// its root with `self`.
    pub fn remove(&self, key: &K) -> AvlMap<K, V> {
        match remove(&self.root, key) {
            Some(root) => AvlMap { root },
            None => self.clone(),
        }
    }

    /// Apply `f` to every value. The result has the same shape as `self`.
    pub fn map_values<W, F: Fn(&K, &V) -> W>(&self, f: F) -> AvlMap<K, W> {
        AvlMap {
            root: self.root.as_ref().map(|root| map_node(root, &f)),
        }
    }

    /// Insert every entry of `other`, combining values of keys present in
    /// both maps with `f(key, self_value, other_value)`.
    pub fn union_with<F: Fn(&K, &V, &V) -> V>(&self, other: &AvlMap<K, V>, f: F) -> AvlMap<K, V> {
        if self.ptr_eq(other) {
            return self.clone();
        }
        other.iter().fold(self.clone(), |map, (key, value)| {
            let combined = match map.get(key) {
                Some(mine) => f(key, mine, value),
                None => value.clone(),
            };
            map.insert(key.clone(), combined)
        })
    }

    /// Keep only the entries for which `f` returns true.
    pub fn filter<F: Fn(&K, &V) -> bool>(&self, f: F) -> AvlMap<K, V> {
        self.iter()
            .filter(|(key, value)| !f(key, value))
            .fold(self.clone(), |map, (key, _)| map.remove(key))
    }
}

impl<K: Ord + Clone, V: Clone + PartialEq> AvlMap<K, V> {
    /// Split two maps into the entries unique to each, and the keys whose
    /// values differ. Maps that share their root split into nothing.
    pub fn split(&self, other: &AvlMap<K, V>) -> ThreeWaySplit<K, V> {
        let mut split = ThreeWaySplit {
            only_in_first: AvlMap::new(),
            only_in_second: AvlMap::new(),
            in_both_but_differing: AvlMap::new(),
        };
        if self.ptr_eq(other) {
            return split;
        }

        let mut first = self.iter().peekable();
        let mut second = other.iter().peekable();
        loop {
            let ordering = match (first.peek(), second.peek()) {
                (None, None) => break,
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (Some((a, _)), Some((b, _))) => a.cmp(b),
            };
            match ordering {
                Ordering::Less => {
                    if let Some((key, value)) = first.next() {
                        split.only_in_first = split.only_in_first.insert(key.clone(), value.clone());
                    }
                }
                Ordering::Greater => {
                    if let Some((key, value)) = second.next() {
                        split.only_in_second =
                            split.only_in_second.insert(key.clone(), value.clone());
                    }
                }
                Ordering::Equal => {
                    if let (Some((key, a)), Some((_, b))) = (first.next(), second.next()) {
                        if a != b {
                            split.in_both_but_differing = split
                                .in_both_but_differing
                                .insert(key.clone(), (a.clone(), b.clone()));
                        }
                    }
                }
            }
        }
        split
    }
}

impl<K, V> Clone for AvlMap<K, V> {
    fn clone(&self) -> AvlMap<K, V> {
        AvlMap {
            root: self.root.clone(),
        }
    }
}

impl<K, V> Default for AvlMap<K, V> {
    fn default() -> AvlMap<K, V> {
        AvlMap::new()
    }
}

impl<K: PartialEq, V: PartialEq> PartialEq for AvlMap<K, V> {
    fn eq(&self, other: &AvlMap<K, V>) -> bool {
        self.ptr_eq(other) || (self.len() == other.len() && self.iter().eq(other.iter()))
    }
}

impl<K: Eq, V: Eq> Eq for AvlMap<K, V> {}

impl<K: Ord + Clone, V: Clone> FromIterator<(K, V)> for AvlMap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> AvlMap<K, V> {
        iter.into_iter()
            .fold(AvlMap::new(), |map, (key, value)| map.insert(key, value))
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for AvlMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K: Serialize, V: Serialize> Serialize for AvlMap<K, V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.iter())
    }
}

/// In-order iterator over an `AvlMap`.
pub struct Iter<'a, K, V> {
    stack: Vec<&'a Node<K, V>>,
}

impl<'a, K, V> Iter<'a, K, V> {
    fn new(tree: &'a Tree<K, V>) -> Iter<'a, K, V> {
        let mut iter = Iter { stack: Vec::new() };
        iter.push_left(tree);
        iter
    }

    fn push_left(&mut self, mut tree: &'a Tree<K, V>) {
        while let Some(node) = tree {
            self.stack.push(node.as_ref());
            tree = &node.left;
        }
    }
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<(&'a K, &'a V)> {
        let node = self.stack.pop()?;
        self.push_left(&node.right);
        Some((&node.key, &node.value))
    }
}

impl<'a, K, V> IntoIterator for &'a AvlMap<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Iter<'a, K, V> {
        self.iter()
    }
}

/// A persistent set implemented as an AVL tree.
pub struct AvlSet<K> {
    map: AvlMap<K, ()>,
}

impl<K> AvlSet<K> {
    pub fn new() -> AvlSet<K> {
        AvlSet { map: AvlMap::new() }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &K> {
        self.map.keys()
    }
}

impl<K: Ord + Clone> AvlSet<K> {
    pub fn contains(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    pub fn insert(&self, key: K) -> AvlSet<K> {
        if self.contains(&key) {
            return self.clone();
        }
        AvlSet {
            map: self.map.insert(key, ()),
        }
    }

    pub fn remove(&self, key: &K) -> AvlSet<K> {
        AvlSet {
            map: self.map.remove(key),
        }
    }

    pub fn union(&self, other: &AvlSet<K>) -> AvlSet<K> {
        let (large, small) = if self.len() >= other.len() {
            (self, other)
        } else {
            (other, self)
        };
        small.iter().fold(large.clone(), |set, key| set.insert(key.clone()))
    }

    pub fn intersection(&self, other: &AvlSet<K>) -> AvlSet<K> {
        self.iter()
            .filter(|key| other.contains(key))
            .cloned()
            .collect()
    }

    pub fn difference(&self, other: &AvlSet<K>) -> AvlSet<K> {
        other.iter().fold(self.clone(), |set, key| set.remove(key))
    }

    pub fn is_subset(&self, other: &AvlSet<K>) -> bool {
        self.len() <= other.len() && self.iter().all(|key| other.contains(key))
    }
}

impl<K> Clone for AvlSet<K> {
    fn clone(&self) -> AvlSet<K> {
        AvlSet {
            map: self.map.clone(),
        }
    }
}

impl<K> Default for AvlSet<K> {
    fn default() -> AvlSet<K> {
        AvlSet::new()
    }
}

impl<K: PartialEq> PartialEq for AvlSet<K> {
    fn eq(&self, other: &AvlSet<K>) -> bool {
        self.map == other.map
    }
}

impl<K: Eq> Eq for AvlSet<K> {}

impl<K: Ord + Clone> FromIterator<K> for AvlSet<K> {
    fn from_iter<I: IntoIterator<Item = K>>(iter: I) -> AvlSet<K> {
        iter.into_iter().fold(AvlSet::new(), |set, key| set.insert(key))
    }
}

impl<K: fmt::Debug> fmt::Debug for AvlSet<K> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<K: Serialize> Serialize for AvlSet<K> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}
