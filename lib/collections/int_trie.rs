use crate::RC;
use serde::{Serialize, Serializer};
use std::fmt;
use std::iter::FromIterator;

/// Big-endian Patricia trie node. A branch splits on `bit`. Every key below
/// the branch agrees with `prefix` on the bits above `bit`. Keys with `bit`
/// clear go left, so in-order traversal yields ascending keys.
enum Node<V> {
    Leaf {
        key: u64,
        value: V,
    },
    Branch {
        prefix: u64,
        bit: u64,
        size: usize,
        left: RC<Node<V>>,
        right: RC<Node<V>>,
    },
}

fn highest_bit(x: u64) -> u64 {
    1u64 << (63 - x.leading_zeros())
}

/// The bits of `key` above `bit`.
fn mask(key: u64, bit: u64) -> u64 {
    key & !(bit | (bit - 1))
}

fn is_zero(key: u64, bit: u64) -> bool {
    key & bit == 0
}

fn node_size<V>(node: &Node<V>) -> usize {
    match node {
        Node::Leaf { .. } => 1,
        Node::Branch { size, .. } => *size,
    }
}

fn branch<V>(prefix: u64, bit: u64, left: RC<Node<V>>, right: RC<Node<V>>) -> RC<Node<V>> {
    RC::new(Node::Branch {
        prefix,
        bit,
        size: node_size(&left) + node_size(&right),
        left,
        right,
    })
}

/// Combine two subtrees with distinct prefixes under a new branch.
fn join<V>(p1: u64, t1: RC<Node<V>>, p2: u64, t2: RC<Node<V>>) -> RC<Node<V>> {
    let bit = highest_bit(p1 ^ p2);
    if is_zero(p1, bit) {
        branch(mask(p1, bit), bit, t1, t2)
    } else {
        branch(mask(p1, bit), bit, t2, t1)
    }
}

fn insert<V: Clone>(node: &RC<Node<V>>, key: u64, value: V) -> RC<Node<V>> {
    match node.as_ref() {
        Node::Leaf { key: k, .. } => {
            if *k == key {
                RC::new(Node::Leaf { key, value })
            } else {
                join(key, RC::new(Node::Leaf { key, value }), *k, node.clone())
            }
        }
        Node::Branch {
            prefix,
            bit,
            left,
            right,
            ..
        } => {
            if mask(key, *bit) != *prefix {
                join(key, RC::new(Node::Leaf { key, value }), *prefix, node.clone())
            } else if is_zero(key, *bit) {
                branch(*prefix, *bit, insert(left, key, value), right.clone())
            } else {
                branch(*prefix, *bit, left.clone(), insert(right, key, value))
            }
        }
    }
}

/// `None` when the key is absent, `Some(None)` when the trie becomes empty.
fn remove<V>(node: &RC<Node<V>>, key: u64) -> Option<Option<RC<Node<V>>>> {
    match node.as_ref() {
        Node::Leaf { key: k, .. } => {
            if *k == key {
                Some(None)
            } else {
                None
            }
        }
        Node::Branch {
            prefix,
            bit,
            left,
            right,
            ..
        } => {
            if mask(key, *bit) != *prefix {
                return None;
            }
            if is_zero(key, *bit) {
                Some(Some(match remove(left, key)? {
                    Some(left) => branch(*prefix, *bit, left, right.clone()),
                    None => right.clone(),
                }))
            } else {
                Some(Some(match remove(right, key)? {
                    Some(right) => branch(*prefix, *bit, left.clone(), right),
                    None => left.clone(),
                }))
            }
        }
    }
}

/// A persistent map from `u64` keys, implemented as a big-endian Patricia
/// trie.
///
/// The shape of the trie depends only on the set of keys, not on the order
/// in which they were inserted.
pub struct IntTrie<V> {
    root: Option<RC<Node<V>>>,
}

impl<V> IntTrie<V> {
    pub fn new() -> IntTrie<V> {
        IntTrie { root: None }
    }

    pub fn len(&self) -> usize {
        self.root.as_ref().map_or(0, |root| node_size(root))
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    pub fn get(&self, key: u64) -> Option<&V> {
        let mut node = self.root.as_ref()?;
        loop {
            match node.as_ref() {
                Node::Leaf { key: k, value } => {
                    return if *k == key { Some(value) } else { None };
                }
                Node::Branch {
                    prefix,
                    bit,
                    left,
                    right,
                    ..
                } => {
                    if mask(key, *bit) != *prefix {
                        return None;
                    }
                    node = if is_zero(key, *bit) { left } else { right };
                }
            }
        }
    }

    pub fn contains_key(&self, key: u64) -> bool {
        self.get(key).is_some()
    }

    /// Iterate over the entries in ascending key order.
    pub fn iter(&self) -> IntTrieIter<V> {
        IntTrieIter {
            stack: self.root.iter().map(|root| root.as_ref()).collect(),
        }
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.iter().map(|(_, value)| value)
    }
}

impl<V: Clone> IntTrie<V> {
    pub fn insert(&self, key: u64, value: V) -> IntTrie<V> {
        let root = match &self.root {
            None => RC::new(Node::Leaf { key, value }),
            Some(root) => insert(root, key, value),
        };
        IntTrie { root: Some(root) }
    }

    pub fn remove(&self, key: u64) -> IntTrie<V> {
        match self.root.as_ref().and_then(|root| remove(root, key)) {
            Some(root) => IntTrie { root },
            None => self.clone(),
        }
    }

    /// Insert every entry of `other`, combining values of keys present in
    /// both tries with `f(key, self_value, other_value)`.
    pub fn union_with<F: Fn(u64, &V, &V) -> V>(&self, other: &IntTrie<V>, f: F) -> IntTrie<V> {
        other.iter().fold(self.clone(), |trie, (key, value)| {
            let combined = match trie.get(key) {
                Some(mine) => f(key, mine, value),
                None => value.clone(),
            };
            trie.insert(key, combined)
        })
    }
}

impl<V> Clone for IntTrie<V> {
    fn clone(&self) -> IntTrie<V> {
        IntTrie {
            root: self.root.clone(),
        }
    }
}

impl<V> Default for IntTrie<V> {
    fn default() -> IntTrie<V> {
        IntTrie::new()
    }
}

impl<V: PartialEq> PartialEq for IntTrie<V> {
    fn eq(&self, other: &IntTrie<V>) -> bool {
        self.len() == other.len() && self.iter().eq(other.iter())
    }
}

impl<V: Eq> Eq for IntTrie<V> {}

impl<V: Clone> FromIterator<(u64, V)> for IntTrie<V> {
    fn from_iter<I: IntoIterator<Item = (u64, V)>>(iter: I) -> IntTrie<V> {
        iter.into_iter()
            .fold(IntTrie::new(), |trie, (key, value)| trie.insert(key, value))
    }
}

impl<V: fmt::Debug> fmt::Debug for IntTrie<V> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<V: Serialize> Serialize for IntTrie<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.iter())
    }
}

pub struct IntTrieIter<'a, V> {
    stack: Vec<&'a Node<V>>,
}

impl<'a, V> Iterator for IntTrieIter<'a, V> {
    type Item = (u64, &'a V);

    fn next(&mut self) -> Option<(u64, &'a V)> {
        loop {
            match self.stack.pop()? {
                Node::Leaf { key, value } => return Some((*key, value)),
                Node::Branch { left, right, .. } => {
                    self.stack.push(right.as_ref());
                    self.stack.push(left.as_ref());
                }
            }
        }
    }
}
