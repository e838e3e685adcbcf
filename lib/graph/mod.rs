//! Implements a directed graph.
//!
//! The graph backs the control-flow automaton. Vertices and edges are stored
//! by index in ordered maps, so every traversal is deterministic.

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::Error;

pub trait Vertex: Clone {
    /// The index of this vertex.
    fn index(&self) -> usize;
    /// A string to display in dot graphviz format.
    fn dot_label(&self) -> String;
}

pub trait Edge: Clone {
    /// The index of the head vertex.
    fn head(&self) -> usize;
    /// The index of the tail vertex.
    fn tail(&self) -> usize;
    /// A string to display in dot graphviz format.
    fn dot_label(&self) -> String;
}

/// A directed graph.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize, Default)]
pub struct Graph<V: Vertex, E: Edge> {
    vertices: BTreeMap<usize, V>,
    edges: BTreeMap<(usize, usize), E>,
    successors: BTreeMap<usize, BTreeSet<usize>>,
}

impl<V, E> Graph<V, E>
where
    V: Vertex,
    E: Edge,
{
    pub fn new() -> Graph<V, E> {
        Graph {
            vertices: BTreeMap::new(),
            edges: BTreeMap::new(),
            successors: BTreeMap::new(),
        }
    }

    /// Returns true if the vertex with the given index exists in this graph
    pub fn has_vertex(&self, index: usize) -> bool {
        self.vertices.contains_key(&index)
    }

    /// Inserts a vertex into the graph.
    /// # Errors
    /// Error if the vertex already exists by index.
    pub fn insert_vertex(&mut self, v: V) -> Result<(), Error> {
        if self.vertices.contains_key(&v.index()) {
            return Err("duplicate vertex index".into());
        }
        self.successors.insert(v.index(), BTreeSet::new());
        self.vertices.insert(v.index(), v);
        Ok(())
    }

    /// Inserts an edge into the graph.
    /// # Errors
    /// Error if the edge already exists by indices, or if either end is missing.
    pub fn insert_edge(&mut self, edge: E) -> Result<(), Error> {
        let (head, tail) = (edge.head(), edge.tail());
        if self.edges.contains_key(&(head, tail)) {
            return Err("duplicate edge".into());
        }
        if !self.vertices.contains_key(&head) {
            return Err(Error::GraphVertexNotFound(head));
        }
        if !self.vertices.contains_key(&tail) {
            return Err(Error::GraphVertexNotFound(tail));
        }

        self.edges.insert((head, tail), edge);
        self.successors.entry(head).or_default().insert(tail);

        Ok(())
    }

    /// Compute the post order of all vertices reachable from `root`.
    pub fn compute_post_order(&self, root: usize) -> Result<Vec<usize>, Error> {
        if !self.has_vertex(root) {
            return Err(Error::GraphVertexNotFound(root));
        }

        let mut visited: FxHashSet<usize> = FxHashSet::default();
        let mut order: Vec<usize> = Vec::new();
        // (vertex, successors still to walk)
        let mut stack: Vec<(usize, Vec<usize>)> = Vec::new();

        visited.insert(root);
        stack.push((root, self.successors[&root].iter().rev().cloned().collect()));

        while let Some((node, pending)) = stack.last_mut() {
            match pending.pop() {
                Some(successor) => {
                    if visited.insert(successor) {
                        let next = self.successors[&successor].iter().rev().cloned().collect();
                        stack.push((successor, next));
                    }
                }
                None => {
                    order.push(*node);
                    stack.pop();
                }
            }
        }

        Ok(order)
    }

    /// Compute the reverse post order of all vertices reachable from `root`.
    pub fn compute_reverse_post_order(&self, root: usize) -> Result<Vec<usize>, Error> {
        let mut order = self.compute_post_order(root)?;
        order.reverse();
        Ok(order)
    }

    /// Computes the set of back edges
    ///
    /// A back edge is an edge whose tail is still on the depth-first search
    /// stack when the edge is walked. Every cycle reachable from `root` has
    /// at least one of them, whether or not the graph is reducible.
    pub fn compute_back_edges(&self, root: usize) -> Result<BTreeSet<(usize, usize)>, Error> {
        if !self.has_vertex(root) {
            return Err(Error::GraphVertexNotFound(root));
        }

        let mut back_edges = BTreeSet::new();
        let mut visited: FxHashSet<usize> = FxHashSet::default();
        let mut on_stack: FxHashSet<usize> = FxHashSet::default();
        let mut stack: Vec<(usize, Vec<usize>)> = Vec::new();

        visited.insert(root);
        on_stack.insert(root);
        stack.push((root, self.successors[&root].iter().rev().cloned().collect()));

        while let Some((node, pending)) = stack.last_mut() {
            let node = *node;
            match pending.pop() {
                Some(successor) => {
                    if on_stack.contains(&successor) {
                        back_edges.insert((node, successor));
                    } else if visited.insert(successor) {
                        on_stack.insert(successor);
                        let next = self.successors[&successor].iter().rev().cloned().collect();
                        stack.push((successor, next));
                    }
                }
                None => {
                    on_stack.remove(&node);
                    stack.pop();
                }
            }
        }

        Ok(back_edges)
    }

    /// Fetches a vertex from the graph by index.
    pub fn vertex(&self, index: usize) -> Result<&V, Error> {
        self.vertices
            .get(&index)
            .ok_or(Error::GraphVertexNotFound(index))
    }

    pub fn edge(&self, head: usize, tail: usize) -> Result<&E, Error> {
        self.edges
            .get(&(head, tail))
            .ok_or(Error::GraphEdgeNotFound(head, tail))
    }

    /// Get a reference to every `Edge` in the `Graph`.
    pub fn edges(&self) -> Vec<&E> {
        self.edges.values().collect()
    }

    /// Return all edges out for a vertex
    pub fn edges_out(&self, index: usize) -> Result<Vec<&E>, Error> {
        self.successors
            .get(&index)
            .map(|succs| {
                succs
                    .iter()
                    .map(|succ| &self.edges[&(index, *succ)])
                    .collect()
            })
            .ok_or(Error::GraphVertexNotFound(index))
    }

    /// Returns a string in the graphviz format
    pub fn dot_graph(&self) -> String {
        let vertices = self
            .vertices
            .values()
            .map(|v| {
                format!(
                    "{} [shape=\"box\", label=\"{}\"];",
                    v.index(),
                    v.dot_label().replace('\n', "\\l")
                )
            })
            .collect::<Vec<String>>();

        let edges = self
            .edges
            .values()
            .map(|e| {
                format!(
                    "{} -> {} [label=\"{}\"];",
                    e.head(),
                    e.tail(),
                    e.dot_label().replace('\n', "\\l")
                )
            })
            .collect::<Vec<String>>();

        format!(
            "digraph G {{\n{}\n{}\n}}",
            vertices.join("\n"),
            edges.join("\n")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    impl Vertex for usize {
        fn index(&self) -> usize {
            *self
        }

        fn dot_label(&self) -> String {
            self.to_string()
        }
    }

    impl Edge for (usize, usize) {
        fn head(&self) -> usize {
            self.0
        }

        fn tail(&self) -> usize {
            self.1
        }

        fn dot_label(&self) -> String {
            format!("{} -> {}", self.0, self.1)
        }
    }

    /**
     *           +--> 3 +-+
     *          /          \
     *         | +--> 4 +--+
     *         |/          |
     *         +           v
     * 1 +---> 2 <-------+ 5
     *         +
     *         |
     *         v
     *         6
     */
    fn create_test_graph() -> Graph<usize, (usize, usize)> {
        let mut graph = Graph::new();

        for vertex in 1..=6 {
            graph.insert_vertex(vertex).unwrap();
        }

        graph.insert_edge((1, 2)).unwrap();
        graph.insert_edge((2, 3)).unwrap();
        graph.insert_edge((2, 4)).unwrap();
        graph.insert_edge((2, 6)).unwrap();
        graph.insert_edge((3, 5)).unwrap();
        graph.insert_edge((4, 5)).unwrap();
        graph.insert_edge((5, 2)).unwrap();

        graph
    }

    #[test]
    fn test_duplicate_insertions() {
        let mut graph = create_test_graph();
        assert!(graph.insert_vertex(3).is_err());
        assert!(graph.insert_edge((1, 2)).is_err());
        assert!(matches!(
            graph.insert_edge((1, 9)),
            Err(Error::GraphVertexNotFound(9))
        ));
    }

    #[test]
    fn test_post_order() {
        let graph = create_test_graph();
        let order = graph.compute_post_order(1).unwrap();
        assert_eq!(order.len(), 6);
        assert_eq!(order.last(), Some(&1));
        let position = |v| order.iter().position(|&x| x == v).unwrap();
        assert!(position(5) < position(3));
        assert!(position(6) < position(2));

        let reverse = graph.compute_reverse_post_order(1).unwrap();
        assert_eq!(reverse[0], 1);
        assert_eq!(reverse[1], 2);
    }

    #[test]
    fn test_back_edges() {
        let graph = create_test_graph();
        let back_edges = graph.compute_back_edges(1).unwrap();
        assert_eq!(back_edges.len(), 1);
        assert!(back_edges.contains(&(5, 2)));
    }

    #[test]
    fn test_edges_out() {
        let graph = create_test_graph();
        let tails: Vec<usize> = graph.edges_out(2).unwrap().iter().map(|e| e.tail()).collect();
        assert_eq!(tails, vec![3, 4, 6]);
        assert!(graph.edges_out(42).is_err());
        assert!(graph.edge(5, 2).is_ok());
        assert!(matches!(
            graph.edge(2, 5),
            Err(Error::GraphEdgeNotFound(2, 5))
        ));
    }

    #[test]
    fn test_dot_graph() {
        let graph = create_test_graph();
        let dot = graph.dot_graph();
        assert!(dot.starts_with("digraph G {"));
        assert!(dot.contains("5 -> 2 [label=\"5 -> 2\"];"));
    }
}
