//! A `Cfa` is a directed `Graph` of `Location` and `Transition`.

use crate::il::Instruction;
use crate::{graph, Error};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A vertex of the control-flow automaton.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Location {
    index: usize,
    address: Option<u64>,
}

impl Location {
    pub fn new(index: usize, address: Option<u64>) -> Location {
        Location { index, address }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// The address of the native instruction this location precedes, if known.
    pub fn address(&self) -> Option<u64> {
        self.address
    }
}

impl graph::Vertex for Location {
    fn index(&self) -> usize {
        self.index
    }

    fn dot_label(&self) -> String {
        format!("{}", self)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.address {
            Some(address) => write!(f, "{} (0x{:X})", self.index, address),
            None => write!(f, "{}", self.index),
        }
    }
}

/// An edge of the control-flow automaton, labelled with the instruction
/// taken along it.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Transition {
    head: usize,
    tail: usize,
    instruction: Instruction,
}

impl Transition {
    pub fn new(head: usize, tail: usize, instruction: Instruction) -> Transition {
        Transition {
            head,
            tail,
            instruction,
        }
    }

    pub fn head(&self) -> usize {
        self.head
    }

    pub fn tail(&self) -> usize {
        self.tail
    }

    pub fn instruction(&self) -> &Instruction {
        &self.instruction
    }
}

impl graph::Edge for Transition {
    fn head(&self) -> usize {
        self.head
    }

    fn tail(&self) -> usize {
        self.tail
    }

    fn dot_label(&self) -> String {
        format!("{}", self.instruction)
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} -> {}: {}", self.head, self.tail, self.instruction)
    }
}

/// A control-flow automaton: program locations as vertices, and instructions
/// on the edges between them.
///
/// A branch is two transitions out of the same location, labelled with a
/// test and its negation.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Cfa {
    graph: graph::Graph<Location, Transition>,
    entry: Option<usize>,
    exit: Option<usize>,
}

impl Default for Cfa {
    fn default() -> Cfa {
        Cfa::new()
    }
}

impl Cfa {
    pub fn new() -> Cfa {
        Cfa {
            graph: graph::Graph::new(),
            entry: None,
            exit: None,
        }
    }

    /// Build a `Cfa` from its transitions, creating locations as needed.
    pub fn from_transitions<I>(entry: usize, exit: usize, transitions: I) -> Result<Cfa, Error>
    where
        I: IntoIterator<Item = (usize, usize, Instruction)>,
    {
        let mut cfa = Cfa::new();
        cfa.ensure_location(entry)?;
        cfa.ensure_location(exit)?;
        for (head, tail, instruction) in transitions {
            cfa.ensure_location(head)?;
            cfa.ensure_location(tail)?;
            cfa.add_transition(head, tail, instruction)?;
        }
        cfa.set_entry(entry)?;
        cfa.set_exit(exit)?;
        Ok(cfa)
    }

    fn ensure_location(&mut self, index: usize) -> Result<(), Error> {
        if !self.graph.has_vertex(index) {
            self.add_location(Location::new(index, None))?;
        }
        Ok(())
    }

    /// Returns the underlying graph
    pub fn graph(&self) -> &graph::Graph<Location, Transition> {
        &self.graph
    }

    pub fn add_location(&mut self, location: Location) -> Result<(), Error> {
        self.graph.insert_vertex(location)
    }

    pub fn add_transition(
        &mut self,
        head: usize,
        tail: usize,
        instruction: Instruction,
    ) -> Result<(), Error> {
        self.graph
            .insert_edge(Transition::new(head, tail, instruction))
    }

    /// Sets the entry point for this `Cfa` to the given `Location` index.
    pub fn set_entry(&mut self, entry: usize) -> Result<(), Error> {
        if self.graph.has_vertex(entry) {
            self.entry = Some(entry);
            return Ok(());
        }
        Err(Error::GraphVertexNotFound(entry))
    }

    /// Sets the exit point for this `Cfa` to the given `Location` index.
    pub fn set_exit(&mut self, exit: usize) -> Result<(), Error> {
        if self.graph.has_vertex(exit) {
            self.exit = Some(exit);
            return Ok(());
        }
        Err(Error::GraphVertexNotFound(exit))
    }

    pub fn entry(&self) -> Option<usize> {
        self.entry
    }

    pub fn exit(&self) -> Option<usize> {
        self.exit
    }

    pub fn location(&self, index: usize) -> Result<&Location, Error> {
        self.graph.vertex(index)
    }

    pub fn transition(&self, head: usize, tail: usize) -> Result<&Transition, Error> {
        self.graph.edge(head, tail)
    }

    /// The transitions leaving `index`, ordered by tail.
    pub fn transitions_out(&self, index: usize) -> Result<Vec<&Transition>, Error> {
        self.graph.edges_out(index)
    }

    /// Transitions closing a cycle, found by a depth-first search from the
    /// entry. Their tails are the loop heads where states must be widened.
    pub fn back_edges(&self) -> Result<BTreeSet<(usize, usize)>, Error> {
        let entry = self.entry.ok_or("Cfa has no entry")?;
        self.graph.compute_back_edges(entry)
    }

    /// The locations reachable from the entry, in reverse post order.
    pub fn reverse_post_order(&self) -> Result<Vec<usize>, Error> {
        let entry = self.entry.ok_or("Cfa has no entry")?;
        self.graph.compute_reverse_post_order(entry)
    }

    pub fn dot_graph(&self) -> String {
        self.graph.dot_graph()
    }
}

impl fmt::Display for Cfa {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for transition in self.graph.edges() {
            writeln!(f, "{}", transition)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::il::{Linear, NumVar, Test};

    #[test]
    fn loop_back_edges() {
        let i = NumVar::fresh("i");
        let mut cfa = Cfa::from_transitions(
            0,
            3,
            vec![
                (0, 1, Instruction::assign(i.clone(), Linear::zero())),
                (
                    1,
                    2,
                    Instruction::test(Test::less_than(&Linear::var(&i), &10.into())),
                ),
                (2, 1, Instruction::assign(i.clone(), Linear::var(&i).add_constant(1))),
                (
                    1,
                    3,
                    Instruction::test(Test::less_or_equal(&10.into(), &Linear::var(&i))),
                ),
            ],
        )
        .unwrap();

        assert_eq!(cfa.entry(), Some(0));
        assert_eq!(cfa.exit(), Some(3));
        assert_eq!(cfa.back_edges().unwrap().into_iter().collect::<Vec<_>>(), vec![(2, 1)]);
        assert_eq!(cfa.reverse_post_order().unwrap()[0], 0);
        assert_eq!(cfa.transitions_out(1).unwrap().len(), 2);
        assert!(cfa.set_entry(42).is_err());
        assert_eq!(cfa.entry(), Some(0));
    }

    #[test]
    fn default_is_empty() {
        let cfa = Cfa::default();
        assert_eq!(cfa.entry(), None);
        assert_eq!(cfa.exit(), None);
        assert!(cfa.back_edges().is_err());
    }
}
