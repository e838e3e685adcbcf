//! Locations of abstract states.
//!
//! A `ProgramPoint` is a vertex of the control-flow automaton together with
//! the `CallString` of the context the vertex is analyzed in. Both are
//! totally ordered, so per-point maps iterate deterministically.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The most recent call sites leading to a context, oldest first.
#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct CallString {
    sites: Vec<usize>,
}

impl CallString {
    pub fn new() -> CallString {
        CallString::default()
    }

    /// Append `site`, keeping only the newest `max_length` sites.
    pub fn push(&self, site: usize, max_length: usize) -> CallString {
        let mut sites = self.sites.clone();
        sites.push(site);
        let excess = sites.len().saturating_sub(max_length);
        sites.drain(..excess);
        CallString { sites }
    }

    /// The context of the caller.
    pub fn pop(&self) -> CallString {
        let mut sites = self.sites.clone();
        sites.pop();
        CallString { sites }
    }

    pub fn sites(&self) -> &[usize] {
        &self.sites
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }
}

impl fmt::Display for CallString {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let sites = self
            .sites
            .iter()
            .map(|site| format!("{}", site))
            .collect::<Vec<String>>();
        write!(f, "[{}]", sites.join(", "))
    }
}

/// A vertex of the control-flow automaton in a calling context.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct ProgramPoint {
    vertex: usize,
    call_string: CallString,
}

impl ProgramPoint {
    pub fn new(vertex: usize, call_string: CallString) -> ProgramPoint {
        ProgramPoint {
            vertex,
            call_string,
        }
    }

    /// A point in the empty context.
    pub fn vertex_only(vertex: usize) -> ProgramPoint {
        ProgramPoint::new(vertex, CallString::new())
    }

    pub fn vertex(&self) -> usize {
        self.vertex
    }

    pub fn call_string(&self) -> &CallString {
        &self.call_string
    }
}

impl fmt::Display for ProgramPoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.call_string.is_empty() {
            write!(f, "{}", self.vertex)
        } else {
            write!(f, "{}@{}", self.vertex, self.call_string)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_call_strings() {
        let cs = CallString::new().push(1, 2).push(2, 2).push(3, 2);
        assert_eq!(cs.sites(), &[2, 3]);
        assert_eq!(cs.pop().sites(), &[2]);
        assert!(CallString::new().push(7, 0).is_empty());
        assert_eq!(format!("{}", cs), "[2, 3]");
    }

    #[test]
    fn ordering() {
        let a = ProgramPoint::vertex_only(3);
        let b = ProgramPoint::new(3, CallString::new().push(1, 1));
        let c = ProgramPoint::vertex_only(4);
        assert!(a < b);
        assert!(b < c);
        assert_eq!(format!("{}", b), "3@[1]");
    }
}
