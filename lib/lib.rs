//! Stratum: composable abstract domains for the analysis of machine code.
//!
//! Stratum is the abstract-interpretation core of a binary analyzer. It does
//! not decode instructions or parse executables. It takes a control-flow
//! automaton labelled with a small linear IR, and computes sound
//! over-approximations of the values, pointers and memory contents the
//! program can reach.
//!
//! The crate is organized bottom-up:
//!
//! * `collections` - Persistent (immutable, structurally shared) maps, sets,
//! integer tries and range trees. Every abstract state is built from these.
//! * `numeric` - Arbitrary-precision bounds and ranges.
//! * `il` - Numeric and memory variables, canonical linear expressions,
//! tests, instructions, program points and the control-flow automaton.
//! * `domain` - The `Domain` contract and the stackable domains: `Intervals`,
//! the decision-tree domain `Phased`, and the memory domain `Segments`.
//! * `analysis` - Options, the diagnostics channel and a forward fixed-point
//! driver.
//!
//! A typical stack is built by nesting:
//!
//! ```
//! use stratum::domain::{Intervals, Phased, Segments};
//!
//! let state: Segments<Phased<Intervals>> = Segments::new(Phased::new(Intervals::new()));
//! ```
//!
//! # Errors
//!
//! Every fallible operation returns `Result<T, Error>`. `Error::Unreachable`
//! is not a failure. It is how a domain reports that a state holds no
//! concrete executions, and domains must let it propagate. Every other
//! variant is a defect and aborts the analysis.

use thiserror::Error;

pub mod analysis;
pub mod collections;
pub mod domain;
pub mod graph;
pub mod il;
pub mod numeric;
#[cfg(test)]
mod tests;

#[cfg(not(feature = "thread_safe"))]
use std::rc::Rc;
#[cfg(not(feature = "thread_safe"))]
pub type RC<T> = Rc<T>;

#[cfg(feature = "thread_safe")]
use std::sync::Arc;
#[cfg(feature = "thread_safe")]
pub type RC<T> = Arc<T>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Unreachable")]
    Unreachable,
    #[error("Unimplemented operation: {what}")]
    UnimplementedOperation { what: String },
    #[error("Invariant violation: {message}")]
    InvariantViolation { message: String },
    #[error("Unknown variable: {var}")]
    UnknownVariable { var: il::NumVar },
    #[error("Unknown region: {region}")]
    UnknownRegion { region: il::MemVar },
    #[error("The vertex id {0} does not exist in the graph")]
    GraphVertexNotFound(usize),
    #[error("The edge with head {0} and tail {1} does not exist in the graph")]
    GraphEdgeNotFound(usize, usize),
    #[error("Fixed point did not converge within {0} iterations")]
    FixedPointMaxIterations(usize),
    #[error("Error evaluating `{instruction}` at {point}")]
    Evaluation {
        point: il::ProgramPoint,
        instruction: String,
        #[source]
        source: Box<Error>,
    },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Custom(String),
}

impl Error {
    pub fn unimplemented<S: Into<String>>(what: S) -> Error {
        Error::UnimplementedOperation { what: what.into() }
    }

    pub fn invariant<S: Into<String>>(message: S) -> Error {
        Error::InvariantViolation {
            message: message.into(),
        }
    }

    /// Returns true if this is the infeasibility signal rather than a defect.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Error::Unreachable)
    }

    /// Wrap this error with the location and instruction that raised it.
    pub fn at(self, point: &il::ProgramPoint, instruction: &il::Instruction) -> Error {
        Error::Evaluation {
            point: point.clone(),
            instruction: instruction.to_string(),
            source: Box::new(self),
        }
    }

    /// The innermost error of an `Evaluation` chain.
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::Evaluation { source, .. } => source.root_cause(),
            _ => self,
        }
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Error {
        Error::Custom(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Error {
        Error::Custom(s)
    }
}
