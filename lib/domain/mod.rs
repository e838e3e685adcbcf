//! Abstract domains and the contract that lets them be stacked.
//!
//! Every domain implements `Domain`. A domain that refines another is generic
//! over it and wraps it, handling the operations its abstraction covers and
//! delegating everything else:
//!
//! * `Intervals` - A base numeric domain mapping each variable to a `Range`.
//! * `Phased<D>` - A decision tree over `D`, splitting states by branch
//! conditions that were once found infeasible.
//! * `Segments<D>` - The memory domain. Resolves loads and stores to regions
//! and fields of `D`, and reports out-of-bounds accesses.
//!
//! # Infeasibility
//!
//! An operation that leaves no concrete state returns `Err(Error::Unreachable)`.
//! This is an expected result, not a failure. A domain must propagate it as
//! it is, unless it catches it on purpose to split cases (see `feasible`).
//! Every other error is a defect.

mod deref;
mod intervals;
mod phased;
mod segments;

pub use self::deref::{AbstractMemPointer, AbstractPointer, DerefOffset};
pub use self::intervals::Intervals;
pub use self::phased::Phased;
pub use self::segments::{Region, RegionBase, RegionPermissions, Segments};

use crate::analysis::WarningsContainer;
use crate::il::{Instruction, Linear, NumVar, Test};
use crate::numeric::Range;
use crate::Error;
use std::fmt;

/// The read-only view of an abstract state.
pub trait QueryChannel {
    /// The values `expr` can take in this state.
    fn query_range(&self, expr: &Linear) -> Result<Range, Error>;
}

/// An abstract domain.
///
/// States are persistent values. No operation mutates `self`. Each returns
/// a new state that may share structure with the old one.
pub trait Domain: QueryChannel + Clone + fmt::Debug + fmt::Display {
    /// Apply the transfer function of `instruction`.
    ///
    /// Fails with `Error::Unreachable` if no concrete state survives.
    fn eval(&self, instruction: &Instruction) -> Result<Self, Error>;

    /// An upper bound of `self` and `other`.
    fn join(&self, other: &Self) -> Result<Self, Error>;

    /// Extrapolate from `self` to `other`, where `other` is the newer state.
    /// Any chain of widenings becomes stable in finitely many steps.
    fn widen(&self, other: &Self) -> Result<Self, Error>;

    /// True if every concrete state of `other` is a state of `self`.
    fn subsumes(&self, other: &Self) -> Result<bool, Error>;

    /// Add `var` with a value in `value`.
    fn introduce(&self, var: &NumVar, value: &Range) -> Result<Self, Error>;

    /// Remove `var`.
    fn project(&self, var: &NumVar) -> Result<Self, Error>;

    /// Rename `from` to `to`.
    fn substitute(&self, from: &NumVar, to: &NumVar) -> Result<Self, Error>;

    /// Diagnostics raised by the `eval` that produced this state.
    fn warnings(&self) -> WarningsContainer {
        WarningsContainer::new()
    }

    fn eval_test(&self, test: &Test) -> Result<Self, Error> {
        self.eval(&Instruction::Test(test.clone()))
    }
}

/// Turn infeasibility into `None`, passing defects through.
pub fn feasible<T>(result: Result<T, Error>) -> Result<Option<T>, Error> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(Error::Unreachable) => Ok(None),
        Err(error) => Err(error),
    }
}

/// Join two optional states, where `None` is the empty state.
pub fn join_option<D: Domain>(a: Option<D>, b: Option<D>) -> Result<Option<D>, Error> {
    Ok(match (a, b) {
        (None, b) => b,
        (a, None) => a,
        (Some(a), Some(b)) => Some(a.join(&b)?),
    })
}
