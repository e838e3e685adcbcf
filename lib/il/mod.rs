//! The intermediate language analyzed by the abstract domains.
//!
//! The IL is deliberately small. Values are `NumVar`s, memory regions are
//! `MemVar`s, and every computation is expressed with canonical affine
//! expressions (`Linear`). Branch conditions are `Test`s, comparisons of a
//! `Linear` against zero. An `Instruction` is a closed sum over assignments,
//! tests, loads, stores and `Nop`, and labels the transitions of a `Cfa`.
//!
//! Abstract states are stored per `ProgramPoint`: a `Cfa` location in a
//! calling context (`CallString`).

mod cfa;
mod guard;
mod instruction;
mod linear;
mod location;
mod variable;

pub use self::cfa::{Cfa, Location, Transition};
pub use self::guard::{Test, TestOp};
pub use self::instruction::{BinOp, Instruction, Rhs};
pub use self::linear::{Linear, Term};
pub use self::location::{CallString, ProgramPoint};
pub use self::variable::{MemVar, NumVar};

/// Convenience function to create a `Linear` over a single variable.
pub fn var(var: &NumVar) -> Linear {
    Linear::var(var)
}

/// Convenience function to create a constant `Linear`.
pub fn constant<C: Into<num_bigint::BigInt>>(value: C) -> Linear {
    Linear::constant(value)
}
