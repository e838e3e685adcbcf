//! Running abstract domains over a control-flow automaton.
//!
//! `fixed_point_forward` computes an abstract state for every reachable
//! program point, configured by `AnalysisOptions`. Diagnostics raised by the
//! domains along the way are collected in a `WarningsMap`.

mod fixed_point;
mod options;
mod warnings;

pub use self::fixed_point::{fixed_point_forward, AnalysisResult};
pub use self::options::{AnalysisOptions, AnalysisOptionsBuilder};
pub use self::warnings::{WarningKind, WarningMessage, WarningsContainer, WarningsMap};
