//! Diagnostics raised by abstract domains during an analysis.

use crate::il::ProgramPoint;
use crate::Error;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// What a diagnostic is about.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum WarningKind {
    /// An access may start before its region.
    OutOfRegionBelow,
    /// An access may end past its region.
    OutOfRegionAbove,
    /// The target of an access is not a known region.
    UnknownRegion,
    WriteToReadOnlyRegion,
    /// An access may touch more than one region, or an unbounded set of
    /// addresses.
    ImpreciseAccess,
    Generic,
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            WarningKind::OutOfRegionBelow => "out-of-region-below",
            WarningKind::OutOfRegionAbove => "out-of-region-above",
            WarningKind::UnknownRegion => "unknown-region",
            WarningKind::WriteToReadOnlyRegion => "write-to-read-only-region",
            WarningKind::ImpreciseAccess => "imprecise-access",
            WarningKind::Generic => "generic",
        };
        write!(f, "{}", name)
    }
}

/// A single diagnostic.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum WarningMessage {
    Info { kind: WarningKind, message: String },
    Warning { kind: WarningKind, message: String },
    /// The analysis continued with a state restricted to the executions that
    /// do not trigger this problem.
    StateRestrictionWarning { kind: WarningKind, message: String },
}

impl WarningMessage {
    pub fn info<S: Into<String>>(kind: WarningKind, message: S) -> WarningMessage {
        WarningMessage::Info {
            kind,
            message: message.into(),
        }
    }

    pub fn warning<S: Into<String>>(kind: WarningKind, message: S) -> WarningMessage {
        WarningMessage::Warning {
            kind,
            message: message.into(),
        }
    }

    pub fn state_restriction<S: Into<String>>(kind: WarningKind, message: S) -> WarningMessage {
        WarningMessage::StateRestrictionWarning {
            kind,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> WarningKind {
        match self {
            WarningMessage::Info { kind, .. }
            | WarningMessage::Warning { kind, .. }
            | WarningMessage::StateRestrictionWarning { kind, .. } => *kind,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            WarningMessage::Info { message, .. }
            | WarningMessage::Warning { message, .. }
            | WarningMessage::StateRestrictionWarning { message, .. } => message,
        }
    }
}

impl fmt::Display for WarningMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let severity = match self {
            WarningMessage::Info { .. } => "info",
            WarningMessage::Warning { .. } => "warning",
            WarningMessage::StateRestrictionWarning { .. } => "restriction",
        };
        write!(f, "{}({}): {}", severity, self.kind(), self.message())
    }
}

/// The diagnostics of one evaluation, in the order they were raised.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct WarningsContainer {
    messages: Vec<WarningMessage>,
}

impl WarningsContainer {
    pub fn new() -> WarningsContainer {
        WarningsContainer::default()
    }

    pub fn add(&mut self, message: WarningMessage) {
        self.messages.push(message);
    }

    pub fn extend(&mut self, other: &WarningsContainer) {
        self.messages.extend(other.messages.iter().cloned());
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WarningMessage> {
        self.messages.iter()
    }

    pub fn count_of(&self, kind: WarningKind) -> usize {
        self.messages
            .iter()
            .filter(|message| message.kind() == kind)
            .count()
    }
}

impl fmt::Display for WarningsContainer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for message in &self.messages {
            writeln!(f, "{}", message)?;
        }
        Ok(())
    }
}

/// The diagnostics of a whole analysis, keyed by the program point whose
/// evaluation raised them.
///
/// A point's diagnostics are replaced each time the point is evaluated again,
/// and the iteration of its first recorded evaluation is kept. Once a point
/// has diagnostics, later evaluations must raise the same number of them.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct WarningsMap {
    warnings: BTreeMap<ProgramPoint, WarningsContainer>,
    first_iteration: BTreeMap<ProgramPoint, usize>,
}

#[derive(Serialize)]
struct WarningsEntry<'a> {
    point: &'a ProgramPoint,
    iteration: usize,
    warnings: &'a WarningsContainer,
}

impl WarningsMap {
    pub fn new() -> WarningsMap {
        WarningsMap::default()
    }

    /// The diagnostics of `point`. Empty if there are none.
    pub fn get(&self, point: &ProgramPoint) -> WarningsContainer {
        self.warnings.get(point).cloned().unwrap_or_default()
    }

    /// The iteration in which `point` first raised diagnostics.
    pub fn first_iteration(&self, point: &ProgramPoint) -> Option<usize> {
        self.first_iteration.get(point).copied()
    }

    /// Record the diagnostics raised by evaluating `point` in `iteration`.
    ///
    /// Fails with `Error::InvariantViolation`, and leaves the map unchanged,
    /// if `point` already has a different number of diagnostics.
    pub fn put(
        &mut self,
        point: ProgramPoint,
        iteration: usize,
        warnings: WarningsContainer,
    ) -> Result<(), Error> {
        if let Some(previous) = self.warnings.get(&point) {
            if previous.len() != warnings.len() {
                return Err(Error::invariant(format!(
                    "{} raised {} warnings in iteration {}, but {} before",
                    point,
                    warnings.len(),
                    iteration,
                    previous.len()
                )));
            }
        }
        self.first_iteration.entry(point.clone()).or_insert(iteration);
        self.warnings.insert(point, warnings);
        Ok(())
    }

    /// The number of points with diagnostics.
    pub fn len(&self) -> usize {
        self.warnings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn total_count(&self) -> usize {
        self.warnings.values().map(|warnings| warnings.len()).sum()
    }

    pub fn count_of(&self, kind: WarningKind) -> usize {
        self.warnings
            .values()
            .map(|warnings| warnings.count_of(kind))
            .sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ProgramPoint, &WarningsContainer)> {
        self.warnings.iter()
    }

    /// Serialize every point's diagnostics as a JSON array.
    pub fn to_json(&self) -> Result<String, Error> {
        let entries = self
            .warnings
            .iter()
            .map(|(point, warnings)| WarningsEntry {
                point,
                iteration: self.first_iteration.get(point).copied().unwrap_or(0),
                warnings,
            })
            .collect::<Vec<WarningsEntry>>();
        Ok(serde_json::to_string_pretty(&entries)?)
    }
}

impl fmt::Display for WarningsMap {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (point, warnings) in &self.warnings {
            let iteration = self.first_iteration.get(point).copied().unwrap_or(0);
            writeln!(f, "{} (iteration {}):", point, iteration)?;
            for message in warnings.iter() {
                writeln!(f, "  {}", message)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container(messages: &[WarningMessage]) -> WarningsContainer {
        let mut container = WarningsContainer::new();
        for message in messages {
            container.add(message.clone());
        }
        container
    }

    fn below() -> WarningMessage {
        WarningMessage::state_restriction(WarningKind::OutOfRegionBelow, "p may be below stack")
    }

    fn above() -> WarningMessage {
        WarningMessage::state_restriction(WarningKind::OutOfRegionAbove, "p may be above stack")
    }

    #[test]
    fn get_of_unknown_point_is_empty() {
        let map = WarningsMap::new();
        assert!(map.get(&ProgramPoint::vertex_only(3)).is_empty());
        assert_eq!(map.first_iteration(&ProgramPoint::vertex_only(3)), None);
    }

    #[test]
    fn put_keeps_first_iteration() {
        let point = ProgramPoint::vertex_only(3);
        let mut map = WarningsMap::new();
        map.put(point.clone(), 1, container(&[below()])).unwrap();
        map.put(point.clone(), 4, container(&[above()])).unwrap();

        assert_eq!(map.first_iteration(&point), Some(1));
        assert_eq!(map.get(&point), container(&[above()]));
        assert_eq!(map.total_count(), 1);
    }

    #[test]
    fn put_with_different_count_fails_and_keeps_map() {
        let point = ProgramPoint::vertex_only(3);
        let mut map = WarningsMap::new();
        map.put(point.clone(), 1, container(&[below()])).unwrap();

        let result = map.put(point.clone(), 2, container(&[below(), above()]));
        assert!(matches!(result, Err(Error::InvariantViolation { .. })));
        assert_eq!(map.get(&point), container(&[below()]));
        assert_eq!(map.first_iteration(&point), Some(1));
    }

    #[test]
    fn counts_by_kind() {
        let mut map = WarningsMap::new();
        map.put(ProgramPoint::vertex_only(1), 1, container(&[below(), above()]))
            .unwrap();
        map.put(ProgramPoint::vertex_only(2), 1, container(&[below()]))
            .unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.total_count(), 3);
        assert_eq!(map.count_of(WarningKind::OutOfRegionBelow), 2);
        assert_eq!(map.count_of(WarningKind::UnknownRegion), 0);
    }

    #[test]
    fn display_and_json() {
        let mut map = WarningsMap::new();
        map.put(ProgramPoint::vertex_only(7), 2, container(&[below()]))
            .unwrap();
        assert_eq!(
            map.to_string(),
            "7 (iteration 2):\n  restriction(out-of-region-below): p may be below stack\n"
        );

        let json: serde_json::Value = serde_json::from_str(&map.to_json().unwrap()).unwrap();
        assert_eq!(json[0]["iteration"], 2);
        assert_eq!(json[0]["point"]["vertex"], 7);
        assert_eq!(
            json[0]["warnings"]["messages"][0]["StateRestrictionWarning"]["kind"],
            "OutOfRegionBelow"
        );
    }
}
