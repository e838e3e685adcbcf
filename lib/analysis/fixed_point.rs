//! A forward fixed-point driver over a control-flow automaton.

use crate::analysis::{AnalysisOptions, WarningsContainer, WarningsMap};
use crate::domain::{feasible, Domain};
use crate::il::{Cfa, ProgramPoint};
use crate::Error;
use log::{debug, trace};
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::{BTreeMap, BTreeSet};

/// The outcome of `fixed_point_forward`.
#[derive(Clone, Debug)]
pub struct AnalysisResult<D> {
    states: BTreeMap<ProgramPoint, D>,
    warnings: WarningsMap,
    visits: BTreeMap<ProgramPoint, usize>,
}

impl<D> AnalysisResult<D> {
    /// The state at `point`. `None` if `point` is unreachable.
    pub fn state(&self, point: &ProgramPoint) -> Option<&D> {
        self.states.get(point)
    }

    pub fn states(&self) -> &BTreeMap<ProgramPoint, D> {
        &self.states
    }

    pub fn warnings(&self) -> &WarningsMap {
        &self.warnings
    }

    /// How many times `point` was evaluated.
    pub fn iterations(&self, point: &ProgramPoint) -> usize {
        self.visits.get(point).copied().unwrap_or(0)
    }
}

/// Compute a post fixed point of `cfa`, starting with `initial` at its entry.
///
/// Locations are visited in reverse post order. A transition whose
/// evaluation is infeasible contributes nothing. Any other error aborts the
/// analysis, wrapped with the point and instruction that raised it.
///
/// Warnings are taken from the stable states once iteration is done, so
/// each point reports what its final state raises. The iteration recorded
/// for a point is the visit in which it first raised a warning.
pub fn fixed_point_forward<D: Domain>(
    cfa: &Cfa,
    initial: D,
    options: &AnalysisOptions,
) -> Result<AnalysisResult<D>, Error> {
    let entry = cfa.entry().ok_or("Cfa has no entry")?;
    let context = options.context();
    let point = |vertex: usize| ProgramPoint::new(vertex, context.clone());

    let order: FxHashMap<usize, usize> = cfa
        .reverse_post_order()?
        .into_iter()
        .enumerate()
        .map(|(position, vertex)| (vertex, position))
        .collect();
    let position = |vertex: usize| order.get(&vertex).copied().unwrap_or(usize::MAX);
    let loop_heads: FxHashSet<usize> = cfa
        .back_edges()?
        .into_iter()
        .map(|(_, tail)| tail)
        .collect();

    let mut states: BTreeMap<ProgramPoint, D> = BTreeMap::new();
    let mut first_warned: FxHashMap<usize, usize> = FxHashMap::default();
    let mut visits: FxHashMap<usize, usize> = FxHashMap::default();
    let mut worklist: BTreeSet<(usize, usize)> = BTreeSet::new();
    let mut iterations = 0;

    states.insert(point(entry), initial);
    worklist.insert((position(entry), entry));

    loop {
        let (order_key, vertex) = match worklist.iter().next() {
            Some(next) => *next,
            None => break,
        };
        worklist.remove(&(order_key, vertex));

        iterations += 1;
        if iterations > options.max_iterations() {
            return Err(Error::FixedPointMaxIterations(options.max_iterations()));
        }

        let head = point(vertex);
        let visit = {
            let visit = visits.entry(vertex).or_insert(0);
            *visit += 1;
            *visit
        };
        let state = match states.get(&head) {
            Some(state) => state.clone(),
            None => continue,
        };
        trace!("visiting {} ({})", head, visit);

        for transition in cfa.transitions_out(vertex)? {
            let instruction = transition.instruction();
            let next = match feasible(state.eval(instruction)) {
                Ok(Some(next)) => next,
                Ok(None) => {
                    trace!("{}: `{}` is infeasible", head, instruction);
                    continue;
                }
                Err(error) => return Err(error.at(&head, instruction)),
            };
            if !next.warnings().is_empty() {
                first_warned.entry(vertex).or_insert(visit);
            }

            let tail = transition.tail();
            let target = point(tail);
            let updated = match states.get(&target) {
                None => Some(next),
                Some(old) => {
                    let merge = || -> Result<Option<D>, Error> {
                        if old.subsumes(&next)? {
                            return Ok(None);
                        }
                        let joined = old.join(&next)?;
                        let tail_visits = visits.get(&tail).copied().unwrap_or(0);
                        if loop_heads.contains(&tail) && tail_visits > options.widening_delay() {
                            debug!("widening at {} after {} visits", target, tail_visits);
                            Ok(Some(old.widen(&joined)?))
                        } else {
                            Ok(Some(joined))
                        }
                    };
                    merge().map_err(|error| error.at(&target, instruction))?
                }
            };
            if let Some(updated) = updated {
                states.insert(target, updated);
                worklist.insert((position(tail), tail));
            }
        }
    }

    let warnings = collect_warnings(cfa, &states, |vertex| {
        first_warned.get(&vertex).copied().unwrap_or(0)
    })?;
    let visits = visits
        .into_iter()
        .map(|(vertex, count)| (point(vertex), count))
        .collect();
    Ok(AnalysisResult {
        states,
        warnings,
        visits,
    })
}

/// The warnings raised by evaluating the out-transitions of every point in
/// its final state. `first_iteration` gives the visit in which a vertex first
/// raised warnings.
fn collect_warnings<D, F>(
    cfa: &Cfa,
    states: &BTreeMap<ProgramPoint, D>,
    first_iteration: F,
) -> Result<WarningsMap, Error>
where
    D: Domain,
    F: Fn(usize) -> usize,
{
    let mut warnings = WarningsMap::new();
    for (point, state) in states {
        let mut raised = WarningsContainer::new();
        let mut last = None;
        for transition in cfa.transitions_out(point.vertex())? {
            let instruction = transition.instruction();
            let next = feasible(state.eval(instruction))
                .map_err(|error| error.at(point, instruction))?;
            if let Some(next) = next {
                let found = next.warnings();
                if !found.is_empty() {
                    raised.extend(&found);
                    last = Some(instruction);
                }
            }
        }
        if let Some(instruction) = last {
            warnings
                .put(point.clone(), first_iteration(point.vertex()), raised)
                .map_err(|error| error.at(point, instruction))?;
        }
    }
    Ok(warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::AnalysisOptionsBuilder;
    use crate::domain::Intervals;
    use crate::il::{constant, var, Instruction, NumVar, Test};
    use crate::numeric::Range;

    /// 0 -> 1: i = 0
    /// 1 -> 2: i <= 9
    /// 2 -> 1: i = i + 1
    /// 1 -> 3: i > 9
    fn counting_loop(i: &NumVar) -> Cfa {
        let bound = Test::less_or_equal(&var(i), &constant(9));
        Cfa::from_transitions(
            0,
            3,
            vec![
                (0, 1, Instruction::assign(i.clone(), constant(0))),
                (1, 2, Instruction::test(bound.clone())),
                (2, 1, Instruction::assign(i.clone(), var(i).add_constant(1))),
                (1, 3, Instruction::test(bound.not())),
            ],
        )
        .unwrap()
    }

    fn range_at(result: &AnalysisResult<Intervals>, vertex: usize, v: &NumVar) -> Range {
        result
            .state(&ProgramPoint::vertex_only(vertex))
            .unwrap()
            .range(v)
            .cloned()
            .unwrap()
    }

    #[test]
    fn loop_converges_with_widening() {
        let i = NumVar::fresh("i");
        let cfa = counting_loop(&i);
        let result =
            fixed_point_forward(&cfa, Intervals::new(), &AnalysisOptions::default()).unwrap();

        assert_eq!(range_at(&result, 1, &i), Range::at_least(0));
        assert_eq!(range_at(&result, 2, &i), Range::finite(0, 9).unwrap());
        assert_eq!(range_at(&result, 3, &i), Range::at_least(10));
        assert!(result.warnings().is_empty());
        assert!(result.iterations(&ProgramPoint::vertex_only(1)) > 3);
    }

    #[test]
    fn infeasible_transitions_are_dropped() {
        let i = NumVar::fresh("i");
        let cfa = Cfa::from_transitions(
            0,
            2,
            vec![
                (0, 1, Instruction::assign(i.clone(), constant(5))),
                (1, 2, Instruction::test(Test::less_than(&var(&i), &constant(0)))),
            ],
        )
        .unwrap();
        let result =
            fixed_point_forward(&cfa, Intervals::new(), &AnalysisOptions::default()).unwrap();
        assert!(result.state(&ProgramPoint::vertex_only(1)).is_some());
        assert!(result.state(&ProgramPoint::vertex_only(2)).is_none());
    }

    #[test]
    fn defects_are_wrapped_with_their_location() {
        let i = NumVar::fresh("i");
        let unknown = NumVar::fresh("unknown");
        let cfa = Cfa::from_transitions(
            0,
            2,
            vec![
                (0, 1, Instruction::assign(i.clone(), constant(5))),
                (1, 2, Instruction::assign(i.clone(), var(&unknown))),
            ],
        )
        .unwrap();
        let error = fixed_point_forward(&cfa, Intervals::new(), &AnalysisOptions::default())
            .unwrap_err();
        match &error {
            Error::Evaluation { point, .. } => assert_eq!(point.vertex(), 1),
            other => panic!("unexpected error {:?}", other),
        }
        assert!(matches!(
            error.root_cause(),
            Error::UnknownVariable { .. }
        ));
    }

    #[test]
    fn iteration_limit() {
        let i = NumVar::fresh("i");
        let cfa = counting_loop(&i);
        let options = AnalysisOptionsBuilder::new().max_iterations(4).build();
        let result = fixed_point_forward(&cfa, Intervals::new(), &options);
        assert!(matches!(result, Err(Error::FixedPointMaxIterations(4))));
    }

    #[test]
    fn states_are_kept_per_context() {
        let i = NumVar::fresh("i");
        let cfa = counting_loop(&i);
        let options = AnalysisOptionsBuilder::new().called_from(40).build();
        let result = fixed_point_forward(&cfa, Intervals::new(), &options).unwrap();
        let point = ProgramPoint::new(3, options.context().clone());
        assert!(result.state(&point).is_some());
        assert!(result.state(&ProgramPoint::vertex_only(3)).is_none());
    }
}
