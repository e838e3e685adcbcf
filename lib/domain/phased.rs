//! A decision-tree domain that keeps states apart by branch conditions.
//!
//! When a test is evaluated, `Phased` also checks whether the opposite
//! outcome is infeasible. If it is, the opposite outcome is recorded as a
//! guard: a child of the tree node, initially empty. From then on, states
//! that enter the guarded part (for instance, a loop counter growing past
//! its bound after widening) are stored under that guard instead of being
//! merged with the rest. Loop phases stay separated, and re-evaluating the
//! same test later is resolved from the recorded guards without asking the
//! child domain.
//!
//! Each node holds a state for the part of the space where none of its
//! children's guards hold, and each child holds the states where its guard
//! holds. Every state lies on a path of guards from the root, and the tree
//! describes the union, over all states, of the state restricted to that
//! path.

use crate::analysis::WarningsContainer;
use crate::collections::AvlMap;
use crate::domain::{feasible, join_option, Domain, QueryChannel};
use crate::il::{Instruction, Linear, NumVar, Test, TestOp};
use crate::numeric::Range;
use crate::Error;
use log::trace;
use std::fmt;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Phased<D> {
    state: Option<D>,
    children: AvlMap<Test, Phased<D>>,
}

impl<D> Phased<D> {
    pub fn new(state: D) -> Phased<D> {
        Phased {
            state: Some(state),
            children: AvlMap::new(),
        }
    }

    /// A tree without any state.
    pub fn empty() -> Phased<D> {
        Phased {
            state: None,
            children: AvlMap::new(),
        }
    }

    fn leaf(state: Option<D>) -> Phased<D> {
        Phased {
            state,
            children: AvlMap::new(),
        }
    }

    /// The state of this node, outside every child guard.
    pub fn state(&self) -> Option<&D> {
        self.state.as_ref()
    }

    pub fn guards(&self) -> impl Iterator<Item = &Test> {
        self.children.keys()
    }

    pub fn is_reachable(&self) -> bool {
        self.state.is_some() || self.children.values().any(|child| child.is_reachable())
    }

    /// Every state in the tree.
    pub fn states(&self) -> Vec<&D> {
        let mut states = Vec::new();
        self.collect_states(&mut states);
        states
    }

    fn collect_states<'a>(&'a self, states: &mut Vec<&'a D>) {
        if let Some(state) = &self.state {
            states.push(state);
        }
        for child in self.children.values() {
            child.collect_states(states);
        }
    }
}

/// The tests whose infeasibility is recorded when `test` is evaluated.
fn candidates(test: &Test) -> Vec<Test> {
    match test.split_equality() {
        Some((below, above)) => vec![below.not(), above.not()],
        None => vec![test.not()],
    }
}

/// True if no state satisfying `guard` satisfies `test`.
fn contradicts(guard: &Test, test: &Test) -> bool {
    match test.op() {
        TestOp::LessThanOrEqualToZero => *guard == test.not(),
        TestOp::EqualToZero => candidates(test).contains(guard),
        TestOp::NotEqualToZero => false,
    }
}

/// True if every state satisfying `guard` satisfies `test`.
fn implies(guard: &Test, test: &Test) -> bool {
    match test.split_equality() {
        Some((below, above)) if test.op() == TestOp::NotEqualToZero => {
            *guard == below || *guard == above
        }
        _ => guard == test,
    }
}

fn apply_test<D: Domain>(test: &Test, state: &Option<D>) -> Result<Option<D>, Error> {
    match state {
        Some(state) => feasible(state.eval_test(test)),
        None => Ok(None),
    }
}

impl<D: Domain> Phased<D> {
    pub fn child(&self, guard: &Test) -> Option<&Phased<D>> {
        self.children.get(guard)
    }

    /// The node state is known to satisfy `test`, from the guards recorded
    /// here. A node state lies outside of all of its children's guards.
    ///
    /// For `e != 0` one recorded side is enough: outside of `e >= 0` or
    /// outside of `e <= 0`, `e` cannot be zero.
    fn recorded_implies(&self, test: &Test) -> bool {
        let mut recorded = candidates(test)
            .into_iter()
            .map(|candidate| self.children.contains_key(&candidate));
        match test.op() {
            TestOp::NotEqualToZero => recorded.any(|found| found),
            TestOp::EqualToZero | TestOp::LessThanOrEqualToZero => recorded.all(|found| found),
        }
    }

    /// The node state is known to violate `test`.
    fn recorded_refutes(&self, test: &Test) -> bool {
        test.op() == TestOp::LessThanOrEqualToZero && self.children.contains_key(test)
    }

    /// The candidates for `test` that are infeasible in `state` and not yet
    /// recorded.
    fn infeasible_candidates(&self, state: &D, test: &Test) -> Result<Vec<Test>, Error> {
        if feasible(test.is_tautology())? != Some(false) {
            return Ok(Vec::new());
        }
        let mut infeasible = Vec::new();
        for candidate in candidates(test) {
            if self.children.contains_key(&candidate) {
                continue;
            }
            if feasible(state.eval_test(&candidate))?.is_none() {
                infeasible.push(candidate);
            }
        }
        Ok(infeasible)
    }

    fn eval_test_tree(&self, test: &Test) -> Result<Phased<D>, Error> {
        let mut children = self.children.clone();
        let state = match &self.state {
            None => None,
            Some(_) if self.recorded_implies(test) => self.state.clone(),
            Some(_) if self.recorded_refutes(test) => None,
            Some(state) => {
                for candidate in self.infeasible_candidates(state, test)? {
                    trace!("`{}` is infeasible, recording it as a guard", candidate);
                    children = children.insert(candidate, Phased::empty());
                }
                feasible(state.eval_test(test))?
            }
        };

        let mut result = AvlMap::new();
        for (guard, child) in children.iter() {
            let child = if contradicts(guard, test) {
                Phased::empty()
            } else if implies(guard, test) {
                child.clone()
            } else {
                child.eval_test_tree(test)?
            };
            result = result.insert(guard.clone(), child);
        }
        Ok(Phased {
            state,
            children: result,
        })
    }

    fn map_states<F>(&self, f: &F) -> Result<Phased<D>, Error>
    where
        F: Fn(&D) -> Result<Option<D>, Error>,
    {
        let state = match &self.state {
            Some(state) => f(state)?,
            None => None,
        };
        let mut children = AvlMap::new();
        for (guard, child) in self.children.iter() {
            children = children.insert(guard.clone(), child.map_states(f)?);
        }
        Ok(Phased { state, children })
    }

    /// Move every state to the node whose guards it satisfies.
    fn settle(&self) -> Result<Phased<D>, Error> {
        Ok(self.settle_under(None)?.0)
    }

    /// Settle this subtree, returning it restricted to `guard` along with the
    /// part of its states that escaped the guard.
    fn settle_under(&self, guard: Option<&Test>) -> Result<(Phased<D>, Option<D>), Error> {
        let mut pool = self.state.clone();
        let mut settled = Vec::with_capacity(self.children.len());
        for (child_guard, child) in self.children.iter() {
            let (child, escaped) = child.settle_under(Some(child_guard))?;
            pool = join_option(pool, escaped)?;
            settled.push((child_guard, child));
        }

        let mut state = pool.clone();
        let mut children = AvlMap::new();
        for (child_guard, child) in settled {
            let child = match apply_test(child_guard, &pool)? {
                Some(part) => child.absorb(part)?,
                None => child,
            };
            state = apply_test(&child_guard.not(), &state)?;
            children = children.insert(child_guard.clone(), child);
        }

        let node = Phased { state, children };
        match guard {
            Some(guard) => node.split_by(guard),
            None => Ok((node, None)),
        }
    }

    /// Add `part`, which satisfies the guard of this subtree.
    fn absorb(&self, part: D) -> Result<Phased<D>, Error> {
        let part = Some(part);
        let mut state = part.clone();
        let mut children = AvlMap::new();
        for (guard, child) in self.children.iter() {
            let child = match apply_test(guard, &part)? {
                Some(part) => child.absorb(part)?,
                None => child.clone(),
            };
            state = apply_test(&guard.not(), &state)?;
            children = children.insert(guard.clone(), child);
        }
        Ok(Phased {
            state: join_option(self.state.clone(), state)?,
            children,
        })
    }

    /// Restrict every state of this subtree to `guard`, returning the join of
    /// what does not satisfy it.
    fn split_by(&self, guard: &Test) -> Result<(Phased<D>, Option<D>), Error> {
        let negated = guard.not();
        let state = apply_test(guard, &self.state)?;
        let mut escaped = apply_test(&negated, &self.state)?;
        let mut children = AvlMap::new();
        for (child_guard, child) in self.children.iter() {
            let (child, child_escaped) = child.split_by(guard)?;
            escaped = join_option(escaped, child_escaped)?;
            children = children.insert(child_guard.clone(), child);
        }
        Ok((Phased { state, children }, escaped))
    }

    /// Bring two trees to the same shape. Where only one tree has a guard,
    /// the other tree's state is split by it.
    fn make_compatible(&self, other: &Phased<D>) -> Result<(Phased<D>, Phased<D>), Error> {
        let mut this_state = self.state.clone();
        let mut that_state = other.state.clone();
        let mut this_children = AvlMap::new();
        let mut that_children = AvlMap::new();

        for (guard, this_child) in self.children.iter() {
            let that_child = match other.children.get(guard) {
                Some(that_child) => that_child.clone(),
                None => {
                    let part = apply_test(guard, &that_state)?;
                    that_state = apply_test(&guard.not(), &that_state)?;
                    Phased::leaf(part)
                }
            };
            let (this_child, that_child) = this_child.make_compatible(&that_child)?;
            this_children = this_children.insert(guard.clone(), this_child);
            that_children = that_children.insert(guard.clone(), that_child);
        }

        for (guard, that_child) in other.children.iter() {
            if self.children.contains_key(guard) {
                continue;
            }
            let part = apply_test(guard, &this_state)?;
            this_state = apply_test(&guard.not(), &this_state)?;
            let (this_child, that_child) = Phased::leaf(part).make_compatible(that_child)?;
            this_children = this_children.insert(guard.clone(), this_child);
            that_children = that_children.insert(guard.clone(), that_child);
        }

        Ok((
            Phased {
                state: this_state,
                children: this_children,
            },
            Phased {
                state: that_state,
                children: that_children,
            },
        ))
    }

    /// Combine two trees of the same shape state by state.
    fn zip<F>(&self, other: &Phased<D>, f: &F) -> Result<Phased<D>, Error>
    where
        F: Fn(&D, &D) -> Result<D, Error>,
    {
        let state = match (&self.state, &other.state) {
            (Some(a), Some(b)) => Some(f(a, b)?),
            (Some(a), None) => Some(a.clone()),
            (None, b) => b.clone(),
        };
        let mut children = AvlMap::new();
        for (guard, child) in self.children.iter() {
            let other_child = other.children.get(guard).ok_or_else(|| {
                Error::invariant(format!("decision trees differ at guard `{}`", guard))
            })?;
            children = children.insert(guard.clone(), child.zip(other_child, f)?);
        }
        Ok(Phased { state, children })
    }

    fn subsumes_compatible(&self, other: &Phased<D>) -> Result<bool, Error> {
        match (&self.state, &other.state) {
            (_, None) => {}
            (None, Some(_)) => return Ok(false),
            (Some(a), Some(b)) => {
                if !a.subsumes(b)? {
                    return Ok(false);
                }
            }
        }
        for (guard, child) in self.children.iter() {
            let other_child = other.children.get(guard).ok_or_else(|| {
                Error::invariant(format!("decision trees differ at guard `{}`", guard))
            })?;
            if !child.subsumes_compatible(other_child)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn project_tree(&self, var: &NumVar) -> Result<Phased<D>, Error> {
        let mut state = match &self.state {
            Some(state) => Some(state.project(var)?),
            None => None,
        };
        let mut children = AvlMap::new();
        for (guard, child) in self.children.iter() {
            let child = child.project_tree(var)?;
            if guard.contains(var) {
                state = join_option(state, child.state.clone())?;
                for (grand_guard, grand_child) in child.children.iter() {
                    children = merge_child(&children, grand_guard, grand_child)?;
                }
            } else {
                children = merge_child(&children, guard, &child)?;
            }
        }
        Ok(Phased { state, children })
    }

    fn fmt_indented(&self, f: &mut fmt::Formatter, depth: usize) -> fmt::Result {
        let indent = "  ".repeat(depth);
        match &self.state {
            Some(state) => writeln!(f, "{}{}", indent, state)?,
            None => writeln!(f, "{}<unreachable>", indent)?,
        }
        for (guard, child) in self.children.iter() {
            writeln!(f, "{}if {}:", indent, guard)?;
            child.fmt_indented(f, depth + 1)?;
        }
        Ok(())
    }
}

fn merge_child<D: Domain>(
    children: &AvlMap<Test, Phased<D>>,
    guard: &Test,
    child: &Phased<D>,
) -> Result<AvlMap<Test, Phased<D>>, Error> {
    let merged = match children.get(guard) {
        Some(existing) => existing.join(child)?,
        None => child.clone(),
    };
    Ok(children.insert(guard.clone(), merged))
}

impl<D: Domain> QueryChannel for Phased<D> {
    fn query_range(&self, expr: &Linear) -> Result<Range, Error> {
        let mut result: Option<Range> = None;
        for state in self.states() {
            let range = state.query_range(expr)?;
            result = Some(match result {
                Some(result) => result.join(&range),
                None => range,
            });
        }
        result.ok_or(Error::Unreachable)
    }
}

impl<D: Domain> Domain for Phased<D> {
    fn eval(&self, instruction: &Instruction) -> Result<Phased<D>, Error> {
        let result = match instruction {
            Instruction::Test(test) => self.eval_test_tree(test)?,
            Instruction::Nop => self.clone(),
            _ => self
                .map_states(&|state: &D| feasible(state.eval(instruction)))?
                .settle()?,
        };
        if result.is_reachable() {
            Ok(result)
        } else {
            trace!("`{}` leaves no reachable state", instruction);
            Err(Error::Unreachable)
        }
    }

    fn join(&self, other: &Phased<D>) -> Result<Phased<D>, Error> {
        let (this, that) = self.make_compatible(other)?;
        this.zip(&that, &|a: &D, b: &D| a.join(b))
    }

    fn widen(&self, other: &Phased<D>) -> Result<Phased<D>, Error> {
        let (this, that) = self.make_compatible(other)?;
        this.zip(&that, &|a: &D, b: &D| a.widen(b))?.settle()
    }

    fn subsumes(&self, other: &Phased<D>) -> Result<bool, Error> {
        let (this, that) = self.make_compatible(other)?;
        this.subsumes_compatible(&that)
    }

    fn introduce(&self, var: &NumVar, value: &Range) -> Result<Phased<D>, Error> {
        self.map_states(&|state: &D| state.introduce(var, value).map(Some))
    }

    fn project(&self, var: &NumVar) -> Result<Phased<D>, Error> {
        self.project_tree(var)?.settle()
    }

    fn substitute(&self, from: &NumVar, to: &NumVar) -> Result<Phased<D>, Error> {
        let state = match &self.state {
            Some(state) => Some(state.substitute(from, to)?),
            None => None,
        };
        let mut children = AvlMap::new();
        for (guard, child) in self.children.iter() {
            let guard = guard.substitute(from, to);
            children = merge_child(&children, &guard, &child.substitute(from, to)?)?;
        }
        Ok(Phased { state, children })
    }

    fn warnings(&self) -> WarningsContainer {
        let mut warnings = WarningsContainer::new();
        for state in self.states() {
            warnings.extend(&state.warnings());
        }
        warnings
    }
}

impl<D: Domain> fmt::Display for Phased<D> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.fmt_indented(f, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Intervals;
    use crate::il::{constant, var};

    fn counter(x: &NumVar, range: Range) -> Phased<Intervals> {
        Phased::new(Intervals::new().introduce(x, &range).unwrap())
    }

    fn range_of(tree: &Phased<Intervals>, x: &NumVar) -> Range {
        tree.query_range(&var(x)).unwrap()
    }

    #[test]
    fn infeasible_negation_is_recorded_as_guard() {
        let x = NumVar::fresh("x");
        let tree = counter(&x, Range::finite(0, 5).unwrap());
        let bound = Test::less_or_equal(&var(&x), &constant(9));
        let tested = tree.eval_test(&bound).unwrap();

        assert_eq!(tested.guards().collect::<Vec<_>>(), vec![&bound.not()]);
        assert!(!tested.child(&bound.not()).unwrap().is_reachable());
        assert_eq!(range_of(&tested, &x), Range::finite(0, 5).unwrap());
    }

    #[test]
    fn feasible_negation_is_not_recorded() {
        let x = NumVar::fresh("x");
        let tree = counter(&x, Range::finite(0, 20).unwrap());
        let tested = tree
            .eval_test(&Test::less_or_equal(&var(&x), &constant(9)))
            .unwrap();
        assert_eq!(tested.guards().count(), 0);
        assert_eq!(range_of(&tested, &x), Range::finite(0, 9).unwrap());
    }

    #[test]
    fn repeated_test_is_stable() {
        let x = NumVar::fresh("x");
        let cases = vec![
            (
                Range::finite(0, 5).unwrap(),
                Test::less_or_equal(&var(&x), &constant(9)),
            ),
            (Range::constant(3), Test::equal(&var(&x), &constant(3))),
            (
                Range::finite(0, 5).unwrap(),
                Test::not_equal(&var(&x), &constant(7)),
            ),
        ];
        for (range, test) in cases {
            let once = counter(&x, range).eval_test(&test).unwrap();
            let twice = once.eval_test(&test).unwrap();
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn infeasible_test_is_unreachable() {
        let x = NumVar::fresh("x");
        let tree = counter(&x, Range::finite(0, 5).unwrap());
        let result = tree.eval_test(&Test::less_or_equal(&constant(20), &var(&x)));
        assert!(matches!(result, Err(Error::Unreachable)));
    }

    #[test]
    fn widening_separates_loop_phases() {
        let x = NumVar::fresh("x");
        let bound = Test::less_or_equal(&var(&x), &constant(9));
        let exit = bound.not();

        let entry = counter(&x, Range::constant(0)).eval_test(&bound).unwrap();
        let next = counter(&x, Range::finite(0, 1).unwrap())
            .eval_test(&bound)
            .unwrap();
        let widened = entry.widen(&next).unwrap();

        // The node keeps the states inside the loop bound, the recorded
        // guard receives the ones beyond it.
        assert_eq!(
            widened.state().unwrap().range(&x),
            Some(&Range::finite(0, 9).unwrap())
        );
        let beyond = widened.child(&exit).unwrap().state().unwrap();
        assert_eq!(beyond.range(&x), Some(&Range::at_least(10)));
        assert_eq!(range_of(&widened, &x), Range::at_least(0));

        let inside = widened.eval_test(&bound).unwrap();
        assert_eq!(range_of(&inside, &x), Range::finite(0, 9).unwrap());
        let outside = widened.eval_test(&exit).unwrap();
        assert_eq!(range_of(&outside, &x), Range::at_least(10));
    }

    #[test]
    fn assignment_moves_states_across_guards() {
        let x = NumVar::fresh("x");
        let bound = Test::less_or_equal(&var(&x), &constant(9));
        let tree = counter(&x, Range::finite(0, 5).unwrap())
            .eval_test(&bound)
            .unwrap();
        let shifted = tree
            .eval(&Instruction::assign(x.clone(), var(&x).add_constant(8)))
            .unwrap();

        assert_eq!(
            shifted.state().unwrap().range(&x),
            Some(&Range::finite(8, 9).unwrap())
        );
        let beyond = shifted.child(&bound.not()).unwrap().state().unwrap();
        assert_eq!(beyond.range(&x), Some(&Range::finite(10, 13).unwrap()));
    }

    #[test]
    fn join_splits_the_side_without_the_guard() {
        let x = NumVar::fresh("x");
        let bound = Test::less_or_equal(&var(&x), &constant(9));
        let low = counter(&x, Range::finite(0, 5).unwrap())
            .eval_test(&bound)
            .unwrap();
        let high = counter(&x, Range::finite(20, 30).unwrap());

        let joined = low.join(&high).unwrap();
        assert_eq!(
            joined.state().unwrap().range(&x),
            Some(&Range::finite(0, 5).unwrap())
        );
        let beyond = joined.child(&bound.not()).unwrap().state().unwrap();
        assert_eq!(beyond.range(&x), Some(&Range::finite(20, 30).unwrap()));

        assert!(joined.subsumes(&low).unwrap());
        assert!(joined.subsumes(&high).unwrap());
        assert!(!low.subsumes(&high).unwrap());
    }

    #[test]
    fn project_drops_guards_over_the_variable() {
        let x = NumVar::fresh("x");
        let y = NumVar::fresh("y");
        let tree = Phased::new(
            Intervals::new()
                .introduce(&x, &Range::finite(0, 5).unwrap())
                .unwrap()
                .introduce(&y, &Range::constant(1))
                .unwrap(),
        )
        .eval_test(&Test::less_or_equal(&var(&x), &constant(9)))
        .unwrap();

        let projected = tree.project(&x).unwrap();
        assert_eq!(projected.guards().count(), 0);
        assert_eq!(range_of(&projected, &y), Range::constant(1));
    }

    #[test]
    fn substitute_renames_guards() {
        let x = NumVar::fresh("x");
        let z = NumVar::fresh("z");
        let bound = Test::less_or_equal(&var(&x), &constant(9));
        let tree = counter(&x, Range::finite(0, 5).unwrap())
            .eval_test(&bound)
            .unwrap();
        let renamed = tree.substitute(&x, &z).unwrap();
        assert!(renamed.child(&bound.substitute(&x, &z).not()).is_some());
        assert_eq!(range_of(&renamed, &z), Range::finite(0, 5).unwrap());
    }

    #[test]
    fn query_of_empty_tree_is_unreachable() {
        let tree: Phased<Intervals> = Phased::empty();
        assert!(matches!(
            tree.query_range(&constant(0)),
            Err(Error::Unreachable)
        ));
    }
}
