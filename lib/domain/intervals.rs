//! A non-relational numeric domain over integer ranges.

use crate::collections::AvlMap;
use crate::domain::{feasible, Domain, QueryChannel};
use crate::il::{BinOp, Instruction, Linear, NumVar, Rhs, Test, TestOp};
use crate::numeric::{Bound, Range};
use crate::Error;
use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};
use std::fmt;

/// Largest shift amount evaluated precisely.
const MAX_SHIFT: u32 = 128;

/// Maps every known variable to the range of values it may hold.
///
/// Reading a variable the state does not know is a defect and fails with
/// `Error::UnknownVariable`. Assignments introduce their destination.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Intervals {
    ranges: AvlMap<NumVar, Range>,
}

impl Intervals {
    pub fn new() -> Intervals {
        Intervals {
            ranges: AvlMap::new(),
        }
    }

    pub fn range(&self, var: &NumVar) -> Option<&Range> {
        self.ranges.get(var)
    }

    pub fn vars(&self) -> impl Iterator<Item = &NumVar> {
        self.ranges.keys()
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    fn lookup(&self, var: &NumVar) -> Result<&Range, Error> {
        self.ranges
            .get(var)
            .ok_or_else(|| Error::UnknownVariable { var: var.clone() })
    }

    fn with_range(&self, var: NumVar, range: Range) -> Intervals {
        Intervals {
            ranges: self.ranges.insert(var, range),
        }
    }

    /// Evaluate an affine expression to a range.
    pub fn eval_linear(&self, linear: &Linear) -> Result<Range, Error> {
        let mut result = Range::constant(linear.constant_value().clone());
        for term in linear.terms() {
            let range = self.lookup(term.var())?;
            result = result.add(&range.mul_constant(term.coeff()));
        }
        Ok(result)
    }

    fn eval_binary(&self, op: BinOp, left: &Linear, right: &Linear) -> Result<Range, Error> {
        let lhs = self.eval_linear(left)?;
        let rhs = self.eval_linear(right)?;
        Ok(match op {
            BinOp::Mul => lhs.mul(&rhs),
            BinOp::Div => match rhs.is_constant() {
                Some(divisor) if !divisor.is_zero() => lhs.div_constant(divisor),
                _ => Range::top(),
            },
            BinOp::Rem => match rhs.is_constant() {
                Some(divisor) if !divisor.is_zero() => lhs.rem_constant(divisor),
                _ => Range::top(),
            },
            BinOp::Shl => match shift_amount(&rhs) {
                Some(amount) => lhs.mul_constant(&(BigInt::from(1) << amount)),
                None => Range::top(),
            },
            BinOp::Shr => match shift_amount(&rhs) {
                Some(amount) if lhs.low() >= &Bound::finite(0) => {
                    lhs.div_constant(&(BigInt::from(1) << amount))
                }
                _ => Range::top(),
            },
        })
    }

    fn eval_rhs(&self, rhs: &Rhs) -> Result<Range, Error> {
        match rhs {
            Rhs::Linear(linear) => self.eval_linear(linear),
            Rhs::Range(range) => Ok(range.clone()),
            Rhs::Binary { op, left, right } => self.eval_binary(*op, left, right),
        }
    }

    fn apply_test(&self, test: &Test) -> Result<Intervals, Error> {
        if test.is_tautology()? {
            return Ok(self.clone());
        }
        match test.op() {
            TestOp::NotEqualToZero => {
                let value = self.eval_linear(test.expr())?;
                if value.is_constant().map(|c| c.is_zero()).unwrap_or(false) {
                    return Err(Error::Unreachable);
                }
                let (below, above) = match test.split_equality() {
                    Some(split) => split,
                    None => return Err(Error::invariant("disequality did not split")),
                };
                let below = feasible(self.apply_test(&below))?;
                let above = feasible(self.apply_test(&above))?;
                match (below, above) {
                    (Some(below), Some(above)) => below.join(&above),
                    (Some(state), None) | (None, Some(state)) => Ok(state),
                    (None, None) => Err(Error::Unreachable),
                }
            }
            TestOp::EqualToZero => self.narrow(test.expr(), &Range::constant(0)),
            TestOp::LessThanOrEqualToZero => self.narrow(test.expr(), &Range::at_most(0)),
        }
    }

    /// Restrict every variable of `expr` so that `expr` may lie in `target`.
    fn narrow(&self, expr: &Linear, target: &Range) -> Result<Intervals, Error> {
        let value = self.eval_linear(expr)?;
        if value.meet(target).is_none() {
            return Err(Error::Unreachable);
        }
        let mut ranges = self.ranges.clone();
        for term in expr.terms() {
            // coeff * var = target - rest
            let rest = self.eval_linear(&expr.drop_term(term.var()))?;
            let scaled = target.sub(&rest);
            let allowed = scaled
                .div_round_inwards(term.coeff())
                .ok_or(Error::Unreachable)?;
            let current = self.lookup(term.var())?;
            let narrowed = current.meet(&allowed).ok_or(Error::Unreachable)?;
            ranges = ranges.insert(term.var().clone(), narrowed);
        }
        Ok(Intervals { ranges })
    }

    /// Combine two states variable-wise. Variables known to only one side
    /// become unconstrained.
    fn combine<F>(&self, other: &Intervals, f: F) -> Intervals
    where
        F: Fn(&Range, &Range) -> Range,
    {
        if self.ranges.ptr_eq(&other.ranges) {
            return self.clone();
        }
        let mut ranges = AvlMap::new();
        for (var, range) in self.ranges.iter() {
            let combined = match other.ranges.get(var) {
                Some(other_range) => f(range, other_range),
                None => Range::top(),
            };
            ranges = ranges.insert(var.clone(), combined);
        }
        for (var, _) in other.ranges.iter() {
            if !self.ranges.contains_key(var) {
                ranges = ranges.insert(var.clone(), Range::top());
            }
        }
        Intervals { ranges }
    }
}

fn shift_amount(range: &Range) -> Option<u32> {
    range
        .is_constant()
        .filter(|amount| !amount.is_negative())
        .and_then(|amount| amount.to_u32())
        .filter(|amount| *amount <= MAX_SHIFT)
}

impl QueryChannel for Intervals {
    fn query_range(&self, expr: &Linear) -> Result<Range, Error> {
        self.eval_linear(expr)
    }
}

impl Domain for Intervals {
    fn eval(&self, instruction: &Instruction) -> Result<Intervals, Error> {
        match instruction {
            Instruction::Assign { dst, src } => {
                let range = self.eval_rhs(src)?;
                Ok(self.with_range(dst.clone(), range))
            }
            Instruction::Test(test) => self.apply_test(test),
            Instruction::Load { .. } | Instruction::Store { .. } => Err(Error::unimplemented(
                format!("Intervals cannot evaluate memory access `{}`", instruction),
            )),
            Instruction::Nop => Ok(self.clone()),
        }
    }

    fn join(&self, other: &Intervals) -> Result<Intervals, Error> {
        Ok(self.combine(other, |a, b| a.join(b)))
    }

    fn widen(&self, other: &Intervals) -> Result<Intervals, Error> {
        Ok(self.combine(other, |a, b| a.widen(b)))
    }

    fn subsumes(&self, other: &Intervals) -> Result<bool, Error> {
        if self.ranges.ptr_eq(&other.ranges) {
            return Ok(true);
        }
        for (var, range) in self.ranges.iter() {
            match other.ranges.get(var) {
                Some(other_range) => {
                    if !other_range.is_subset_of(range) {
                        return Ok(false);
                    }
                }
                None => {
                    if !range.is_top() {
                        return Ok(false);
                    }
                }
            }
        }
        Ok(other.ranges.keys().all(|var| self.ranges.contains_key(var)))
    }

    fn introduce(&self, var: &NumVar, value: &Range) -> Result<Intervals, Error> {
        Ok(self.with_range(var.clone(), value.clone()))
    }

    fn project(&self, var: &NumVar) -> Result<Intervals, Error> {
        Ok(Intervals {
            ranges: self.ranges.remove(var),
        })
    }

    fn substitute(&self, from: &NumVar, to: &NumVar) -> Result<Intervals, Error> {
        if from == to {
            return Ok(self.clone());
        }
        if self.ranges.contains_key(to) {
            return Err(Error::invariant(format!(
                "cannot rename {} to {}, which is already bound",
                from, to
            )));
        }
        let range = self.lookup(from)?.clone();
        Ok(Intervals {
            ranges: self.ranges.remove(from).insert(to.clone(), range),
        })
    }
}

impl fmt::Display for Intervals {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let ranges = self
            .ranges
            .iter()
            .map(|(var, range)| format!("{}: {}", var, range))
            .collect::<Vec<String>>();
        write!(f, "{{{}}}", ranges.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::il::{constant, var};

    fn state(bindings: &[(&NumVar, Range)]) -> Intervals {
        bindings
            .iter()
            .fold(Intervals::new(), |state, (v, range)| {
                state.introduce(v, range).unwrap()
            })
    }

    #[test]
    fn assign_linear() {
        let x = NumVar::fresh("x");
        let y = NumVar::fresh("y");
        let s = state(&[(&x, Range::finite(0, 5).unwrap())]);
        let s = s
            .eval(&Instruction::assign(y.clone(), var(&x).smul(2).add_constant(1)))
            .unwrap();
        assert_eq!(s.range(&y), Some(&Range::finite(1, 11).unwrap()));
    }

    #[test]
    fn unknown_variable_is_a_defect() {
        let x = NumVar::fresh("x");
        let y = NumVar::fresh("y");
        let result = Intervals::new().eval(&Instruction::assign(y, var(&x)));
        assert!(matches!(result, Err(Error::UnknownVariable { .. })));
    }

    #[test]
    fn test_narrows_every_term() {
        let x = NumVar::fresh("x");
        let y = NumVar::fresh("y");
        let s = state(&[
            (&x, Range::finite(0, 10).unwrap()),
            (&y, Range::finite(4, 6).unwrap()),
        ]);
        // x + y <= 8
        let s = s
            .eval_test(&Test::less_or_equal(&var(&x).add(&var(&y)), &constant(8)))
            .unwrap();
        assert_eq!(s.range(&x), Some(&Range::finite(0, 4).unwrap()));
        assert_eq!(s.range(&y), Some(&Range::finite(4, 6).unwrap()));
    }

    #[test]
    fn test_with_coefficients_rounds_inwards() {
        let x = NumVar::fresh("x");
        let s = state(&[(&x, Range::finite(-10, 10).unwrap())]);
        // 3x - 7 <= 0, so x <= 2
        let s = s
            .eval_test(&Test::less_than_or_equal_to_zero(
                var(&x).smul(3).add_constant(-7),
            ))
            .unwrap();
        assert_eq!(s.range(&x), Some(&Range::finite(-10, 2).unwrap()));
    }

    #[test]
    fn infeasible_test_is_unreachable() {
        let x = NumVar::fresh("x");
        let s = state(&[(&x, Range::finite(0, 5).unwrap())]);
        let result = s.eval_test(&Test::less_than(&var(&x), &constant(0)));
        assert!(matches!(result, Err(Error::Unreachable)));
        let result = s.eval_test(&Test::equal(&var(&x), &constant(9)));
        assert!(matches!(result, Err(Error::Unreachable)));
    }

    #[test]
    fn constant_tests() {
        let s = Intervals::new();
        assert_eq!(s.eval_test(&Test::equal_to_zero(constant(0))).unwrap(), s);
        assert!(s.eval_test(&Test::equal_to_zero(constant(1))).is_err());
    }

    #[test]
    fn disequality() {
        let x = NumVar::fresh("x");
        let s = state(&[(&x, Range::finite(0, 5).unwrap())]);
        let ne = s.eval_test(&Test::not_equal(&var(&x), &constant(0))).unwrap();
        assert_eq!(ne.range(&x), Some(&Range::finite(1, 5).unwrap()));
        let ne = s.eval_test(&Test::not_equal(&var(&x), &constant(3))).unwrap();
        assert_eq!(ne.range(&x), Some(&Range::finite(0, 5).unwrap()));

        let zero = state(&[(&x, Range::constant(0))]);
        let result = zero.eval_test(&Test::not_equal(&var(&x), &constant(0)));
        assert!(matches!(result, Err(Error::Unreachable)));
    }

    #[test]
    fn binary_operations() {
        let x = NumVar::fresh("x");
        let y = NumVar::fresh("y");
        let s = state(&[(&x, Range::finite(-3, 9).unwrap())]);
        let eval = |op, right: i64| {
            s.eval(&Instruction::assign_binary(
                y.clone(),
                op,
                var(&x),
                constant(right),
            ))
            .unwrap()
            .range(&y)
            .cloned()
            .unwrap()
        };
        assert_eq!(eval(BinOp::Mul, -2), Range::finite(-18, 6).unwrap());
        assert_eq!(eval(BinOp::Div, 2), Range::finite(-1, 4).unwrap());
        assert_eq!(eval(BinOp::Rem, 4), Range::finite(-3, 3).unwrap());
        assert_eq!(eval(BinOp::Shl, 2), Range::finite(-12, 36).unwrap());
        assert_eq!(eval(BinOp::Shr, 1), Range::top());
        assert_eq!(eval(BinOp::Div, 0), Range::top());
    }

    #[test]
    fn memory_access_is_unimplemented() {
        let x = NumVar::fresh("x");
        let s = state(&[(&x, Range::constant(0))]);
        let result = s.eval(&Instruction::load(x.clone(), 4, var(&x)));
        assert!(matches!(result, Err(Error::UnimplementedOperation { .. })));
    }

    #[test]
    fn join_widen_subsumes() {
        let x = NumVar::fresh("x");
        let y = NumVar::fresh("y");
        let a = state(&[(&x, Range::finite(0, 1).unwrap())]);
        let b = state(&[
            (&x, Range::finite(0, 2).unwrap()),
            (&y, Range::constant(7)),
        ]);

        let joined = a.join(&b).unwrap();
        assert_eq!(joined.range(&x), Some(&Range::finite(0, 2).unwrap()));
        assert_eq!(joined.range(&y), Some(&Range::top()));
        assert!(joined.subsumes(&a).unwrap());
        assert!(joined.subsumes(&b).unwrap());
        assert!(!a.subsumes(&b).unwrap());
        assert!(!b.subsumes(&a).unwrap());

        let widened = a.widen(&joined).unwrap();
        assert_eq!(widened.range(&x), Some(&Range::at_least(0)));
        assert!(widened.subsumes(&joined).unwrap());
    }

    #[test]
    fn project_and_substitute() {
        let x = NumVar::fresh("x");
        let y = NumVar::fresh("y");
        let s = state(&[(&x, Range::constant(4))]);
        let renamed = s.substitute(&x, &y).unwrap();
        assert_eq!(renamed.range(&y), Some(&Range::constant(4)));
        assert_eq!(renamed.range(&x), None);
        assert!(renamed.project(&y).unwrap().is_empty());
        assert!(matches!(
            s.substitute(&NumVar::fresh("z"), &y),
            Err(Error::UnknownVariable { .. })
        ));
        assert!(matches!(
            s.substitute(&x, &x).unwrap().range(&x),
            Some(_)
        ));
    }

    #[test]
    fn display() {
        let x = NumVar::fresh("x");
        let s = state(&[(&x, Range::finite(0, 5).unwrap())]);
        assert_eq!(s.to_string(), "{x: [0, 5]}");
    }
}
