use crate::il::{Linear, NumVar};
use crate::Error;
use num_traits::{Signed, Zero};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The comparison a `Test` makes between its expression and zero.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum TestOp {
    EqualToZero,
    NotEqualToZero,
    LessThanOrEqualToZero,
}

/// A branch condition `expr op 0`.
///
/// Tests are ordered by operator and then by expression, and two tests over
/// equal expressions are equal. They key the children of a decision tree.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Test {
    op: TestOp,
    expr: Linear,
}

impl Test {
    pub fn new(op: TestOp, expr: Linear) -> Test {
        Test { op, expr }
    }

    /// `expr = 0`
    pub fn equal_to_zero(expr: Linear) -> Test {
        Test::new(TestOp::EqualToZero, expr)
    }

    /// `expr != 0`
    pub fn not_equal_to_zero(expr: Linear) -> Test {
        Test::new(TestOp::NotEqualToZero, expr)
    }

    /// `expr <= 0`
    pub fn less_than_or_equal_to_zero(expr: Linear) -> Test {
        Test::new(TestOp::LessThanOrEqualToZero, expr)
    }

    /// `left = right`
    pub fn equal(left: &Linear, right: &Linear) -> Test {
        Test::equal_to_zero(left.sub(right))
    }

    /// `left != right`
    pub fn not_equal(left: &Linear, right: &Linear) -> Test {
        Test::not_equal_to_zero(left.sub(right))
    }

    /// `left <= right`
    pub fn less_or_equal(left: &Linear, right: &Linear) -> Test {
        Test::less_than_or_equal_to_zero(left.sub(right))
    }

    /// `left < right`, which over the integers is `left - right + 1 <= 0`.
    pub fn less_than(left: &Linear, right: &Linear) -> Test {
        Test::less_than_or_equal_to_zero(left.sub(right).add_constant(1))
    }

    pub fn op(&self) -> TestOp {
        self.op
    }

    pub fn expr(&self) -> &Linear {
        &self.expr
    }

    /// The negation of this test. For `e <= 0` this is `1 - e <= 0`.
    pub fn not(&self) -> Test {
        match self.op {
            TestOp::EqualToZero => Test::not_equal_to_zero(self.expr.clone()),
            TestOp::NotEqualToZero => Test::equal_to_zero(self.expr.clone()),
            TestOp::LessThanOrEqualToZero => {
                Test::less_than_or_equal_to_zero(self.expr.negate().add_constant(1))
            }
        }
    }

    /// Split an equality or disequality into two directional tests.
    ///
    /// `e = 0` yields `e <= 0` and `-e <= 0`, which together are equivalent
    /// to it. `e != 0` yields `e + 1 <= 0` and `-e + 1 <= 0`, either of which
    /// implies it. Returns `None` for `<=` tests.
    pub fn split_equality(&self) -> Option<(Test, Test)> {
        let offset = match self.op {
            TestOp::EqualToZero => 0,
            TestOp::NotEqualToZero => 1,
            TestOp::LessThanOrEqualToZero => return None,
        };
        Some((
            Test::less_than_or_equal_to_zero(self.expr.add_constant(offset)),
            Test::less_than_or_equal_to_zero(self.expr.negate().add_constant(offset)),
        ))
    }

    /// Decide a test over a constant expression.
    ///
    /// Returns `Ok(true)` if the test holds, `Err(Error::Unreachable)` if it
    /// cannot hold, and `Ok(false)` if the test mentions variables.
    pub fn is_tautology(&self) -> Result<bool, Error> {
        if !self.expr.is_constant_only() {
            return Ok(false);
        }
        let value = self.expr.constant_value();
        let holds = match self.op {
            TestOp::EqualToZero => value.is_zero(),
            TestOp::NotEqualToZero => !value.is_zero(),
            TestOp::LessThanOrEqualToZero => !value.is_positive(),
        };
        if holds {
            Ok(true)
        } else {
            Err(Error::Unreachable)
        }
    }

    pub fn vars(&self) -> impl Iterator<Item = &NumVar> {
        self.expr.vars()
    }

    pub fn contains(&self, var: &NumVar) -> bool {
        self.expr.contains(var)
    }

    /// Rename `from` to `to`.
    pub fn substitute(&self, from: &NumVar, to: &NumVar) -> Test {
        Test::new(self.op, self.expr.substitute(from, to))
    }
}

impl fmt::Display for TestOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TestOp::EqualToZero => write!(f, "="),
            TestOp::NotEqualToZero => write!(f, "!="),
            TestOp::LessThanOrEqualToZero => write!(f, "<="),
        }
    }
}

impl fmt::Display for Test {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {} 0", self.expr, self.op)
    }
}
