use crate::numeric::{div_ceil, div_floor, Bound};
use num_bigint::BigInt;
use num_traits::{One, Signed, Zero};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A non-empty interval of integers, possibly unbounded on either side.
///
/// Empty ranges are never constructed. Operations that may produce one, such
/// as `meet`, return `Option<Range>` instead.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Range {
    low: Bound,
    high: Bound,
}

impl Range {
    /// Create a range from two bounds. Returns `None` if the range is empty.
    pub fn new(low: Bound, high: Bound) -> Option<Range> {
        if low == Bound::PosInf || high == Bound::NegInf || low > high {
            None
        } else {
            Some(Range { low, high })
        }
    }

    pub fn top() -> Range {
        Range {
            low: Bound::NegInf,
            high: Bound::PosInf,
        }
    }

    pub fn constant<I: Into<BigInt>>(value: I) -> Range {
        let value = value.into();
        Range {
            low: Bound::Finite(value.clone()),
            high: Bound::Finite(value),
        }
    }

    /// The finite range `[low, high]`. Returns `None` if `low > high`.
    pub fn finite<I: Into<BigInt>>(low: I, high: I) -> Option<Range> {
        Range::new(Bound::Finite(low.into()), Bound::Finite(high.into()))
    }

    /// `[low, +oo]`
    pub fn at_least<I: Into<BigInt>>(low: I) -> Range {
        Range {
            low: Bound::Finite(low.into()),
            high: Bound::PosInf,
        }
    }

    /// `[-oo, high]`
    pub fn at_most<I: Into<BigInt>>(high: I) -> Range {
        Range {
            low: Bound::NegInf,
            high: Bound::Finite(high.into()),
        }
    }

    pub fn low(&self) -> &Bound {
        &self.low
    }

    pub fn high(&self) -> &Bound {
        &self.high
    }

    pub fn is_top(&self) -> bool {
        self.low == Bound::NegInf && self.high == Bound::PosInf
    }

    pub fn is_finite(&self) -> bool {
        self.low.is_finite() && self.high.is_finite()
    }

    /// If this range holds exactly one value, return it.
    pub fn is_constant(&self) -> Option<&BigInt> {
        match (&self.low, &self.high) {
            (Bound::Finite(low), Bound::Finite(high)) if low == high => Some(low),
            _ => None,
        }
    }

    pub fn contains(&self, value: &BigInt) -> bool {
        let value = Bound::Finite(value.clone());
        self.low <= value && value <= self.high
    }

    pub fn contains_zero(&self) -> bool {
        self.contains(&BigInt::zero())
    }

    /// True if every value of `self` is in `other`.
    pub fn is_subset_of(&self, other: &Range) -> bool {
        other.low <= self.low && self.high <= other.high
    }

    pub fn join(&self, other: &Range) -> Range {
        Range {
            low: self.low.clone().min(other.low.clone()),
            high: self.high.clone().max(other.high.clone()),
        }
    }

    pub fn meet(&self, other: &Range) -> Option<Range> {
        Range::new(
            self.low.clone().max(other.low.clone()),
            self.high.clone().min(other.high.clone()),
        )
    }

    /// Standard interval widening: a bound that moved in `next` goes to infinity.
    pub fn widen(&self, next: &Range) -> Range {
        let low = if next.low < self.low {
            Bound::NegInf
        } else {
            self.low.clone()
        };
        let high = if next.high > self.high {
            Bound::PosInf
        } else {
            self.high.clone()
        };
        Range { low, high }
    }

    pub fn add(&self, other: &Range) -> Range {
        Range {
            low: self.low.add(&other.low),
            high: self.high.add(&other.high),
        }
    }

    pub fn add_constant(&self, constant: &BigInt) -> Range {
        self.add(&Range::constant(constant.clone()))
    }

    pub fn neg(&self) -> Range {
        Range {
            low: self.high.neg(),
            high: self.low.neg(),
        }
    }

    pub fn sub(&self, other: &Range) -> Range {
        self.add(&other.neg())
    }

    pub fn mul_constant(&self, constant: &BigInt) -> Range {
        let a = self.low.mul_constant(constant);
        let b = self.high.mul_constant(constant);
        if constant.is_negative() {
            Range { low: b, high: a }
        } else {
            Range { low: a, high: b }
        }
    }

    pub fn mul(&self, other: &Range) -> Range {
        let products = [
            self.low.mul(&other.low),
            self.low.mul(&other.high),
            self.high.mul(&other.low),
            self.high.mul(&other.high),
        ];
        let low = products.iter().min().cloned().unwrap_or(Bound::NegInf);
        let high = products.iter().max().cloned().unwrap_or(Bound::PosInf);
        Range { low, high }
    }

    /// Truncating division by a non-zero constant. Returns top when dividing
    /// by zero.
    pub fn div_constant(&self, divisor: &BigInt) -> Range {
        if divisor.is_zero() {
            return Range::top();
        }
        let div = |bound: &Bound| match bound {
            Bound::Finite(value) => Bound::Finite(value / divisor),
            infinite if divisor.is_negative() => infinite.neg(),
            infinite => infinite.clone(),
        };
        let a = div(&self.low);
        let b = div(&self.high);
        if divisor.is_negative() {
            Range { low: b, high: a }
        } else {
            Range { low: a, high: b }
        }
    }

    /// The values `x` with `divisor * x` in this range, or `None` if there are
    /// none. The result is the tightest range that contains every such `x`.
    pub fn div_round_inwards(&self, divisor: &BigInt) -> Option<Range> {
        if divisor.is_zero() {
            return if self.contains_zero() {
                Some(Range::top())
            } else {
                None
            };
        }
        let range = if divisor.is_negative() {
            self.neg()
        } else {
            self.clone()
        };
        let divisor = divisor.abs();
        let low = match &range.low {
            Bound::Finite(value) => Bound::Finite(div_ceil(value, &divisor)),
            infinite => infinite.clone(),
        };
        let high = match &range.high {
            Bound::Finite(value) => Bound::Finite(div_floor(value, &divisor)),
            infinite => infinite.clone(),
        };
        Range::new(low, high)
    }

    /// Remainder by a constant, with the sign of the dividend.
    pub fn rem_constant(&self, divisor: &BigInt) -> Range {
        if divisor.is_zero() {
            return Range::top();
        }
        let max = divisor.abs() - BigInt::one();
        let low = if self.low >= Bound::Finite(BigInt::zero()) {
            BigInt::zero()
        } else {
            -max.clone()
        };
        let high = if self.high <= Bound::Finite(BigInt::zero()) {
            BigInt::zero()
        } else {
            max
        };
        Range {
            low: Bound::Finite(low),
            high: Bound::Finite(high),
        }
    }
}

impl From<i64> for Range {
    fn from(value: i64) -> Range {
        Range::constant(value)
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.is_constant() {
            Some(value) => write!(f, "[{}]", value),
            None => write!(f, "[{}, {}]", self.low, self.high),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(low: i64, high: i64) -> Range {
        Range::finite(low, high).unwrap()
    }

    #[test]
    fn construction() {
        assert!(Range::finite(3, 2).is_none());
        assert!(Range::new(Bound::PosInf, Bound::PosInf).is_none());
        assert_eq!(Range::constant(5).is_constant(), Some(&BigInt::from(5)));
        assert!(Range::top().is_top());
        assert_eq!(format!("{}", Range::at_least(3)), "[3, +oo]");
        assert_eq!(format!("{}", Range::constant(-2)), "[-2]");
    }

    #[test]
    fn lattice() {
        assert_eq!(range(0, 3).join(&range(5, 8)), range(0, 8));
        assert_eq!(range(0, 5).meet(&range(3, 8)), Some(range(3, 5)));
        assert_eq!(range(0, 2).meet(&range(3, 8)), None);
        assert!(range(1, 2).is_subset_of(&range(0, 3)));
        assert!(!range(1, 4).is_subset_of(&range(0, 3)));
        assert!(range(1, 4).is_subset_of(&Range::top()));
        assert_eq!(range(0, 1).widen(&range(0, 2)), Range::at_least(0));
        assert_eq!(range(0, 1).widen(&range(-1, 1)), Range::at_most(1));
        assert_eq!(range(0, 1).widen(&range(0, 1)), range(0, 1));
    }

    #[test]
    fn arithmetic() {
        assert_eq!(range(1, 2).add(&range(10, 20)), range(11, 22));
        assert_eq!(range(1, 2).sub(&range(10, 20)), range(-19, -8));
        assert_eq!(range(1, 2).mul_constant(&BigInt::from(-3)), range(-6, -3));
        assert_eq!(range(-1, 2).mul(&range(3, 4)), range(-4, 8));
        assert_eq!(
            Range::at_least(1).mul(&range(-1, 1)),
            Range::top()
        );
        assert_eq!(range(-7, 7).div_constant(&BigInt::from(2)), range(-3, 3));
        assert_eq!(range(5, 9).rem_constant(&BigInt::from(4)), range(0, 3));
    }

    #[test]
    fn division_rounds_inwards() {
        // 3x in [1, 7] => x in [1, 2]
        assert_eq!(range(1, 7).div_round_inwards(&BigInt::from(3)), Some(range(1, 2)));
        // -2x in [1, 7] => x in [-3, -1]
        assert_eq!(range(1, 7).div_round_inwards(&BigInt::from(-2)), Some(range(-3, -1)));
        // 4x in [1, 3] has no integer solution
        assert_eq!(range(1, 3).div_round_inwards(&BigInt::from(4)), None);
        assert_eq!(
            Range::at_most(-1).div_round_inwards(&BigInt::from(2)),
            Some(Range::at_most(-1))
        );
    }
}
