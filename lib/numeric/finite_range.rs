use crate::numeric::{Bound, Range};
use num_bigint::BigInt;
use num_traits::One;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A closed, bounded range `[low, high]`, ordered by `low` and then `high`.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct FiniteRange {
    low: BigInt,
    high: BigInt,
}

impl FiniteRange {
    /// Create a new `FiniteRange`. Returns `None` if `low > high`.
    pub fn new<I: Into<BigInt>>(low: I, high: I) -> Option<FiniteRange> {
        let (low, high) = (low.into(), high.into());
        if low > high {
            None
        } else {
            Some(FiniteRange { low, high })
        }
    }

    /// The `size` bytes starting at `start`. Returns `None` for `size == 0`.
    pub fn span<I: Into<BigInt>>(start: I, size: u64) -> Option<FiniteRange> {
        let low = start.into();
        if size == 0 {
            return None;
        }
        let high = &low + BigInt::from(size) - BigInt::one();
        Some(FiniteRange { low, high })
    }

    pub fn low(&self) -> &BigInt {
        &self.low
    }

    pub fn high(&self) -> &BigInt {
        &self.high
    }

    pub fn overlaps(&self, other: &FiniteRange) -> bool {
        self.low <= other.high && other.low <= self.high
    }

    /// True if `other` lies completely inside this range.
    pub fn contains(&self, other: &FiniteRange) -> bool {
        self.low <= other.low && other.high <= self.high
    }

    pub fn contains_value(&self, value: &BigInt) -> bool {
        &self.low <= value && value <= &self.high
    }

    /// The range as a possibly-infinite `Range`.
    pub fn to_range(&self) -> Range {
        Range::new(
            Bound::Finite(self.low.clone()),
            Bound::Finite(self.high.clone()),
        )
        .unwrap_or_else(Range::top)
    }

    /// The range, if `range` has two finite bounds.
    pub fn from_range(range: &Range) -> Option<FiniteRange> {
        match (range.low(), range.high()) {
            (Bound::Finite(low), Bound::Finite(high)) => FiniteRange::new(low.clone(), high.clone()),
            _ => None,
        }
    }
}

impl fmt::Display for FiniteRange {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{}, {}]", self.low, self.high)
    }
}
