//! Arbitrary-precision integer bounds and ranges.
//!
//! `Range` is the value abstraction shared by every numeric query: it may be
//! unbounded on either side. `FiniteRange` is always closed and bounded, and
//! keys the range tree.

mod bound;
mod finite_range;
mod range;

pub use self::bound::Bound;
pub use self::finite_range::FiniteRange;
pub use self::range::Range;

use num_bigint::BigInt;
use num_traits::{Signed, Zero};

/// Division rounding towards negative infinity.
pub fn div_floor(a: &BigInt, b: &BigInt) -> BigInt {
    let q = a / b;
    let r = a % b;
    if !r.is_zero() && (r.is_negative() != b.is_negative()) {
        q - 1
    } else {
        q
    }
}

/// Division rounding towards positive infinity.
pub fn div_ceil(a: &BigInt, b: &BigInt) -> BigInt {
    let q = a / b;
    let r = a % b;
    if !r.is_zero() && (r.is_negative() == b.is_negative()) {
        q + 1
    } else {
        q
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounding_division() {
        let b = |v: i64| BigInt::from(v);
        assert_eq!(div_floor(&b(7), &b(2)), b(3));
        assert_eq!(div_floor(&b(-7), &b(2)), b(-4));
        assert_eq!(div_floor(&b(7), &b(-2)), b(-4));
        assert_eq!(div_floor(&b(-8), &b(2)), b(-4));
        assert_eq!(div_ceil(&b(7), &b(2)), b(4));
        assert_eq!(div_ceil(&b(-7), &b(2)), b(-3));
        assert_eq!(div_ceil(&b(-7), &b(-2)), b(4));
        assert_eq!(div_ceil(&b(6), &b(3)), b(2));
    }
}
