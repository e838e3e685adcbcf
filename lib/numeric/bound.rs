use num_bigint::BigInt;
use num_traits::{Signed, Zero};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// One end of a `Range`.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum Bound {
    NegInf,
    Finite(BigInt),
    PosInf,
}

impl Bound {
    pub fn finite<I: Into<BigInt>>(value: I) -> Bound {
        Bound::Finite(value.into())
    }

    pub fn value(&self) -> Option<&BigInt> {
        match self {
            Bound::Finite(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_finite(&self) -> bool {
        matches!(self, Bound::Finite(_))
    }

    /// Adds two bounds. Opposite infinities never meet in range arithmetic,
    /// as lower bounds are only added to lower bounds.
    pub fn add(&self, other: &Bound) -> Bound {
        match (self, other) {
            (Bound::Finite(a), Bound::Finite(b)) => Bound::Finite(a + b),
            (Bound::Finite(_), infinite) | (infinite, _) => infinite.clone(),
        }
    }

    pub fn neg(&self) -> Bound {
        match self {
            Bound::NegInf => Bound::PosInf,
            Bound::Finite(value) => Bound::Finite(-value),
            Bound::PosInf => Bound::NegInf,
        }
    }

    pub fn mul_constant(&self, constant: &BigInt) -> Bound {
        if constant.is_zero() {
            return Bound::Finite(BigInt::zero());
        }
        match self {
            Bound::Finite(value) => Bound::Finite(value * constant),
            infinite if constant.is_negative() => infinite.neg(),
            infinite => infinite.clone(),
        }
    }

    /// Product of two bounds, with `0 * inf = 0`.
    pub fn mul(&self, other: &Bound) -> Bound {
        match (self, other) {
            (Bound::Finite(a), b) => b.mul_constant(a),
            (a, Bound::Finite(b)) => a.mul_constant(b),
            (a, b) if a == b => Bound::PosInf,
            _ => Bound::NegInf,
        }
    }
}

impl Ord for Bound {
    fn cmp(&self, other: &Bound) -> Ordering {
        match (self, other) {
            (Bound::NegInf, Bound::NegInf) | (Bound::PosInf, Bound::PosInf) => Ordering::Equal,
            (Bound::NegInf, _) | (_, Bound::PosInf) => Ordering::Less,
            (_, Bound::NegInf) | (Bound::PosInf, _) => Ordering::Greater,
            (Bound::Finite(a), Bound::Finite(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for Bound {
    fn partial_cmp(&self, other: &Bound) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<BigInt> for Bound {
    fn from(value: BigInt) -> Bound {
        Bound::Finite(value)
    }
}

impl From<i64> for Bound {
    fn from(value: i64) -> Bound {
        Bound::Finite(value.into())
    }
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Bound::NegInf => write!(f, "-oo"),
            Bound::Finite(value) => write!(f, "{}", value),
            Bound::PosInf => write!(f, "+oo"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering() {
        assert!(Bound::NegInf < Bound::finite(-1000));
        assert!(Bound::finite(3) < Bound::finite(4));
        assert!(Bound::finite(1000) < Bound::PosInf);
        assert_eq!(Bound::PosInf.cmp(&Bound::PosInf), Ordering::Equal);
    }

    #[test]
    fn arithmetic() {
        assert_eq!(Bound::finite(3).add(&Bound::finite(4)), Bound::finite(7));
        assert_eq!(Bound::finite(3).add(&Bound::PosInf), Bound::PosInf);
        assert_eq!(Bound::NegInf.mul_constant(&BigInt::from(-2)), Bound::PosInf);
        assert_eq!(Bound::PosInf.mul_constant(&BigInt::zero()), Bound::finite(0));
        assert_eq!(Bound::NegInf.mul(&Bound::NegInf), Bound::PosInf);
        assert_eq!(Bound::NegInf.mul(&Bound::PosInf), Bound::NegInf);
    }
}
