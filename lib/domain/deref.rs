//! Pointer values as seen by the memory domain.
//!
//! A pointer is either absolute, a plain numeric address, or relative to the
//! symbolic start address of a region. Both forms carry a `Linear` offset.
//! The bounds checks below are phrased as tests over that offset, so they
//! work the same way for both forms when given bounds in matching terms.

use crate::domain::{Domain, QueryChannel};
use crate::il::{Linear, MemVar, NumVar, Test};
use crate::numeric::Range;
use crate::Error;
use num_bigint::BigInt;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A pointer, optionally relative to an address variable.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct AbstractPointer {
    addr: Option<NumVar>,
    offset: Linear,
}

impl AbstractPointer {
    /// A pointer with the numeric value `address`.
    pub fn absolute(address: Linear) -> AbstractPointer {
        AbstractPointer {
            addr: None,
            offset: address,
        }
    }

    /// The pointer value `address`, expressed relative to `addr`. The stored
    /// offset is `address - addr`.
    pub fn relative_to(address: &Linear, addr: &NumVar) -> AbstractPointer {
        AbstractPointer {
            addr: Some(addr.clone()),
            offset: address.sub(&Linear::var(addr)),
        }
    }

    pub fn addr_var(&self) -> Option<&NumVar> {
        self.addr.as_ref()
    }

    pub fn offset(&self) -> &Linear {
        &self.offset
    }

    pub fn is_absolute(&self) -> bool {
        self.addr.is_none()
    }

    pub fn add_offset(&self, delta: &Linear) -> AbstractPointer {
        AbstractPointer {
            addr: self.addr.clone(),
            offset: self.offset.add(delta),
        }
    }

    /// The values the offset can take in `state`.
    pub fn get_explicit_offset<Q: QueryChannel>(&self, state: &Q) -> Result<Range, Error> {
        state.query_range(&self.offset)
    }

    /// The part of `state` where the offset is below `lower`.
    ///
    /// Fails with `Error::Unreachable` if the access cannot underflow.
    pub fn calc_below_access<D: Domain>(&self, state: &D, lower: &Linear) -> Result<D, Error> {
        state.eval_test(&Test::less_than(&self.offset, lower))
    }

    /// The part of `state` where the offset is at or above `upper`.
    ///
    /// Fails with `Error::Unreachable` if the access cannot overflow.
    pub fn calc_above_access<D: Domain>(&self, state: &D, upper: &Linear) -> Result<D, Error> {
        state.eval_test(&Test::less_or_equal(upper, &self.offset))
    }

    /// The part of `state` where `lower <= offset < upper`.
    pub fn calc_inside_access<D: Domain>(
        &self,
        state: &D,
        lower: &Linear,
        upper: &Linear,
    ) -> Result<D, Error> {
        state
            .eval_test(&Test::less_or_equal(lower, &self.offset))?
            .eval_test(&Test::less_than(&self.offset, upper))
    }

    /// This pointer as an access into `region`, whose first byte has the
    /// same base as this pointer at offset `start`.
    pub fn in_region(&self, region: MemVar, start: &Linear) -> AbstractMemPointer {
        AbstractMemPointer::new(region, DerefOffset::from(self.offset.sub(start)))
    }
}

impl fmt::Display for AbstractPointer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.addr {
            Some(addr) => write!(f, "{}[{}]", addr, self.offset),
            None => write!(f, "[{}]", self.offset),
        }
    }
}

/// The offset of an access within its region.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum DerefOffset {
    /// Known to lie in this range.
    Explicit(Range),
    /// The value of this expression in the current state.
    Symbolic(Linear),
}

impl DerefOffset {
    pub fn range<Q: QueryChannel>(&self, state: &Q) -> Result<Range, Error> {
        match self {
            DerefOffset::Explicit(range) => Ok(range.clone()),
            DerefOffset::Symbolic(linear) => state.query_range(linear),
        }
    }

    /// The offset as a constant, if it is one without consulting a state.
    pub fn constant(&self) -> Option<&BigInt> {
        match self {
            DerefOffset::Explicit(range) => range.is_constant(),
            DerefOffset::Symbolic(linear) if linear.is_constant_only() => {
                Some(linear.constant_value())
            }
            DerefOffset::Symbolic(_) => None,
        }
    }

    /// An expression no smaller than the offset.
    pub fn upper_bound(&self) -> Option<Linear> {
        match self {
            DerefOffset::Explicit(range) => range.high().value().cloned().map(Linear::constant),
            DerefOffset::Symbolic(linear) => Some(linear.clone()),
        }
    }

    /// An expression no larger than the offset.
    pub fn lower_bound(&self) -> Option<Linear> {
        match self {
            DerefOffset::Explicit(range) => range.low().value().cloned().map(Linear::constant),
            DerefOffset::Symbolic(linear) => Some(linear.clone()),
        }
    }

    pub fn add(&self, delta: &Linear) -> DerefOffset {
        match self {
            DerefOffset::Explicit(range) if delta.is_constant_only() => {
                DerefOffset::Explicit(range.add_constant(delta.constant_value()))
            }
            DerefOffset::Explicit(range) => match range.is_constant() {
                Some(value) => DerefOffset::Symbolic(delta.add_constant(value.clone())),
                // A range plus an expression has no `Linear` form.
                None => DerefOffset::Explicit(Range::top()),
            },
            DerefOffset::Symbolic(linear) => DerefOffset::from(linear.add(delta)),
        }
    }
}

impl From<Linear> for DerefOffset {
    /// Constant expressions become explicit offsets.
    fn from(linear: Linear) -> DerefOffset {
        if linear.is_constant_only() {
            DerefOffset::Explicit(Range::constant(linear.constant_value().clone()))
        } else {
            DerefOffset::Symbolic(linear)
        }
    }
}

impl fmt::Display for DerefOffset {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DerefOffset::Explicit(range) => write!(f, "{}", range),
            DerefOffset::Symbolic(linear) => write!(f, "{}", linear),
        }
    }
}

/// An access into a known region.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct AbstractMemPointer {
    region: MemVar,
    offset: DerefOffset,
}

impl AbstractMemPointer {
    pub fn new(region: MemVar, offset: DerefOffset) -> AbstractMemPointer {
        AbstractMemPointer { region, offset }
    }

    pub fn region(&self) -> &MemVar {
        &self.region
    }

    pub fn offset(&self) -> &DerefOffset {
        &self.offset
    }
}

impl fmt::Display for AbstractMemPointer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.offset {
            DerefOffset::Explicit(range) => match range.is_constant() {
                Some(value) => write!(f, "{}[{}]", self.region, value),
                None => write!(f, "{}{}", self.region, range),
            },
            DerefOffset::Symbolic(linear) => write!(f, "{}[{}]", self.region, linear),
        }
    }
}
