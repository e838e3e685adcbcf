use crate::il::{Linear, NumVar, Test};
use crate::numeric::Range;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Non-linear binary operators.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum BinOp {
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
}

/// The right-hand side of an assignment.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum Rhs {
    /// An affine expression.
    Linear(Linear),
    /// Any value in the range.
    Range(Range),
    /// A non-linear operation over two affine expressions.
    Binary {
        op: BinOp,
        left: Linear,
        right: Linear,
    },
}

impl Rhs {
    pub fn vars(&self) -> Vec<&NumVar> {
        match self {
            Rhs::Linear(linear) => linear.vars().collect(),
            Rhs::Range(_) => Vec::new(),
            Rhs::Binary { left, right, .. } => left.vars().chain(right.vars()).collect(),
        }
    }
}

/// An instruction labelling an edge of the control-flow automaton.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum Instruction {
    /// Assign the value of `src` to `dst`.
    Assign { dst: NumVar, src: Rhs },
    /// Continue only in states where the test holds.
    Test(Test),
    /// Load `size` bytes from the pointer value `address` into `dst`.
    Load {
        dst: NumVar,
        size: u64,
        address: Linear,
    },
    /// Store the `size`-byte value `src` at the pointer value `address`.
    Store {
        address: Linear,
        size: u64,
        src: Linear,
    },
    Nop,
}

impl Instruction {
    pub fn assign(dst: NumVar, src: Linear) -> Instruction {
        Instruction::Assign {
            dst,
            src: Rhs::Linear(src),
        }
    }

    pub fn assign_range(dst: NumVar, range: Range) -> Instruction {
        Instruction::Assign {
            dst,
            src: Rhs::Range(range),
        }
    }

    pub fn assign_binary(dst: NumVar, op: BinOp, left: Linear, right: Linear) -> Instruction {
        Instruction::Assign {
            dst,
            src: Rhs::Binary { op, left, right },
        }
    }

    pub fn test(test: Test) -> Instruction {
        Instruction::Test(test)
    }

    pub fn load(dst: NumVar, size: u64, address: Linear) -> Instruction {
        Instruction::Load { dst, size, address }
    }

    pub fn store(address: Linear, size: u64, src: Linear) -> Instruction {
        Instruction::Store { address, size, src }
    }

    pub fn nop() -> Instruction {
        Instruction::Nop
    }

    /// The variables this instruction reads.
    pub fn variables_read(&self) -> Vec<&NumVar> {
        match self {
            Instruction::Assign { src, .. } => src.vars(),
            Instruction::Test(test) => test.vars().collect(),
            Instruction::Load { address, .. } => address.vars().collect(),
            Instruction::Store { address, src, .. } => address.vars().chain(src.vars()).collect(),
            Instruction::Nop => Vec::new(),
        }
    }

    /// The variable this instruction writes, if any.
    pub fn variable_written(&self) -> Option<&NumVar> {
        match self {
            Instruction::Assign { dst, .. } | Instruction::Load { dst, .. } => Some(dst),
            Instruction::Test(_) | Instruction::Store { .. } | Instruction::Nop => None,
        }
    }

    pub fn is_test(&self) -> bool {
        matches!(self, Instruction::Test(_))
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BinOp::Mul => write!(f, "*"),
            BinOp::Div => write!(f, "/"),
            BinOp::Rem => write!(f, "%"),
            BinOp::Shl => write!(f, "<<"),
            BinOp::Shr => write!(f, ">>"),
        }
    }
}

impl fmt::Display for Rhs {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Rhs::Linear(linear) => write!(f, "{}", linear),
            Rhs::Range(range) => write!(f, "{}", range),
            Rhs::Binary { op, left, right } => write!(f, "({}) {} ({})", left, op, right),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Instruction::Assign { dst, src } => write!(f, "{} = {}", dst, src),
            Instruction::Test(test) => write!(f, "test {}", test),
            Instruction::Load { dst, size, address } => {
                write!(f, "{} = load:{} [{}]", dst, size, address)
            }
            Instruction::Store { address, size, src } => {
                write!(f, "store:{} [{}] = {}", size, address, src)
            }
            Instruction::Nop => write!(f, "nop"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_and_written() {
        let x = NumVar::fresh("x");
        let p = NumVar::fresh("p");
        let load = Instruction::load(x.clone(), 4, Linear::var(&p).add_constant(8));
        assert_eq!(load.variable_written(), Some(&x));
        assert_eq!(load.variables_read(), vec![&p]);
        assert_eq!(format!("{}", load), "x = load:4 [p + 8]");

        let store = Instruction::store(Linear::var(&p), 4, Linear::var(&x));
        assert_eq!(store.variable_written(), None);
        assert_eq!(store.variables_read(), vec![&p, &x]);

        let mul = Instruction::assign_binary(x.clone(), BinOp::Mul, Linear::var(&p), 3.into());
        assert_eq!(format!("{}", mul), "x = (p) * (3)");
    }
}
