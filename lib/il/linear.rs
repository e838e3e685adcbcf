use crate::il::NumVar;
use num_bigint::BigInt;
use num_traits::{One, Signed, Zero};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A single `coeff * var` term of a `Linear`.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Term {
    var: NumVar,
    coeff: BigInt,
}

impl Term {
    pub fn var(&self) -> &NumVar {
        &self.var
    }

    pub fn coeff(&self) -> &BigInt {
        &self.coeff
    }
}

/// An affine expression `c + a1*x1 + ... + an*xn`.
///
/// Terms are kept sorted by variable and terms with a zero coefficient are
/// dropped. Two `Linear`s that denote the same expression are therefore
/// structurally equal, hash the same and compare as equal, however they were
/// built. `Linear` and `Test` are used as keys in persistent maps and sets,
/// and this is what makes that safe.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Linear {
    terms: Vec<Term>,
    constant: BigInt,
}

impl Linear {
    /// Build a linear expression from unordered terms. Terms over the same
    /// variable are summed.
    pub fn new<C, I, T>(constant: C, terms: T) -> Linear
    where
        C: Into<BigInt>,
        I: Into<BigInt>,
        T: IntoIterator<Item = (I, NumVar)>,
    {
        let mut terms: Vec<Term> = terms
            .into_iter()
            .map(|(coeff, var)| Term {
                var,
                coeff: coeff.into(),
            })
            .collect();
        terms.sort_by(|a, b| a.var.cmp(&b.var));

        let mut canonical: Vec<Term> = Vec::with_capacity(terms.len());
        for term in terms {
            match canonical.last_mut() {
                Some(last) if last.var == term.var => last.coeff += term.coeff,
                _ => canonical.push(term),
            }
        }
        canonical.retain(|term| !term.coeff.is_zero());

        Linear {
            terms: canonical,
            constant: constant.into(),
        }
    }

    pub fn zero() -> Linear {
        Linear::constant(0)
    }

    pub fn one() -> Linear {
        Linear::constant(1)
    }

    pub fn constant<C: Into<BigInt>>(constant: C) -> Linear {
        Linear {
            terms: Vec::new(),
            constant: constant.into(),
        }
    }

    /// The expression `var`.
    pub fn var(var: &NumVar) -> Linear {
        Linear::term(1, var)
    }

    /// The expression `coeff * var`.
    pub fn term<C: Into<BigInt>>(coeff: C, var: &NumVar) -> Linear {
        Linear::new(0, vec![(coeff.into(), var.clone())])
    }

    pub fn constant_value(&self) -> &BigInt {
        &self.constant
    }

    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    /// The coefficient of `var`, zero if `var` does not occur.
    pub fn coeff(&self, var: &NumVar) -> BigInt {
        self.terms
            .binary_search_by(|term| term.var.cmp(var))
            .map(|index| self.terms[index].coeff.clone())
            .unwrap_or_else(|_| BigInt::zero())
    }

    pub fn contains(&self, var: &NumVar) -> bool {
        self.terms
            .binary_search_by(|term| term.var.cmp(var))
            .is_ok()
    }

    /// The smallest variable of this expression.
    pub fn key(&self) -> Option<&NumVar> {
        self.terms.first().map(|term| &term.var)
    }

    pub fn vars(&self) -> impl Iterator<Item = &NumVar> {
        self.terms.iter().map(|term| &term.var)
    }

    pub fn is_constant_only(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn is_zero(&self) -> bool {
        self.terms.is_empty() && self.constant.is_zero()
    }

    /// If this expression is exactly `var`, return `var`.
    pub fn is_single_var(&self) -> Option<&NumVar> {
        match self.terms.as_slice() {
            [term] if term.coeff.is_one() && self.constant.is_zero() => Some(&term.var),
            _ => None,
        }
    }

    pub fn add(&self, other: &Linear) -> Linear {
        let mut terms = Vec::with_capacity(self.terms.len() + other.terms.len());
        let mut left = self.terms.iter().peekable();
        let mut right = other.terms.iter().peekable();
        loop {
            let ordering = match (left.peek(), right.peek()) {
                (None, None) => break,
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (Some(a), Some(b)) => a.var.cmp(&b.var),
            };
            match ordering {
                Ordering::Less => terms.extend(left.next().cloned()),
                Ordering::Greater => terms.extend(right.next().cloned()),
                Ordering::Equal => {
                    if let (Some(a), Some(b)) = (left.next(), right.next()) {
                        let coeff = &a.coeff + &b.coeff;
                        if !coeff.is_zero() {
                            terms.push(Term {
                                var: a.var.clone(),
                                coeff,
                            });
                        }
                    }
                }
            }
        }
        Linear {
            terms,
            constant: &self.constant + &other.constant,
        }
    }

    pub fn sub(&self, other: &Linear) -> Linear {
        self.add(&other.negate())
    }

    pub fn add_constant<C: Into<BigInt>>(&self, constant: C) -> Linear {
        Linear {
            terms: self.terms.clone(),
            constant: &self.constant + constant.into(),
        }
    }

    /// Multiply by a scalar.
    pub fn smul<C: Into<BigInt>>(&self, factor: C) -> Linear {
        let factor = factor.into();
        if factor.is_zero() {
            return Linear::zero();
        }
        Linear {
            terms: self
                .terms
                .iter()
                .map(|term| Term {
                    var: term.var.clone(),
                    coeff: &term.coeff * &factor,
                })
                .collect(),
            constant: &self.constant * &factor,
        }
    }

    pub fn negate(&self) -> Linear {
        self.smul(-1)
    }

    /// Remove the term over `var`.
    pub fn drop_term(&self, var: &NumVar) -> Linear {
        Linear {
            terms: self
                .terms
                .iter()
                .filter(|term| &term.var != var)
                .cloned()
                .collect(),
            constant: self.constant.clone(),
        }
    }

    /// Rename `from` to `to`.
    pub fn substitute(&self, from: &NumVar, to: &NumVar) -> Linear {
        if !self.contains(from) {
            return self.clone();
        }
        let coeff = self.coeff(from);
        self.drop_term(from).add(&Linear::term(coeff, to))
    }

    /// Replace `var` by `expr`.
    pub fn substitute_linear(&self, var: &NumVar, expr: &Linear) -> Linear {
        if !self.contains(var) {
            return self.clone();
        }
        let coeff = self.coeff(var);
        self.drop_term(var).add(&expr.smul(coeff))
    }

    /// Divide every coefficient and the constant by their greatest common
    /// divisor.
    pub fn lowest_form(&self) -> Linear {
        let divisor = self
            .terms
            .iter()
            .map(|term| &term.coeff)
            .chain(std::iter::once(&self.constant))
            .fold(BigInt::zero(), |acc, value| gcd(acc, value.abs()));
        if divisor.is_zero() || divisor.is_one() {
            return self.clone();
        }
        Linear {
            terms: self
                .terms
                .iter()
                .map(|term| Term {
                    var: term.var.clone(),
                    coeff: &term.coeff / &divisor,
                })
                .collect(),
            constant: &self.constant / &divisor,
        }
    }
}

fn gcd(mut a: BigInt, mut b: BigInt) -> BigInt {
    while !b.is_zero() {
        let r = &a % &b;
        a = b;
        b = r;
    }
    a
}

impl From<&NumVar> for Linear {
    fn from(var: &NumVar) -> Linear {
        Linear::var(var)
    }
}

impl From<i64> for Linear {
    fn from(constant: i64) -> Linear {
        Linear::constant(constant)
    }
}

impl fmt::Display for Linear {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut first = true;
        for term in &self.terms {
            let magnitude = term.coeff.abs();
            let sign = if term.coeff.is_negative() { "-" } else { "+" };
            if first {
                if term.coeff.is_negative() {
                    write!(f, "-")?;
                }
            } else {
                write!(f, " {} ", sign)?;
            }
            if magnitude.is_one() {
                write!(f, "{}", term.var)?;
            } else {
                write!(f, "{}*{}", magnitude, term.var)?;
            }
            first = false;
        }
        if first {
            write!(f, "{}", self.constant)
        } else if self.constant.is_negative() {
            write!(f, " - {}", self.constant.abs())
        } else if self.constant.is_positive() {
            write!(f, " + {}", self.constant)
        } else {
            Ok(())
        }
    }
}
