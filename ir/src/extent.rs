//! Symbolic extent expressions and their simplifier.
//!
//! Extents are small arithmetic trees over constants, named symbols and
//! launch-configuration scalars. The simplifier canonicalizes just enough for
//! the scheduling analyses: constant folding, additive flattening,
//! `max`/`ceilDiv` identities, and the two proof queries the parallel
//! dimension map needs (`prove_eq`, `is_multiple_of`).

use std::fmt;

use crate::types::ParallelType;

/// A symbolic integer extent.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Extent {
    /// Compile-time constant.
    Const(i64),
    /// Named runtime symbol (e.g. a dynamic input dimension).
    Sym(String),
    /// Launch-configuration scalar such as `blockDim.x`.
    ParallelDim(ParallelType),
    Add(Box<Extent>, Box<Extent>),
    Mul(Box<Extent>, Box<Extent>),
    Max(Box<Extent>, Box<Extent>),
    CeilDiv(Box<Extent>, Box<Extent>),
}

impl Extent {
    pub fn sym(name: impl Into<String>) -> Self {
        Self::Sym(name.into())
    }

    pub fn one() -> Self {
        Self::Const(1)
    }

    pub fn add(self, rhs: Extent) -> Self {
        Self::Add(Box::new(self), Box::new(rhs))
    }

    pub fn mul(self, rhs: Extent) -> Self {
        Self::Mul(Box::new(self), Box::new(rhs))
    }

    pub fn max_with(self, rhs: Extent) -> Self {
        Self::Max(Box::new(self), Box::new(rhs))
    }

    pub fn ceil_div(self, rhs: Extent) -> Self {
        Self::CeilDiv(Box::new(self), Box::new(rhs))
    }

    pub fn as_const(&self) -> Option<i64> {
        match self {
            Self::Const(c) => Some(*c),
            _ => None,
        }
    }

    pub fn is_const(&self) -> bool {
        matches!(self, Self::Const(_))
    }

    /// Canonicalize the expression. Idempotent.
    pub fn simplify(&self) -> Extent {
        match self {
            Self::Const(_) | Self::Sym(_) | Self::ParallelDim(_) => self.clone(),
            Self::Add(..) => {
                // Flatten nested sums so `(x + 1) + (-1)` folds back to `x`.
                let mut terms = Vec::new();
                let mut constant = 0i64;
                self.collect_add_terms(&mut terms, &mut constant);
                if terms.is_empty() {
                    return Self::Const(constant);
                }
                let mut acc = terms.remove(0);
                for t in terms {
                    acc = acc.add(t);
                }
                if constant != 0 {
                    acc = acc.add(Self::Const(constant));
                }
                acc
            }
            Self::Mul(a, b) => {
                let (a, b) = (a.simplify(), b.simplify());
                match (a.as_const(), b.as_const()) {
                    (Some(x), Some(y)) => Self::Const(x * y),
                    (Some(1), None) => b,
                    (None, Some(1)) => a,
                    (Some(0), _) | (_, Some(0)) => Self::Const(0),
                    _ => a.mul(b),
                }
            }
            Self::Max(a, b) => {
                let (a, b) = (a.simplify(), b.simplify());
                if a == b {
                    return a;
                }
                match (a.as_const(), b.as_const()) {
                    (Some(x), Some(y)) => Self::Const(x.max(y)),
                    (Some(1), None) => b,
                    (None, Some(1)) => a,
                    _ => a.max_with(b),
                }
            }
            Self::CeilDiv(a, b) => {
                let (a, b) = (a.simplify(), b.simplify());
                match (a.as_const(), b.as_const()) {
                    // Extents are positive, so the rounding shortcut is safe.
                    (Some(x), Some(y)) if y > 0 => Self::Const((x + y - 1) / y),
                    (_, Some(1)) => a,
                    _ => a.ceil_div(b),
                }
            }
        }
    }

    fn collect_add_terms(&self, terms: &mut Vec<Extent>, constant: &mut i64) {
        match self {
            Self::Add(a, b) => {
                a.collect_add_terms(terms, constant);
                b.collect_add_terms(terms, constant);
            }
            other => match other.simplify() {
                Self::Const(c) => *constant += c,
                Self::Add(..) => unreachable!("simplify never returns a raw Add for a non-Add node"),
                t => terms.push(t),
            },
        }
    }

    /// Prove `self == other`. `Some(true)`/`Some(false)` are proofs; `None`
    /// means undecidable under this simplifier.
    pub fn prove_eq(&self, other: &Extent) -> Option<bool> {
        let (a, b) = (self.simplify(), other.simplify());
        if a == b {
            return Some(true);
        }
        match (a.as_const(), b.as_const()) {
            (Some(x), Some(y)) => Some(x == y),
            _ => None,
        }
    }

    /// Prove `self % divisor == 0`.
    pub fn is_multiple_of(&self, divisor: i64) -> Option<bool> {
        debug_assert!(divisor > 0);
        match self.simplify() {
            Self::Const(c) => Some(c % divisor == 0),
            Self::Mul(a, b) => {
                // A product is a multiple if either factor provably is.
                let via_a = a.is_multiple_of(divisor);
                let via_b = b.is_multiple_of(divisor);
                match (via_a, via_b) {
                    (Some(true), _) | (_, Some(true)) => Some(true),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    /// `max` under simplification; used to accumulate dimension extents.
    pub fn max_expr(a: &Extent, b: &Extent) -> Extent {
        a.clone().max_with(b.clone()).simplify()
    }
}

impl From<i64> for Extent {
    fn from(value: i64) -> Self {
        Self::Const(value)
    }
}

impl fmt::Display for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Const(c) => write!(f, "{c}"),
            Self::Sym(s) => f.write_str(s),
            Self::ParallelDim(pt) => f.write_str(pt.dim_name()),
            Self::Add(a, b) => write!(f, "( {a} + {b} )"),
            Self::Mul(a, b) => write!(f, "( {a} * {b} )"),
            Self::Max(a, b) => write!(f, "max({a}, {b})"),
            Self::CeilDiv(a, b) => write!(f, "ceilDiv({a}, {b})"),
        }
    }
}

impl fmt::Debug for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
