//! Guard-vector elimination of a local chunk.
//!
//! Eliminating the interior of a chunk expresses every local unknown as an affine function of
//! the two coupled neighbour unknowns: the last point of the left process (`x_L`) and the
//! first point of the right process (`x_R`):
//!
//! ```text
//! x_i = minvb_i + lower_i · x_L + upper_i · x_R
//! ```
//!
//! `lower` and `upper` (the guard vectors) depend only on the matrix, so they are computed
//! once from a cached Thomas factorisation; `minvb` depends on the right-hand side and is
//! recomputed for every solve. Only the two ends of the chunk take part in the coupled
//! interface problem, see [`GuardSlopes`].

use std::ops::{Add, AddAssign, Sub};

use num_complex::Complex64;

use crate::error::TriError;
use crate::system::TridiagonalSystem;

const ZERO: Complex64 = Complex64::new(0.0, 0.0);

/// A pair of values attached to the two ends of a block.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Ends {
    pub first: Complex64,
    pub last: Complex64,
}

impl Ends {
    pub const ZERO: Ends = Ends { first: ZERO, last: ZERO };

    pub fn new(first: Complex64, last: Complex64) -> Self {
        Ends { first, last }
    }

    pub fn norm_sqr(&self) -> f64 {
        self.first.norm_sqr() + self.last.norm_sqr()
    }

    pub fn to_array(self) -> [Complex64; 2] {
        [self.first, self.last]
    }
}

impl Add for Ends {
    type Output = Ends;
    fn add(self, rhs: Ends) -> Ends {
        Ends::new(self.first + rhs.first, self.last + rhs.last)
    }
}

impl AddAssign for Ends {
    fn add_assign(&mut self, rhs: Ends) {
        self.first += rhs.first;
        self.last += rhs.last;
    }
}

impl Sub for Ends {
    type Output = Ends;
    fn sub(self, rhs: Ends) -> Ends {
        Ends::new(self.first - rhs.first, self.last - rhs.last)
    }
}

/// Response of a block's end values to its neighbours' coupled unknowns.
///
/// With intercepts `(rl, ru)`:
/// `first = rl + first_lower·x_L + first_upper·x_R` and
/// `last = ru + last_lower·x_L + last_upper·x_R`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct GuardSlopes {
    pub first_lower: Complex64,
    pub first_upper: Complex64,
    pub last_lower: Complex64,
    pub last_upper: Complex64,
}

impl GuardSlopes {
    /// Evaluate both affine maps.
    pub fn apply(&self, intercepts: Ends, x_lower: Complex64, x_upper: Complex64) -> Ends {
        Ends {
            first: intercepts.first + self.first_lower * x_lower + self.first_upper * x_upper,
            last: intercepts.last + self.last_lower * x_lower + self.last_upper * x_upper,
        }
    }

    /// `|first_lower| + |first_upper| <= 1` and likewise for the last end, up to rounding.
    pub fn is_contractive(&self) -> bool {
        const SLACK: f64 = 1e-12;
        self.first_lower.norm() + self.first_upper.norm() <= 1.0 + SLACK
            && self.last_lower.norm() + self.last_upper.norm() <= 1.0 + SLACK
    }

    pub fn to_array(self) -> [Complex64; 4] {
        [self.first_lower, self.first_upper, self.last_lower, self.last_upper]
    }

    pub fn from_slice(v: &[Complex64]) -> Self {
        GuardSlopes { first_lower: v[0], first_upper: v[1], last_lower: v[2], last_upper: v[3] }
    }
}

/// Cached elimination of one mode's local chunk.
#[derive(Clone, Debug)]
pub struct ChunkElimination {
    a: Vec<Complex64>,
    cprime: Vec<Complex64>,
    inv_pivot: Vec<Complex64>,
    lower: Vec<Complex64>,
    upper: Vec<Complex64>,
    slopes: GuardSlopes,
    dominant: bool,
}

impl ChunkElimination {
    /// Factorise the chunk and compute its guard vectors.
    ///
    /// `has_lower`/`has_upper` say whether a neighbour process exists on that side; a missing
    /// neighbour gives a zero guard vector.
    pub fn new(system: &TridiagonalSystem, has_lower: bool, has_upper: bool) -> Result<Self, TriError> {
        let n = system.len();
        let mut cprime = Vec::with_capacity(n);
        let mut inv_pivot = Vec::with_capacity(n);
        for i in 0..n {
            let pivot = if i == 0 { system.b[0] } else { system.b[i] - system.a[i] * cprime[i - 1] };
            if !(pivot.norm() > 0.0) || !pivot.is_finite() {
                return Err(TriError::ZeroPivot(i));
            }
            let inv = pivot.inv();
            cprime.push(system.c[i] * inv);
            inv_pivot.push(inv);
        }
        let mut elim = ChunkElimination {
            a: system.a.clone(),
            cprime,
            inv_pivot,
            lower: vec![ZERO; n],
            upper: vec![ZERO; n],
            slopes: GuardSlopes::default(),
            dominant: system.is_diagonally_dominant(),
        };
        if has_lower {
            let mut e0 = vec![ZERO; n];
            e0[0] = -system.a[0];
            elim.lower = elim.solve_local(&e0);
        }
        if has_upper {
            let mut en = vec![ZERO; n];
            en[n - 1] = -system.c[n - 1];
            elim.upper = elim.solve_local(&en);
        }
        elim.slopes = GuardSlopes {
            first_lower: elim.lower[0],
            first_upper: elim.upper[0],
            last_lower: elim.lower[n - 1],
            last_upper: elim.upper[n - 1],
        };
        Ok(elim)
    }

    pub fn len(&self) -> usize {
        self.inv_pivot.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inv_pivot.is_empty()
    }

    pub fn slopes(&self) -> GuardSlopes {
        self.slopes
    }

    pub fn is_diagonally_dominant(&self) -> bool {
        self.dominant
    }

    /// Solve the decoupled chunk `T y = d` with the cached factors.
    pub fn solve_local(&self, d: &[Complex64]) -> Vec<Complex64> {
        let n = self.len();
        debug_assert_eq!(d.len(), n);
        let mut y = Vec::with_capacity(n);
        for i in 0..n {
            let carry = if i == 0 { ZERO } else { self.a[i] * y[i - 1] };
            y.push((d[i] - carry) * self.inv_pivot[i]);
        }
        for i in (0..n.saturating_sub(1)).rev() {
            let next = y[i + 1];
            y[i] -= self.cprime[i] * next;
        }
        y
    }

    /// Intercepts of the block: the ends of the uncoupled solution `minvb`.
    pub fn intercepts(minvb: &[Complex64]) -> Ends {
        Ends::new(minvb[0], minvb[minvb.len() - 1])
    }

    /// `x_i = minvb_i + lower_i·x_L + upper_i·x_R` over the whole chunk.
    pub fn reconstruct(&self, minvb: &[Complex64], x_lower: Complex64, x_upper: Complex64, out: &mut [Complex64]) {
        for (((x, m), l), u) in out.iter_mut().zip(minvb).zip(&self.lower).zip(&self.upper) {
            *x = m + l * x_lower + u * x_upper;
        }
    }
}
