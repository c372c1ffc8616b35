//! Local tridiagonal systems and their assembly from Laplacian coefficients.
//!
//! A process owns one contiguous chunk of the global radial line. For every
//! (slice, mode) pair the chunk carries a complex tridiagonal system
//!
//! ```text
//! a_i x_{i-1} + b_i x_i + c_i x_{i+1} = r_i,   i = 0..n
//! ```
//!
//! where `a_0` couples to the last unknown of the left neighbour and `c_{n-1}` to the
//! first unknown of the right neighbour. At the ends of the global line those couplings
//! are folded into the diagonal by [`TridiagonalSystem::fold_boundaries`].

pub mod assemble;
pub mod field;

pub use assemble::LaplaceCoefficients;
pub use field::{CellLocation, Field2D, FieldPerp, LocalMesh, MeshId};

use num_complex::Complex64;
use num_traits::{One, Zero};

use crate::config::BoundaryFlags;
use crate::core::traits::MatVec;
use crate::error::TriError;

/// One mode's local tridiagonal system.
#[derive(Debug, Clone, PartialEq)]
pub struct TridiagonalSystem {
    pub a: Vec<Complex64>,
    pub b: Vec<Complex64>,
    pub c: Vec<Complex64>,
    pub r: Vec<Complex64>,
}

impl TridiagonalSystem {
    pub fn new(
        a: Vec<Complex64>,
        b: Vec<Complex64>,
        c: Vec<Complex64>,
        r: Vec<Complex64>,
    ) -> Result<Self, TriError> {
        let n = b.len();
        if n == 0 {
            return Err(TriError::ShapeMismatch { what: "tridiagonal diagonal", expected: 1, found: 0 });
        }
        for (what, len) in [("sub-diagonal", a.len()), ("super-diagonal", c.len()), ("right-hand side", r.len())] {
            if len != n {
                return Err(TriError::ShapeMismatch { what, expected: n, found: len });
            }
        }
        Ok(Self { a, b, c, r })
    }

    pub fn len(&self) -> usize {
        self.b.len()
    }

    /// Check one system per mode, all of the same length; returns that length.
    pub fn check_modes(systems: &[Self], nmode: usize) -> Result<usize, TriError> {
        if systems.len() != nmode {
            return Err(TriError::ShapeMismatch { what: "mode count", expected: nmode, found: systems.len() });
        }
        let n = systems.first().map_or(0, Self::len);
        if n == 0 {
            return Err(TriError::ShapeMismatch { what: "local system length", expected: 1, found: 0 });
        }
        if let Some(bad) = systems.iter().find(|s| s.len() != n) {
            return Err(TriError::ShapeMismatch { what: "local system length", expected: n, found: bad.len() });
        }
        Ok(n)
    }

    pub fn is_empty(&self) -> bool {
        self.b.is_empty()
    }

    /// True when the matrix part (a, b, c) equals `other`'s; the right-hand side is ignored.
    pub fn same_operator(&self, other: &Self) -> bool {
        self.a == other.a && self.b == other.b && self.c == other.c
    }

    /// Row-wise `|b_i| >= |a_i| + |c_i|`.
    pub fn is_diagonally_dominant(&self) -> bool {
        self.a
            .iter()
            .zip(&self.b)
            .zip(&self.c)
            .all(|((a, b), c)| b.norm() >= a.norm() + c.norm())
    }

    /// Fold the ghost couplings at the global ends of the line into the diagonal.
    ///
    /// `inner` applies to row 0 of the first process, `outer` to the last row of the last
    /// process. Empty flags take a zero ghost value; `NEUMANN` sets the ghost equal to
    /// the boundary value; `DIRICHLET_CELL` sets it to its negative.
    pub fn fold_boundaries(&mut self, inner: Option<BoundaryFlags>, outer: Option<BoundaryFlags>) {
        if let Some(flags) = inner {
            let ghost = self.a[0];
            self.b[0] += boundary_weight(flags) * ghost;
            self.a[0] = Complex64::zero();
        }
        if let Some(flags) = outer {
            let last = self.len() - 1;
            let ghost = self.c[last];
            self.b[last] += boundary_weight(flags) * ghost;
            self.c[last] = Complex64::zero();
        }
    }

    /// Apply the operator with explicit neighbour values `x_lower`, `x_upper`.
    pub fn apply_with_halo(
        &self,
        x: &[Complex64],
        x_lower: Complex64,
        x_upper: Complex64,
        y: &mut [Complex64],
    ) {
        let n = self.len();
        debug_assert_eq!(x.len(), n);
        debug_assert_eq!(y.len(), n);
        for i in 0..n {
            let left = if i == 0 { x_lower } else { x[i - 1] };
            let right = if i + 1 == n { x_upper } else { x[i + 1] };
            y[i] = self.a[i] * left + self.b[i] * x[i] + self.c[i] * right;
        }
    }

    /// `r - T x` with explicit neighbour values.
    pub fn residual(&self, x: &[Complex64], x_lower: Complex64, x_upper: Complex64) -> Vec<Complex64> {
        let mut y = vec![Complex64::zero(); self.len()];
        self.apply_with_halo(x, x_lower, x_upper, &mut y);
        self.r.iter().zip(y).map(|(r, ax)| r - ax).collect()
    }
}

fn boundary_weight(flags: BoundaryFlags) -> Complex64 {
    if flags.contains(BoundaryFlags::NEUMANN) {
        Complex64::one()
    } else if flags.contains(BoundaryFlags::DIRICHLET_CELL) {
        -Complex64::one()
    } else {
        Complex64::zero()
    }
}

/// Zero-halo operator application, for systems that hold a whole line.
impl MatVec<[Complex64]> for TridiagonalSystem {
    fn matvec(&self, x: &[Complex64], y: &mut [Complex64]) {
        let zero = Complex64::zero();
        self.apply_with_halo(x, zero, zero, y);
    }
}

/// Serial Thomas solve of a complete tridiagonal line. `a[0]` and `c[n-1]` are ignored.
pub fn thomas_solve(system: &TridiagonalSystem) -> Result<Vec<Complex64>, TriError> {
    let n = system.len();
    let mut cprime = vec![Complex64::zero(); n];
    let mut x = vec![Complex64::zero(); n];
    let mut pivot = system.b[0];
    if !(pivot.norm() > 0.0) {
        return Err(TriError::ZeroPivot(0));
    }
    cprime[0] = system.c[0] / pivot;
    x[0] = system.r[0] / pivot;
    for i in 1..n {
        pivot = system.b[i] - system.a[i] * cprime[i - 1];
        if !(pivot.norm() > 0.0) {
            return Err(TriError::ZeroPivot(i));
        }
        cprime[i] = system.c[i] / pivot;
        x[i] = (system.r[i] - system.a[i] * x[i - 1]) / pivot;
    }
    for i in (0..n - 1).rev() {
        let next = x[i + 1];
        x[i] -= cprime[i] * next;
    }
    Ok(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn c(re: f64) -> Complex64 {
        Complex64::new(re, 0.0)
    }

    fn laplacian(n: usize) -> TridiagonalSystem {
        TridiagonalSystem::new(vec![c(1.0); n], vec![c(-2.0); n], vec![c(1.0); n], vec![c(1.0); n]).unwrap()
    }

    #[test]
    fn shape_is_checked() {
        let err = TridiagonalSystem::new(vec![c(1.0); 3], vec![c(1.0); 4], vec![c(1.0); 4], vec![c(1.0); 4]);
        assert!(matches!(err, Err(TriError::ShapeMismatch { expected: 4, found: 3, .. })));
    }

    #[test]
    fn thomas_inverts_the_operator() {
        let mut sys = laplacian(6);
        sys.fold_boundaries(Some(BoundaryFlags::empty()), Some(BoundaryFlags::empty()));
        let x = thomas_solve(&sys).unwrap();
        let mut y = vec![c(0.0); 6];
        sys.matvec(&x, &mut y);
        for (yi, ri) in y.iter().zip(&sys.r) {
            assert_abs_diff_eq!(yi.re, ri.re, epsilon = 1e-12);
            assert_abs_diff_eq!(yi.im, ri.im, epsilon = 1e-12);
        }
    }

    #[test]
    fn boundary_folding() {
        let mut neumann = laplacian(3);
        neumann.fold_boundaries(Some(BoundaryFlags::NEUMANN), None);
        assert_eq!(neumann.b[0], c(-1.0));
        assert_eq!(neumann.a[0], c(0.0));
        assert_eq!(neumann.c[2], c(1.0));

        let mut dirichlet = laplacian(3);
        dirichlet.fold_boundaries(None, Some(BoundaryFlags::DIRICHLET_CELL));
        assert_eq!(dirichlet.b[2], c(-3.0));
        assert_eq!(dirichlet.c[2], c(0.0));
    }

    #[test]
    fn zero_pivot_is_reported() {
        let sys = TridiagonalSystem::new(vec![c(0.0); 2], vec![c(0.0), c(1.0)], vec![c(1.0); 2], vec![c(1.0); 2]).unwrap();
        assert_eq!(thomas_solve(&sys), Err(TriError::ZeroPivot(0)));
    }

    #[test]
    fn dominance() {
        assert!(laplacian(4).is_diagonally_dominant());
        let mut weak = laplacian(4);
        weak.b[2] = c(1.5);
        assert!(!weak.is_diagonally_dominant());
    }
}
