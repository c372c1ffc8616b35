//! Coarsening and refinement between adjacent levels.
//!
//! Two neighbouring blocks A (left) and B (right) merge into one coarse block by eliminating
//! the two unknowns on their shared interface, `l_A` and `f_B`. With `x_L`/`x_R` the coupled
//! unknowns outside the pair:
//!
//! ```text
//! l_A = λ0 + λL·x_L + λR·x_R
//! f_B = φ0 + φL·x_L + φR·x_R
//! ```
//!
//! The slopes depend only on the operator and are fixed when the hierarchy is built. The
//! intercepts `λ0`, `φ0` follow the current right-hand sides and are recomputed on every
//! restriction.

use num_complex::Complex64;
use num_traits::One;

use super::guard::{Ends, GuardSlopes};
use super::level::Level;
use super::relax::exchange_halos;
use crate::error::TriError;
use crate::parallel::{tags, Comm};

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MergeMaps {
    lower_child: GuardSlopes,
    upper_child: GuardSlopes,
    inv_d: Complex64,
    lambda_lower: Complex64,
    lambda_upper: Complex64,
    phi_lower: Complex64,
    phi_upper: Complex64,
}

impl MergeMaps {
    /// Merge the slopes of a left block `a` and a right block `b`; also returns the coarse slopes.
    pub fn new(a: GuardSlopes, b: GuardSlopes, level: usize) -> Result<(Self, GuardSlopes), TriError> {
        let d = Complex64::one() - a.last_upper * b.first_lower;
        if !(d.norm() > 0.0) || !d.is_finite() {
            return Err(TriError::SingularInterface { level });
        }
        let inv_d = d.inv();
        let lambda_lower = a.last_lower * inv_d;
        let lambda_upper = a.last_upper * b.first_upper * inv_d;
        let phi_lower = b.first_lower * lambda_lower;
        let phi_upper = b.first_upper + b.first_lower * lambda_upper;
        let merged = GuardSlopes {
            first_lower: a.first_lower + a.first_upper * phi_lower,
            first_upper: a.first_upper * phi_upper,
            last_lower: b.last_lower * lambda_lower,
            last_upper: b.last_upper + b.last_lower * lambda_upper,
        };
        let maps = MergeMaps {
            lower_child: a,
            upper_child: b,
            inv_d,
            lambda_lower,
            lambda_upper,
            phi_lower,
            phi_upper,
        };
        Ok((maps, merged))
    }

    /// Coarse intercepts from the children's intercepts, plus the interior `(λ0, φ0)`.
    pub fn restrict(&self, a: Ends, b: Ends) -> (Ends, (Complex64, Complex64)) {
        let lambda0 = (a.last + self.lower_child.last_upper * b.first) * self.inv_d;
        let phi0 = b.first + self.upper_child.first_lower * lambda0;
        let coarse = Ends {
            first: a.first + self.lower_child.first_upper * phi0,
            last: b.last + self.upper_child.last_lower * lambda0,
        };
        (coarse, (lambda0, phi0))
    }

    /// Split a coarse block's values back into the two children.
    pub fn refine(
        &self,
        coarse: Ends,
        (lambda0, phi0): (Complex64, Complex64),
        x_lower: Complex64,
        x_upper: Complex64,
    ) -> (Ends, Ends) {
        let l_a = lambda0 + self.lambda_lower * x_lower + self.lambda_upper * x_upper;
        let f_b = phi0 + self.phi_lower * x_lower + self.phi_upper * x_upper;
        (Ends::new(coarse.first, l_a), Ends::new(f_b, coarse.last))
    }
}

/// Restrict the residual of level `l` into the right-hand side of level `l + 1`.
///
/// The owner of a right child sends its residual to the owner of the left child, which
/// merges the pair. The coarse solution starts from zero.
pub fn coarsen<C: Comm>(comm: &C, levels: &mut [Level], l: usize) -> Result<(), TriError> {
    let (fine, coarse) = levels.split_at_mut(l + 1);
    let fine = &mut fine[l];
    let coarse = &mut coarse[0];
    let topo = fine.topo;
    let tag = tags::at_level(tags::RESTRICT_RESIDUAL, l);

    match (topo.partner(), &fine.merge) {
        (Some(partner), Some(maps)) => {
            let theirs = comm.recv(partner, tag)?;
            fine.interior.clear();
            for (m, map) in maps.iter().enumerate() {
                let b = Ends::new(theirs[2 * m], theirs[2 * m + 1]);
                let (rhs, interior) = map.restrict(fine.residual[m], b);
                coarse.rhs[m] = rhs;
                fine.interior.push(interior);
            }
        }
        (Some(partner), None) => {
            let packed: Vec<Complex64> = fine.residual.iter().flat_map(|r| r.to_array()).collect();
            comm.send(partner, tag, &packed)?;
        }
        (None, _) if topo.is_active() => coarse.rhs.copy_from_slice(&fine.residual),
        (None, _) => {}
    }
    coarse.soln.iter_mut().for_each(|s| *s = Ends::ZERO);
    Ok(())
}

/// Interpolate the correction of level `l + 1` back to level `l` and add it.
pub fn refine<C: Comm>(comm: &C, levels: &mut [Level], l: usize) -> Result<(), TriError> {
    let (fine, coarse) = levels.split_at_mut(l + 1);
    let fine = &mut fine[l];
    let coarse = &coarse[0];
    let topo = fine.topo;
    let tag = tags::at_level(tags::PROLONG, l);

    let correction = match (topo.partner(), &fine.merge) {
        (Some(partner), Some(maps)) => {
            let halos = exchange_halos(comm, coarse)?;
            let mut own = Vec::with_capacity(maps.len());
            let mut theirs = Vec::with_capacity(2 * maps.len());
            for (m, map) in maps.iter().enumerate() {
                let (x_lower, x_upper) = halos[m];
                let (a, b) = map.refine(coarse.soln[m], fine.interior[m], x_lower, x_upper);
                own.push(a);
                theirs.extend(b.to_array());
            }
            comm.send(partner, tag, &theirs)?;
            own
        }
        (Some(partner), None) => {
            let packed = comm.recv(partner, tag)?;
            packed.chunks_exact(2).map(|p| Ends::new(p[0], p[1])).collect()
        }
        (None, _) if topo.is_active() => {
            // A lone last block passes through, but its coarse neighbours still exchange.
            exchange_halos(comm, coarse)?;
            coarse.soln.clone()
        }
        (None, _) => return Ok(()),
    };
    update_solution(fine, &correction);
    Ok(())
}

/// Add a correction to the level's current solution.
pub fn update_solution(level: &mut Level, correction: &[Ends]) {
    for (s, c) in level.soln.iter_mut().zip(correction) {
        *s += *c;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn c(re: f64, im: f64) -> Complex64 {
        Complex64::new(re, im)
    }

    fn slopes(seed: f64) -> GuardSlopes {
        GuardSlopes {
            first_lower: c(0.3 * seed, 0.1),
            first_upper: c(0.2, -0.05 * seed),
            last_lower: c(0.15, 0.02),
            last_upper: c(0.4, 0.1 * seed),
        }
    }

    #[test]
    fn merged_pair_reproduces_the_fine_equations() {
        let (a, b) = (slopes(1.0), slopes(-0.5));
        let (maps, merged) = MergeMaps::new(a, b, 0).unwrap();
        let (ra, rb) = (Ends::new(c(1.0, 0.5), c(-0.3, 0.2)), Ends::new(c(0.7, -1.0), c(0.1, 0.1)));
        let (coarse_rhs, interior) = maps.restrict(ra, rb);
        let (x_lower, x_upper) = (c(0.4, -0.3), c(-0.8, 0.6));

        let coarse = merged.apply(coarse_rhs, x_lower, x_upper);
        let (ea, eb) = maps.refine(coarse, interior, x_lower, x_upper);

        // Both children satisfy their own equations with the recovered interface values.
        let fa = a.apply(ra, x_lower, eb.first);
        let fb = b.apply(rb, ea.last, x_upper);
        for (lhs, rhs) in [(ea.first, fa.first), (ea.last, fa.last), (eb.first, fb.first), (eb.last, fb.last)] {
            assert_abs_diff_eq!((lhs - rhs).norm(), 0.0, epsilon = 1e-13);
        }
    }

    #[test]
    fn singular_interface() {
        let mut a = slopes(1.0);
        let mut b = slopes(1.0);
        a.last_upper = c(1.0, 0.0);
        b.first_lower = c(1.0, 0.0);
        assert_eq!(MergeMaps::new(a, b, 2).unwrap_err(), TriError::SingularInterface { level: 2 });
    }
}
