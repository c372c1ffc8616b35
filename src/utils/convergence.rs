//! Convergence tracking & tolerance checks for the iterative solver.

/// Stopping criteria: converged when `rel < rtol` or `abs < atol`, at most `max_iters` cycles.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Convergence {
    pub rtol: f64,
    pub atol: f64,
    pub max_iters: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SolveStats {
    pub iterations: usize,
    /// Largest absolute residual norm over the modes.
    pub final_residual: f64,
    /// Largest relative residual norm over the modes.
    pub relative_residual: f64,
    pub converged: bool,
}

impl SolveStats {
    /// Stats of a direct solve.
    pub fn direct(final_residual: f64, relative_residual: f64) -> Self {
        SolveStats { iterations: 1, final_residual, relative_residual, converged: true }
    }
}

/// `abs / reference`, or `abs` itself when the reference norm is zero.
pub fn relative(abs: f64, reference: f64) -> f64 {
    if abs == 0.0 {
        0.0
    } else if reference > 0.0 {
        abs / reference
    } else {
        abs
    }
}

impl Convergence {
    pub fn is_converged(&self, abs: f64, rel: f64) -> bool {
        rel < self.rtol || abs < self.atol
    }

    /// Returns (should_stop, stats) given the per-mode residual norms after `i` cycles.
    pub fn check(&self, abs: &[f64], rel: &[f64], i: usize) -> (bool, SolveStats) {
        let converged = abs.iter().zip(rel).all(|(&a, &r)| self.is_converged(a, r));
        let stop = converged || i >= self.max_iters;
        (
            stop,
            SolveStats {
                iterations: i,
                final_residual: abs.iter().copied().fold(0.0, f64::max),
                relative_residual: rel.iter().copied().fold(0.0, f64::max),
                converged,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_norm_falls_back_to_absolute() {
        assert_eq!(relative(2.0, 4.0), 0.5);
        assert_eq!(relative(0.0, 0.0), 0.0);
        assert_eq!(relative(3.0, 0.0), 3.0);
    }

    #[test]
    fn either_tolerance_suffices() {
        let conv = Convergence { rtol: 1e-6, atol: 1e-12, max_iters: 10 };
        assert!(conv.is_converged(1.0, 1e-7));
        assert!(conv.is_converged(1e-13, 1.0));
        assert!(!conv.is_converged(1e-3, 1e-3));
    }

    #[test]
    fn stops_at_max_iters_without_converging() {
        let conv = Convergence { rtol: 1e-6, atol: 0.0, max_iters: 3 };
        let (stop, stats) = conv.check(&[1.0, 0.5], &[0.1, 0.2], 3);
        assert!(stop);
        assert!(!stats.converged);
        assert_eq!(stats.final_residual, 1.0);
        assert_eq!(stats.relative_residual, 0.2);
        let (stop, stats) = conv.check(&[1.0, 0.5], &[1e-7, 1e-8], 1);
        assert!(stop && stats.converged);
    }
}
