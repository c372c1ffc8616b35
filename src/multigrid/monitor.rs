//! Residual norms, stopping decisions and the cheap structural checks.

use log::{trace, warn};

use super::level::{Hierarchy, Level};
use super::relax::compute_residual;
use crate::error::TriError;
use crate::parallel::Comm;
use crate::utils::convergence::{relative, Convergence, SolveStats};

/// Per-mode residual norms over the whole line.
#[derive(Clone, Debug, PartialEq)]
pub struct ResidualNorms {
    pub abs: Vec<f64>,
    pub rel: Vec<f64>,
}

pub struct ConvergenceMonitor {
    criteria: Convergence,
    /// `‖(rl, ru)‖₂` per mode over the line: the residual of the zero guess.
    rhs_norms: Vec<f64>,
}

impl ConvergenceMonitor {
    /// Collective: reduces the level-0 intercept norms over the line.
    pub fn new<C: Comm>(comm: &C, criteria: Convergence, level0: &Level) -> Result<Self, TriError> {
        let mut sq: Vec<f64> = level0.rhs.iter().map(|r| r.norm_sqr()).collect();
        comm.all_reduce_sum_vec(&mut sq)?;
        Ok(ConvergenceMonitor { criteria, rhs_norms: sq.into_iter().map(f64::sqrt).collect() })
    }

    /// Collective: residual of the current level-0 iterate, reduced per mode.
    pub fn measure<C: Comm>(&self, comm: &C, level0: &mut Level) -> Result<ResidualNorms, TriError> {
        compute_residual(comm, level0)?;
        let mut sq: Vec<f64> = level0.residual.iter().map(|r| r.norm_sqr()).collect();
        comm.all_reduce_sum_vec(&mut sq)?;
        let abs: Vec<f64> = sq.into_iter().map(f64::sqrt).collect();
        let rel = abs
            .iter()
            .zip(&self.rhs_norms)
            .map(|(&a, &b)| relative(a, b))
            .collect();
        Ok(ResidualNorms { abs, rel })
    }

    /// Returns (should_stop, stats, per-mode converged flags).
    pub fn check(&self, norms: &ResidualNorms, iteration: usize) -> (bool, SolveStats, Vec<bool>) {
        let (stop, stats) = self.criteria.check(&norms.abs, &norms.rel, iteration);
        let flags = norms
            .abs
            .iter()
            .zip(&norms.rel)
            .map(|(&a, &r)| self.criteria.is_converged(a, r))
            .collect();
        trace!(
            "cycle {iteration}: max abs residual {:.3e}, max rel residual {:.3e}",
            stats.final_residual,
            stats.relative_residual
        );
        (stop, stats, flags)
    }
}

/// Modes whose level-0 interface equations are not contractive on this rank.
pub fn non_contractive_modes(hierarchy: &Hierarchy) -> Vec<usize> {
    hierarchy.levels[0]
        .slopes
        .iter()
        .enumerate()
        .filter(|(_, s)| !s.is_contractive())
        .map(|(m, _)| m)
        .collect()
}

/// Warn once per rebuild when relaxation may diverge.
pub fn report_contractivity(rank: usize, jy: usize, hierarchy: &Hierarchy) -> bool {
    let bad = non_contractive_modes(hierarchy);
    if !bad.is_empty() {
        warn!(
            "rank {rank}, slice {jy}: interface equations of {} mode(s) are not contractive (first: {}); relaxation may diverge",
            bad.len(),
            bad[0]
        );
    }
    bad.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::multigrid::guard::{Ends, GuardSlopes};
    use crate::multigrid::level::LevelTopology;
    use crate::parallel::SerialComm;
    use num_complex::Complex64;

    #[test]
    fn relative_norm_is_measured_against_the_intercepts() {
        let comm = SerialComm::new();
        let z = |re: f64| Complex64::new(re, 0.0);
        let mut level = Level {
            topo: LevelTopology::new(0, 1, 0),
            slopes: vec![GuardSlopes::default(); 2],
            merge: None,
            rhs: vec![Ends::new(z(3.0), z(4.0)), Ends::ZERO],
            soln: vec![Ends::ZERO; 2],
            residual: vec![Ends::ZERO; 2],
            interior: Vec::new(),
        };
        let criteria = Convergence { rtol: 1e-8, atol: 1e-20, max_iters: 5 };
        let monitor = ConvergenceMonitor::new(&comm, criteria, &level).unwrap();
        let norms = monitor.measure(&comm, &mut level).unwrap();
        assert_eq!(norms.abs, vec![5.0, 0.0]);
        assert_eq!(norms.rel, vec![1.0, 0.0]);
        let (stop, stats, flags) = monitor.check(&norms, 0);
        assert!(!stop && !stats.converged);
        assert_eq!(flags, vec![false, true]);
    }

    #[test]
    fn zero_intercepts_keep_the_relative_norm_finite() {
        let comm = SerialComm::new();
        let z = |re: f64| Complex64::new(re, 0.0);
        let mut level = Level {
            topo: LevelTopology::new(0, 1, 0),
            slopes: vec![GuardSlopes::default()],
            merge: None,
            rhs: vec![Ends::ZERO],
            soln: vec![Ends::new(z(3.0), z(4.0))],
            residual: vec![Ends::ZERO],
            interior: Vec::new(),
        };
        let criteria = Convergence { rtol: 1e-8, atol: 1e-20, max_iters: 5 };
        let monitor = ConvergenceMonitor::new(&comm, criteria, &level).unwrap();
        let norms = monitor.measure(&comm, &mut level).unwrap();
        assert_eq!(norms.rel, vec![5.0]);
        let (stop, stats, _) = monitor.check(&norms, 0);
        assert!(!stop && !stats.converged);
        assert!(stats.relative_residual.is_finite());
    }
}
