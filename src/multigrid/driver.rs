//! V-cycle driver and the solver state kept between calls.

use log::{debug, trace, warn};
use num_complex::Complex64;
use num_traits::Zero;

use super::guard::{ChunkElimination, Ends};
use super::level::{Hierarchy, Level, LevelInfo};
use super::monitor::{report_contractivity, ConvergenceMonitor};
use super::relax::{compute_residual, exchange_halos, relax};
use super::transfer::{coarsen, refine};
use crate::config::SolverOptions;
use crate::error::TriError;
use crate::parallel::Comm;
use crate::system::TridiagonalSystem;
use crate::utils::convergence::{Convergence, SolveStats};
use crate::utils::parallel::{mode_map, mode_map_indexed, ModePool};

/// Counters accumulated over the lifetime of a solver.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Diagnostics {
    pub rebuilds: usize,
    pub solves: usize,
    /// Modes that fell back to the zero initial guess for lack of diagonal dominance.
    pub dominance_fallbacks: usize,
    pub non_converged: usize,
}

/// Local solution of every mode on one slice.
#[derive(Clone, Debug, PartialEq)]
pub struct LineSolution {
    pub x: Vec<Vec<Complex64>>,
    pub stats: SolveStats,
    pub mode_converged: Vec<bool>,
}

/// One V-cycle starting at level `l`.
pub fn vcycle<C: Comm>(comm: &C, levels: &mut [Level], l: usize, options: &SolverOptions) -> Result<(), TriError> {
    if !levels[l].topo.is_active() {
        return Ok(());
    }
    let kind = options.relaxation;
    if l + 1 == levels.len() {
        let level = &mut levels[l];
        if level.topo.blocks == 1 {
            // One block has no neighbours: its equations are solved by the intercepts.
            level.soln.copy_from_slice(&level.rhs);
        } else {
            relax(comm, level, kind, options.max_cycle)?;
        }
        return Ok(());
    }
    relax(comm, &mut levels[l], kind, options.max_cycle)?;
    compute_residual(comm, &mut levels[l])?;
    coarsen(comm, levels, l)?;
    vcycle(comm, levels, l + 1, options)?;
    refine(comm, levels, l)?;
    relax(comm, &mut levels[l], kind, options.max_cycle)
}

/// Owns the per-slice hierarchies and everything remembered between solves.
pub struct MultigridDriver {
    options: SolverOptions,
    ny: usize,
    nmode: usize,
    hierarchies: Vec<Option<Hierarchy>>,
    /// `first_call[jy][kz]` stays true until that (slice, mode) has been solved once.
    first_call: Vec<Vec<bool>>,
    saved: Vec<Vec<Option<Ends>>>,
    mean_iterations: f64,
    ncalls: usize,
    diagnostics: Diagnostics,
    pool: ModePool,
}

impl MultigridDriver {
    pub fn new(options: SolverOptions, ny: usize, nmode: usize) -> Result<Self, TriError> {
        options.validate()?;
        let pool = ModePool::new(options.threads)?;
        Ok(MultigridDriver {
            options,
            ny,
            nmode,
            hierarchies: vec![None; ny],
            first_call: vec![vec![true; nmode]; ny],
            saved: vec![vec![None; nmode]; ny],
            mean_iterations: 0.0,
            ncalls: 0,
            diagnostics: Diagnostics::default(),
            pool,
        })
    }

    pub fn options(&self) -> &SolverOptions {
        &self.options
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn mean_iterations(&self) -> f64 {
        self.mean_iterations
    }

    pub fn reset_mean_iterations(&mut self) {
        self.mean_iterations = 0.0;
        self.ncalls = 0;
    }

    /// Drop every cached hierarchy, saved solution and first-call flag.
    pub fn reset(&mut self) {
        self.hierarchies.iter_mut().for_each(|h| *h = None);
        self.first_call.iter_mut().for_each(|row| row.fill(true));
        self.saved.iter_mut().for_each(|row| row.fill(None));
    }

    /// Levels of the cached hierarchy for slice `jy`, if one has been built.
    pub fn levels_info(&self, jy: usize) -> Option<Vec<LevelInfo>> {
        self.hierarchies.get(jy)?.as_ref().map(Hierarchy::info)
    }

    fn check_shapes(
        &self,
        jy: usize,
        systems: &[TridiagonalSystem],
        x0: Option<&[Vec<Complex64>]>,
    ) -> Result<usize, TriError> {
        if jy >= self.ny {
            return Err(TriError::ShapeMismatch { what: "slice index", expected: self.ny, found: jy });
        }
        let n = TridiagonalSystem::check_modes(systems, self.nmode)?;
        if let Some(x0) = x0 {
            if x0.len() != self.nmode {
                return Err(TriError::ShapeMismatch { what: "initial guess modes", expected: self.nmode, found: x0.len() });
            }
            if let Some(bad) = x0.iter().find(|v| v.len() != n) {
                return Err(TriError::ShapeMismatch { what: "initial guess length", expected: n, found: bad.len() });
            }
        }
        Ok(n)
    }

    /// Solve every mode of slice `jy`. Collective over the line.
    ///
    /// `systems` holds this process's chunk of each mode's system, before boundary folding.
    /// An explicit `x0` supplies the initial end values; otherwise the initial guess
    /// follows the previous-timestep and diagonal-dominance policy.
    pub fn solve_systems<C: Comm>(
        &mut self,
        comm: &C,
        jy: usize,
        systems: &[TridiagonalSystem],
        x0: Option<&[Vec<Complex64>]>,
        generation: u64,
    ) -> Result<LineSolution, TriError> {
        let n = self.check_shapes(jy, systems, x0)?;
        let (rank, nprocs) = (comm.rank(), comm.size());
        let inner = (rank == 0).then_some(self.options.inner_boundary);
        let outer = (rank + 1 == nprocs).then_some(self.options.outer_boundary);
        let folded: Vec<TridiagonalSystem> = systems
            .iter()
            .map(|s| {
                let mut s = s.clone();
                s.fold_boundaries(inner, outer);
                s
            })
            .collect();

        let stale = match &self.hierarchies[jy] {
            Some(h) => h.generation != generation || !h.matches(&folded),
            None => true,
        };
        if comm.all_reduce_max(if stale { 1.0 } else { 0.0 })? > 0.0 {
            let hierarchy = Hierarchy::build(comm, folded.clone(), self.options.max_level, generation, &self.pool)?;
            self.diagnostics.rebuilds += 1;
            debug!("rank {rank}, slice {jy}: rebuilt hierarchy ({} levels)", hierarchy.levels.len());
            report_contractivity(rank, jy, &hierarchy);
            self.hierarchies[jy] = Some(hierarchy);
        }
        let Some(hierarchy) = self.hierarchies[jy].as_mut() else {
            return Err(TriError::Topology(format!("no hierarchy for slice {jy}")));
        };

        // Uncoupled solutions; their ends are the level-0 intercepts.
        let fine = &hierarchy.fine;
        let minvb: Vec<Vec<Complex64>> = self
            .pool
            .install(|| mode_map_indexed(fine.len(), |m| fine[m].solve_local(&folded[m].r)));

        let level0 = &mut hierarchy.levels[0];
        let mut fallbacks = 0;
        for m in 0..self.nmode {
            let intercepts = ChunkElimination::intercepts(&minvb[m]);
            level0.rhs[m] = intercepts;
            level0.soln[m] = if let Some(x0) = x0 {
                Ends::new(x0[m][0], x0[m][n - 1])
            } else if let Some(saved) = self.saved[jy][m].filter(|_| self.options.use_previous_timestep) {
                saved
            } else if self.first_call[jy][m] || hierarchy.fine[m].is_diagonally_dominant() {
                intercepts
            } else {
                fallbacks += 1;
                Ends::ZERO
            };
        }
        if fallbacks > 0 {
            debug!("rank {rank}, slice {jy}: {fallbacks} mode(s) not diagonally dominant, starting from zero");
            self.diagnostics.dominance_fallbacks += fallbacks;
        }

        let criteria = Convergence {
            rtol: self.options.rtol,
            atol: self.options.atol,
            max_iters: self.options.maxits,
        };
        let monitor = ConvergenceMonitor::new(comm, criteria, &hierarchy.levels[0])?;
        let mut iteration = 0;
        let (stats, mode_converged) = loop {
            let norms = monitor.measure(comm, &mut hierarchy.levels[0])?;
            let (stop, stats, flags) = monitor.check(&norms, iteration);
            if stop {
                break (stats, flags);
            }
            vcycle(comm, &mut hierarchy.levels, 0, &self.options)?;
            iteration += 1;
        };

        // Rebuild every local point from the converged interface values.
        let halos = exchange_halos(comm, &hierarchy.levels[0])?;
        let fine = &hierarchy.fine;
        let work: Vec<usize> = (0..self.nmode).collect();
        let x: Vec<Vec<Complex64>> = self.pool.install(|| {
            mode_map(&work, |&m| {
                let (xl, xr) = halos[m];
                let mut out = vec![Complex64::zero(); n];
                fine[m].reconstruct(&minvb[m], xl, xr, &mut out);
                out
            })
        });

        for m in 0..self.nmode {
            self.saved[jy][m] = Some(Ends::new(x[m][0], x[m][n - 1]));
            self.first_call[jy][m] = false;
        }
        self.mean_iterations =
            (self.mean_iterations * self.ncalls as f64 + stats.iterations as f64) / (self.ncalls + 1) as f64;
        self.ncalls += 1;
        self.diagnostics.solves += 1;
        if !stats.converged {
            self.diagnostics.non_converged += 1;
            warn!(
                "rank {rank}, slice {jy}: not converged after {} cycles (abs {:.3e}, rel {:.3e})",
                stats.iterations, stats.final_residual, stats.relative_residual
            );
        } else {
            trace!("rank {rank}, slice {jy}: converged in {} cycles", stats.iterations);
        }
        Ok(LineSolution { x, stats, mode_converged })
    }
}
