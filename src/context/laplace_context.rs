//! Factory for the Laplacian inversion solvers.
//!
//! `LaplaceContext` selects one of the tridiagonal solver variants at construction and
//! dispatches the [`LaplaceSolver`] operations to it.
//!
//! # Usage
//!
//! 1. Pick a [`SolverKind`] (or parse one from an options file with `str::parse`).
//! 2. Construct the context with the communicator, the local mesh and the solver options.
//! 3. Set the coefficients and call `solve` once per slice.

use std::fmt;
use std::str::FromStr;

use crate::config::SolverOptions;
use crate::error::TriError;
use crate::multigrid::Diagnostics;
use crate::parallel::Comm;
use crate::solver::{LaplaceSolver, ParallelTri, ParallelTriMg, Solution};
use crate::system::{Field2D, FieldPerp, LocalMesh};

/// Enum representing the available Laplacian inversion variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SolverKind {
    /// Direct: gathered interface system, dense LU
    ParallelTri,
    /// Iterative: multigrid on the distributed interface system
    #[default]
    ParallelTriMg,
}

impl FromStr for SolverKind {
    type Err = TriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "paralleltri" | "parallel_tri" | "direct" => Ok(SolverKind::ParallelTri),
            "paralleltrimg" | "parallel_tri_mg" | "multigrid" | "mg" => Ok(SolverKind::ParallelTriMg),
            other => Err(TriError::InvalidOption {
                key: "type".into(),
                reason: format!("unknown solver kind '{other}'"),
            }),
        }
    }
}

impl fmt::Display for SolverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolverKind::ParallelTri => write!(f, "paralleltri"),
            SolverKind::ParallelTriMg => write!(f, "paralleltrimg"),
        }
    }
}

/// A solver of the selected kind.
pub enum LaplaceContext<'c, C: Comm> {
    Direct(ParallelTri<'c, C>),
    Multigrid(ParallelTriMg<'c, C>),
}

impl<'c, C: Comm> LaplaceContext<'c, C> {
    pub fn new(kind: SolverKind, comm: &'c C, mesh: LocalMesh, options: SolverOptions) -> Result<Self, TriError> {
        Ok(match kind {
            SolverKind::ParallelTri => LaplaceContext::Direct(ParallelTri::new(comm, mesh, options)?),
            SolverKind::ParallelTriMg => LaplaceContext::Multigrid(ParallelTriMg::new(comm, mesh, options)?),
        })
    }

    pub fn kind(&self) -> SolverKind {
        match self {
            LaplaceContext::Direct(_) => SolverKind::ParallelTri,
            LaplaceContext::Multigrid(_) => SolverKind::ParallelTriMg,
        }
    }

    /// Mean V-cycles per solve; `None` for the direct variant.
    pub fn mean_iterations(&self) -> Option<f64> {
        match self {
            LaplaceContext::Direct(_) => None,
            LaplaceContext::Multigrid(mg) => Some(mg.mean_iterations()),
        }
    }

    pub fn reset_mean_iterations(&mut self) {
        if let LaplaceContext::Multigrid(mg) = self {
            mg.reset_mean_iterations();
        }
    }

    pub fn diagnostics(&self) -> Option<&Diagnostics> {
        match self {
            LaplaceContext::Direct(_) => None,
            LaplaceContext::Multigrid(mg) => Some(mg.diagnostics()),
        }
    }
}

impl<C: Comm> LaplaceSolver for LaplaceContext<'_, C> {
    fn set_coef_a(&mut self, val: &Field2D) -> Result<(), TriError> {
        match self {
            LaplaceContext::Direct(s) => s.set_coef_a(val),
            LaplaceContext::Multigrid(s) => s.set_coef_a(val),
        }
    }
    fn set_coef_c(&mut self, val: &Field2D) -> Result<(), TriError> {
        match self {
            LaplaceContext::Direct(s) => s.set_coef_c(val),
            LaplaceContext::Multigrid(s) => s.set_coef_c(val),
        }
    }
    fn set_coef_d(&mut self, val: &Field2D) -> Result<(), TriError> {
        match self {
            LaplaceContext::Direct(s) => s.set_coef_d(val),
            LaplaceContext::Multigrid(s) => s.set_coef_d(val),
        }
    }
    fn solve(&mut self, rhs: &FieldPerp) -> Result<Solution, TriError> {
        match self {
            LaplaceContext::Direct(s) => s.solve(rhs),
            LaplaceContext::Multigrid(s) => s.solve(rhs),
        }
    }
    fn solve_with_guess(&mut self, rhs: &FieldPerp, x0: &FieldPerp) -> Result<Solution, TriError> {
        match self {
            LaplaceContext::Direct(s) => s.solve_with_guess(rhs, x0),
            LaplaceContext::Multigrid(s) => s.solve_with_guess(rhs, x0),
        }
    }
    fn reset(&mut self) {
        match self {
            LaplaceContext::Direct(s) => s.reset(),
            LaplaceContext::Multigrid(s) => s.reset(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::SerialComm;
    use crate::system::MeshId;

    #[test]
    fn kinds_parse_and_print() {
        assert_eq!("ParallelTriMG".parse::<SolverKind>().unwrap(), SolverKind::ParallelTriMg);
        assert_eq!("direct".parse::<SolverKind>().unwrap(), SolverKind::ParallelTri);
        assert!("cyclic".parse::<SolverKind>().is_err());
        assert_eq!(SolverKind::ParallelTri.to_string().parse::<SolverKind>().unwrap(), SolverKind::ParallelTri);
    }

    #[test]
    fn context_dispatches_to_the_selected_variant() {
        let comm = SerialComm::new();
        let mesh = LocalMesh::new(MeshId(0), 3, 1, 1);
        let mut direct = LaplaceContext::new(SolverKind::ParallelTri, &comm, mesh.clone(), SolverOptions::default()).unwrap();
        assert_eq!(direct.kind(), SolverKind::ParallelTri);
        assert_eq!(direct.mean_iterations(), None);
        let mut mg = LaplaceContext::new(SolverKind::default(), &comm, mesh.clone(), SolverOptions::default()).unwrap();
        let rhs = FieldPerp::zeros(&mesh, 0);
        assert!(direct.solve(&rhs).unwrap().stats.converged);
        assert!(mg.solve(&rhs).unwrap().stats.converged);
        assert_eq!(mg.diagnostics().unwrap().solves, 1);
        assert_eq!(mg.mean_iterations(), Some(0.0));
    }
}
