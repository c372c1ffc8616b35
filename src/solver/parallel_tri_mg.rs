//! Iterative parallel tridiagonal solver: guard-vector elimination plus multigrid on the
//! interface equations.
//!
//! Unlike [`ParallelTri`](super::ParallelTri) no process ever holds the whole interface
//! system. Each V-cycle exchanges a few values per mode with the neighbouring processes of
//! every level, and the line-wide residual norm is the only global reduction.

use num_complex::Complex64;

use super::{LaplaceSolver, Solution};
use crate::config::SolverOptions;
use crate::error::TriError;
use crate::multigrid::{Diagnostics, LevelInfo, LineSolution, MultigridDriver};
use crate::parallel::Comm;
use crate::system::{Field2D, FieldPerp, LaplaceCoefficients, LocalMesh, TridiagonalSystem};

pub struct ParallelTriMg<'c, C: Comm> {
    comm: &'c C,
    mesh: LocalMesh,
    coefs: LaplaceCoefficients,
    driver: MultigridDriver,
}

impl<'c, C: Comm> ParallelTriMg<'c, C> {
    pub fn new(comm: &'c C, mesh: LocalMesh, options: SolverOptions) -> Result<Self, TriError> {
        mesh.validate()?;
        let driver = MultigridDriver::new(options, mesh.ny, mesh.nmode)?;
        Ok(ParallelTriMg { coefs: LaplaceCoefficients::new(&mesh), comm, mesh, driver })
    }

    pub fn mesh(&self) -> &LocalMesh {
        &self.mesh
    }

    pub fn options(&self) -> &SolverOptions {
        self.driver.options()
    }

    /// Running mean of the V-cycles per solve since construction or the last reset.
    pub fn mean_iterations(&self) -> f64 {
        self.driver.mean_iterations()
    }

    pub fn reset_mean_iterations(&mut self) {
        self.driver.reset_mean_iterations();
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        self.driver.diagnostics()
    }

    /// Levels of the hierarchy cached for slice `jy`; `None` before its first solve.
    pub fn levels_info(&self, jy: usize) -> Option<Vec<LevelInfo>> {
        self.driver.levels_info(jy)
    }

    /// Solve caller-assembled local systems of slice `jy`, one per mode. Collective over the line.
    ///
    /// `x0`, when given, holds each mode's local starting values.
    pub fn solve_systems(
        &mut self,
        jy: usize,
        systems: &[TridiagonalSystem],
        x0: Option<&[Vec<Complex64>]>,
    ) -> Result<LineSolution, TriError> {
        self.driver.solve_systems(self.comm, jy, systems, x0, self.coefs.generation())
    }

    fn solve_field(&mut self, rhs: &FieldPerp, x0: Option<&FieldPerp>) -> Result<Solution, TriError> {
        let systems = self.coefs.assemble(&self.mesh, rhs)?;
        let guess: Option<Vec<Vec<Complex64>>> = match x0 {
            Some(x0) => {
                x0.check_against(&self.mesh)?;
                if x0.jy() != rhs.jy() {
                    return Err(TriError::ShapeMismatch {
                        what: "initial guess slice",
                        expected: rhs.jy(),
                        found: x0.jy(),
                    });
                }
                Some(x0.modes().map(<[Complex64]>::to_vec).collect())
            }
            None => None,
        };
        let line = self.solve_systems(rhs.jy(), &systems, guess.as_deref())?;
        let x = FieldPerp::from_modes(&self.mesh, rhs.jy(), line.x)?;
        Ok(Solution { x, stats: line.stats })
    }
}

impl<C: Comm> LaplaceSolver for ParallelTriMg<'_, C> {
    fn set_coef_a(&mut self, val: &Field2D) -> Result<(), TriError> {
        self.coefs.set_a(&self.mesh, val)
    }
    fn set_coef_c(&mut self, val: &Field2D) -> Result<(), TriError> {
        self.coefs.set_c(&self.mesh, val)
    }
    fn set_coef_d(&mut self, val: &Field2D) -> Result<(), TriError> {
        self.coefs.set_d(&self.mesh, val)
    }

    fn solve(&mut self, rhs: &FieldPerp) -> Result<Solution, TriError> {
        self.solve_field(rhs, None)
    }

    fn solve_with_guess(&mut self, rhs: &FieldPerp, x0: &FieldPerp) -> Result<Solution, TriError> {
        self.solve_field(rhs, Some(x0))
    }

    fn reset(&mut self) {
        self.driver.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::SerialComm;
    use crate::system::{CellLocation, MeshId};

    #[test]
    fn coefficient_setters_validate_tags() {
        let comm = SerialComm::new();
        let mesh = LocalMesh::new(MeshId(1), 4, 2, 1);
        let mut solver = ParallelTriMg::new(&comm, mesh.clone(), SolverOptions::default()).unwrap();
        assert!(solver.set_coef_a(&Field2D::constant(&mesh, 0.5)).is_ok());
        let moved = Field2D::constant(&mesh, 1.0).relocated(CellLocation::XLow);
        assert!(matches!(solver.set_coef_c(&moved), Err(TriError::LocationMismatch { .. })));
        let foreign = Field2D::constant(&LocalMesh::new(MeshId(2), 4, 2, 1), 1.0);
        assert!(matches!(solver.set_coef_d(&foreign), Err(TriError::MeshMismatch { .. })));
        assert!(matches!(solver.set_coef_ez(&Field2D::constant(&mesh, 1.0)), Err(TriError::Unsupported(_))));
    }

    #[test]
    fn guess_must_belong_to_the_same_slice() {
        let comm = SerialComm::new();
        let mesh = LocalMesh::new(MeshId(1), 4, 2, 1);
        let mut solver = ParallelTriMg::new(&comm, mesh.clone(), SolverOptions::default()).unwrap();
        let rhs = FieldPerp::zeros(&mesh, 0);
        let x0 = FieldPerp::zeros(&mesh, 1);
        assert!(matches!(solver.solve_with_guess(&rhs, &x0), Err(TriError::ShapeMismatch { .. })));
        assert!(solver.levels_info(0).is_none());
        let sol = solver.solve(&rhs).unwrap();
        assert!(sol.stats.converged);
        assert_eq!(solver.levels_info(0).unwrap().len(), 1);
        solver.reset();
        assert!(solver.levels_info(0).is_none());
    }
}
