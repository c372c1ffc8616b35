//! Laplacian inversion solvers.
//!
//! Both variants invert the spectrally transformed perpendicular Laplacian one slice at a
//! time, with the radial direction partitioned across a line of processes:
//! - [`ParallelTri`]: direct. Every process eliminates its chunk, the interface maps of all
//!   processes are gathered everywhere and the small interface system is factorised densely.
//! - [`ParallelTriMg`]: iterative. The interface system is solved by multigrid V-cycles
//!   without ever being gathered.

use crate::error::TriError;
use crate::system::{Field2D, FieldPerp};
use crate::utils::convergence::SolveStats;

/// Solution of one slice.
#[derive(Clone, Debug, PartialEq)]
pub struct Solution {
    pub x: FieldPerp,
    pub stats: SolveStats,
}

/// Common interface of the Laplacian inversion variants.
pub trait LaplaceSolver {
    fn set_coef_a(&mut self, val: &Field2D) -> Result<(), TriError>;
    fn set_coef_c(&mut self, val: &Field2D) -> Result<(), TriError>;
    fn set_coef_d(&mut self, val: &Field2D) -> Result<(), TriError>;
    fn set_coef_ex(&mut self, _val: &Field2D) -> Result<(), TriError> {
        Err(TriError::Unsupported("the tridiagonal solvers have no Ex coefficient"))
    }
    fn set_coef_ez(&mut self, _val: &Field2D) -> Result<(), TriError> {
        Err(TriError::Unsupported("the tridiagonal solvers have no Ez coefficient"))
    }
    /// Solve one slice. Collective over the process line.
    fn solve(&mut self, rhs: &FieldPerp) -> Result<Solution, TriError>;
    /// Solve one slice starting from `x0`. Collective over the process line.
    fn solve_with_guess(&mut self, rhs: &FieldPerp, x0: &FieldPerp) -> Result<Solution, TriError>;
    /// Forget everything remembered between solves.
    fn reset(&mut self);
}

pub mod parallel_tri;
pub use parallel_tri::ParallelTri;

pub mod parallel_tri_mg;
pub use parallel_tri_mg::ParallelTriMg;
