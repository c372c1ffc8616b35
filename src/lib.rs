//! partri: parallel multigrid inversion of the spectrally transformed perpendicular Laplacian
//!
//! This crate solves, one slice at a time, the complex tridiagonal systems that arise when the
//! perpendicular Laplacian is Fourier transformed in its periodic direction and the radial
//! direction is partitioned across a line of processes. Each process eliminates its own chunk;
//! the remaining interface problem is solved either directly (gathered and factorised with Faer)
//! or iteratively by parallel multigrid, over MPI, in-process threads or a single process.

pub mod parallel;

pub mod config;
pub mod context;
pub mod core;
pub mod error;
pub mod multigrid;
pub mod solver;
pub mod system;
pub mod utils;

// Re-exports for convenience
pub use config::*;
pub use context::*;
pub use error::*;
pub use multigrid::{Diagnostics, LevelInfo, LineSolution};
pub use parallel::{Comm, SerialComm, ThreadComm, UniverseComm};
pub use solver::{LaplaceSolver, ParallelTri, ParallelTriMg, Solution};
pub use system::{thomas_solve, CellLocation, Field2D, FieldPerp, LaplaceCoefficients, LocalMesh, MeshId, TridiagonalSystem};

// Re-export SolveStats at the crate root for convenience
pub use utils::convergence::SolveStats;
