//! Parallel multigrid for the interface problem of a partitioned tridiagonal line.
//!
//! Each process eliminates the interior of its chunk ([`guard`]), leaving two coupled
//! unknowns per process. Those interface equations are solved with V-cycles over a
//! hierarchy in which neighbouring blocks are merged pairwise ([`level`], [`transfer`]),
//! smoothed by Jacobi, Gauss-Seidel or red-black relaxation ([`relax`]) and monitored on
//! the finest level ([`monitor`]). [`driver`] ties the pieces together and keeps the
//! state reused between calls.

pub mod driver;
pub mod guard;
pub mod level;
pub mod monitor;
pub mod relax;
pub mod transfer;

pub use driver::{Diagnostics, LineSolution, MultigridDriver};
pub use guard::{ChunkElimination, Ends, GuardSlopes};
pub use level::{Hierarchy, Level, LevelInfo, LevelTopology};
