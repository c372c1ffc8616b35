//! Context module for partri.
//!
//! This module provides the factory type that selects and owns one of the Laplacian
//! inversion solvers.
//!
//! Modules:
//! - [`laplace_context`]: Contains the `LaplaceContext` enum and the `SolverKind` selector.
//!
//! # Example
//! ```rust,ignore
//! use partri::context::{LaplaceContext, SolverKind};
//! let mut solver = LaplaceContext::new(SolverKind::ParallelTriMg, &comm, mesh, options)?;
//! let solution = solver.solve(&rhs)?;
//! ```

pub mod laplace_context;
pub use laplace_context::{LaplaceContext, SolverKind};
