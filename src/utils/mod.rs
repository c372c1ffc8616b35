//! Utilities: convergence criteria and mode-level parallelism.

pub mod convergence;
pub mod parallel;

pub use convergence::{Convergence, SolveStats};
