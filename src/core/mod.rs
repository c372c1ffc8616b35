//! Core traits shared by the solvers.

pub mod traits;
