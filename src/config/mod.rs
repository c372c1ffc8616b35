pub mod options;

pub use options::{BoundaryFlags, RelaxationKind, SolverOptions};
