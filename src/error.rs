use thiserror::Error;

use crate::system::field::CellLocation;

// Unified error type for partri

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TriError {
    #[error("coefficient location {found:?} does not match solver location {expected:?}")]
    LocationMismatch {
        expected: CellLocation,
        found: CellLocation,
    },
    #[error("field belongs to mesh {found} but the solver was built on mesh {expected}")]
    MeshMismatch { expected: u64, found: u64 },
    #[error("{what}: expected length {expected}, found {found}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("invalid option `{key}`: {reason}")]
    InvalidOption { key: String, reason: String },
    #[error("zero pivot at row {0}")]
    ZeroPivot(usize),
    #[error("singular interface elimination on level {level}")]
    SingularInterface { level: usize },
    #[error("dense interface factorization failed: {0}")]
    FactorError(String),
    #[error("inconsistent process topology: {0}")]
    Topology(String),
    #[error("communication failure: {0}")]
    Communication(String),
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
}

impl TriError {
    /// Configuration errors are raised before any solve starts and are never retried.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            TriError::LocationMismatch { .. }
                | TriError::MeshMismatch { .. }
                | TriError::InvalidOption { .. }
                | TriError::Unsupported(_)
        )
    }

    /// Topology and communication errors abort the whole solve on every process.
    pub fn is_fatal(&self) -> bool {
        matches!(self, TriError::Topology(_) | TriError::Communication(_))
    }
}
