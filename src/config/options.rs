//! Options for the parallel tridiagonal solvers.
//!
//! This module provides the `SolverOptions` struct, which is used to specify
//! tolerances, iteration caps, the depth of the multigrid hierarchy and the
//! relaxation method either through the API or as `key = value` string pairs
//! read from an input file. Boundary treatment at the global radial edges is
//! described by `BoundaryFlags`.

use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;

use crate::error::TriError;

bitflags! {
    /// How the ghost point beyond a global radial boundary is folded into the first
    /// (inner) or last (outer) row. Empty flags leave the ghost value at zero.
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
    pub struct BoundaryFlags: u32 {
        /// Zero gradient: `x_ghost = x_edge`.
        const NEUMANN        = 0b0000_0001;
        /// Zero value on the cell face: `x_ghost = -x_edge`.
        const DIRICHLET_CELL = 0b0000_0010;
    }
}

/// Smoother used on every level of the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RelaxationKind {
    /// Both block ends updated from the previous iterate of the neighbours.
    Jacobi,
    /// Pipelined sweep along the process line using already-updated left values.
    GaussSeidel,
    /// Even blocks first, then odd blocks from the fresh even values.
    #[default]
    RedBlack,
}

impl FromStr for RelaxationKind {
    type Err = TriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jacobi" => Ok(RelaxationKind::Jacobi),
            "gauss_seidel" | "gauss-seidel" | "gs" => Ok(RelaxationKind::GaussSeidel),
            "red_black" | "red-black" | "redblack" | "rb" => Ok(RelaxationKind::RedBlack),
            other => Err(TriError::InvalidOption {
                key: "relaxation".into(),
                reason: format!("unknown relaxation method `{other}`"),
            }),
        }
    }
}

impl fmt::Display for RelaxationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RelaxationKind::Jacobi => "jacobi",
            RelaxationKind::GaussSeidel => "gauss_seidel",
            RelaxationKind::RedBlack => "red_black",
        };
        f.write_str(name)
    }
}

/// Solver tolerances, caps and method selection.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverOptions {
    /// Relative residual tolerance.
    pub rtol: f64,
    /// Absolute residual tolerance.
    pub atol: f64,
    /// Maximum number of V-cycles per solve.
    pub maxits: usize,
    /// Maximum number of coarse levels below the fine interface level.
    pub max_level: usize,
    /// Relaxation sweeps per level per V-cycle.
    pub max_cycle: usize,
    /// Seed later solves with the previous converged solution.
    pub use_previous_timestep: bool,
    pub relaxation: RelaxationKind,
    pub inner_boundary: BoundaryFlags,
    pub outer_boundary: BoundaryFlags,
    /// Size of a dedicated mode-parallel thread pool; `Some(0)` means one thread per core.
    pub threads: Option<usize>,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            rtol: 1e-7,
            atol: 1e-20,
            maxits: 100,
            max_level: 3,
            max_cycle: 1,
            use_previous_timestep: false,
            relaxation: RelaxationKind::default(),
            inner_boundary: BoundaryFlags::empty(),
            outer_boundary: BoundaryFlags::empty(),
            threads: None,
        }
    }
}

impl SolverOptions {
    pub fn with_tolerances(mut self, rtol: f64, atol: f64) -> Self {
        self.rtol = rtol;
        self.atol = atol;
        self
    }
    pub fn with_maxits(mut self, maxits: usize) -> Self {
        self.maxits = maxits;
        self
    }
    pub fn with_max_level(mut self, max_level: usize) -> Self {
        self.max_level = max_level;
        self
    }
    pub fn with_max_cycle(mut self, max_cycle: usize) -> Self {
        self.max_cycle = max_cycle;
        self
    }
    pub fn with_relaxation(mut self, relaxation: RelaxationKind) -> Self {
        self.relaxation = relaxation;
        self
    }
    pub fn with_previous_timestep(mut self, enabled: bool) -> Self {
        self.use_previous_timestep = enabled;
        self
    }
    pub fn with_boundaries(mut self, inner: BoundaryFlags, outer: BoundaryFlags) -> Self {
        self.inner_boundary = inner;
        self.outer_boundary = outer;
        self
    }

    /// Set one option from its textual form, as read from an input file.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), TriError> {
        let value = value.trim();
        match key.trim() {
            "rtol" => self.rtol = parse_value(key, value)?,
            "atol" => self.atol = parse_value(key, value)?,
            "maxits" => self.maxits = parse_value(key, value)?,
            "max_level" => self.max_level = parse_value(key, value)?,
            "max_cycle" => self.max_cycle = parse_value(key, value)?,
            "use_previous_timestep" => self.use_previous_timestep = parse_bool(key, value)?,
            "relaxation" => self.relaxation = value.parse()?,
            "inner_boundary_flags" => self.inner_boundary = parse_flags(key, value)?,
            "outer_boundary_flags" => self.outer_boundary = parse_flags(key, value)?,
            "threads" => self.threads = Some(parse_value(key, value)?),
            _ => {
                return Err(TriError::InvalidOption {
                    key: key.to_string(),
                    reason: "unrecognised option".into(),
                });
            }
        }
        Ok(())
    }

    /// Build options from `key = value` lines; blank lines and `#` comments are skipped.
    pub fn from_lines(text: &str) -> Result<Self, TriError> {
        let mut opts = Self::default();
        for line in text.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let (key, value) = line.split_once('=').ok_or_else(|| TriError::InvalidOption {
                key: line.to_string(),
                reason: "expected `key = value`".into(),
            })?;
            opts.set(key, value)?;
        }
        opts.validate()?;
        Ok(opts)
    }

    pub fn validate(&self) -> Result<(), TriError> {
        if !(self.rtol > 0.0 || self.atol > 0.0) {
            return Err(TriError::InvalidOption {
                key: "rtol".into(),
                reason: "at least one of rtol and atol must be positive".into(),
            });
        }
        if self.maxits == 0 {
            return Err(TriError::InvalidOption {
                key: "maxits".into(),
                reason: "must be at least 1".into(),
            });
        }
        if self.max_cycle == 0 {
            return Err(TriError::InvalidOption {
                key: "max_cycle".into(),
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T, TriError> {
    value.parse().map_err(|_| TriError::InvalidOption {
        key: key.to_string(),
        reason: format!("cannot parse `{value}`"),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, TriError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(TriError::InvalidOption {
            key: key.to_string(),
            reason: format!("`{value}` is not a boolean"),
        }),
    }
}

fn parse_flags(key: &str, value: &str) -> Result<BoundaryFlags, TriError> {
    let mut flags = BoundaryFlags::empty();
    for word in value.split(['|', ',']).map(str::trim).filter(|w| !w.is_empty()) {
        match word.to_ascii_lowercase().as_str() {
            "neumann" => flags |= BoundaryFlags::NEUMANN,
            "dirichlet_cell" => flags |= BoundaryFlags::DIRICHLET_CELL,
            "none" | "0" => {}
            other => {
                return Err(TriError::InvalidOption {
                    key: key.to_string(),
                    reason: format!("unknown boundary flag `{other}`"),
                });
            }
        }
    }
    if flags.contains(BoundaryFlags::NEUMANN | BoundaryFlags::DIRICHLET_CELL) {
        return Err(TriError::InvalidOption {
            key: key.to_string(),
            reason: "neumann and dirichlet_cell are exclusive".into(),
        });
    }
    Ok(flags)
}
