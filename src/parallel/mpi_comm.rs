//! MPI-based process-line communicator.
//!
//! This module provides an implementation of the `Comm` trait on top of the MPI
//! (Message Passing Interface) backend. Each MPI rank owns one radial partition of the
//! mesh; neighbouring partitions exchange guard-vector data through tagged
//! point-to-point messages, and convergence norms are combined with all-reduce.
//! The implementation is only available when the `mpi` feature is enabled.
//!
//! Complex values are shipped as interleaved `f64` pairs so that no complex MPI
//! datatype is required.
//!
//! # Example
//! ```no_run
//! # #[cfg(feature = "mpi")]
//! # {
//! use partri::parallel::{Comm, MpiComm};
//! let comm = MpiComm::new().expect("MPI initialisation");
//! println!("Rank: {} / {}", comm.rank(), comm.size());
//! comm.barrier();
//! # }
//! ```

use mpi::collective::SystemOperation;
use mpi::environment::Universe;
use mpi::topology::SimpleCommunicator;
use mpi::traits::*;
use num_complex::Complex64;

use super::{Comm, Tag};
use crate::error::TriError;

/// MPI communicator wrapper.
///
/// Holds the MPI universe (finalised on drop), the world communicator, the rank of
/// the current process and the total number of processes.
pub struct MpiComm {
    _universe: Universe,
    /// The MPI world communicator (all processes in the job).
    pub world: SimpleCommunicator,
    /// The rank (ID) of this process within the communicator.
    pub rank: usize,
    /// The total number of processes in the communicator.
    pub size: usize,
}

impl MpiComm {
    /// Initializes MPI and constructs a new `MpiComm` instance.
    pub fn new() -> Result<Self, TriError> {
        let universe = mpi::initialize()
            .ok_or_else(|| TriError::Communication("MPI was already initialised".into()))?;
        let world = universe.world();
        let rank = world.rank() as usize;
        let size = world.size() as usize;
        Ok(MpiComm { _universe: universe, world, rank, size })
    }

    fn check_rank(&self, other: usize) -> Result<i32, TriError> {
        if other >= self.size {
            return Err(TriError::Topology(format!(
                "rank {other} is outside a line of {} ranks",
                self.size
            )));
        }
        Ok(other as i32)
    }
}

fn flatten(data: &[Complex64]) -> Vec<f64> {
    data.iter().flat_map(|z| [z.re, z.im]).collect()
}

fn unflatten(flat: &[f64]) -> Vec<Complex64> {
    flat.chunks_exact(2).map(|p| Complex64::new(p[0], p[1])).collect()
}

impl Comm for MpiComm {
    fn rank(&self) -> usize { self.rank }
    fn size(&self) -> usize { self.size }
    fn barrier(&self) { self.world.barrier(); }

    fn all_reduce(&self, x: f64) -> Result<f64, TriError> {
        let mut y = x;
        self.world.all_reduce_into(&x, &mut y, SystemOperation::sum());
        Ok(y)
    }

    fn all_reduce_max(&self, x: f64) -> Result<f64, TriError> {
        let mut y = x;
        self.world.all_reduce_into(&x, &mut y, SystemOperation::max());
        Ok(y)
    }

    fn all_reduce_sum_vec(&self, x: &mut [f64]) -> Result<(), TriError> {
        let local = x.to_vec();
        self.world.all_reduce_into(&local[..], x, SystemOperation::sum());
        Ok(())
    }

    fn send(&self, dest: usize, tag: Tag, data: &[Complex64]) -> Result<(), TriError> {
        let dest = self.check_rank(dest)?;
        let flat = flatten(data);
        self.world.process_at_rank(dest).send_with_tag(&flat[..], tag as i32);
        Ok(())
    }

    fn recv(&self, source: usize, tag: Tag) -> Result<Vec<Complex64>, TriError> {
        let source = self.check_rank(source)?;
        let (flat, _status) = self
            .world
            .process_at_rank(source)
            .receive_vec_with_tag::<f64>(tag as i32);
        if flat.len() % 2 != 0 {
            return Err(TriError::Communication(format!(
                "odd-length complex payload from rank {source}"
            )));
        }
        Ok(unflatten(&flat))
    }

    fn all_gather(&self, local: &[Complex64]) -> Result<Vec<Complex64>, TriError> {
        let flat = flatten(local);
        let mut all = vec![0.0f64; flat.len() * self.size];
        self.world.all_gather_into(&flat[..], &mut all[..]);
        Ok(unflatten(&all))
    }
}
