//! Process-line communication.
//!
//! The radial coordinate is partitioned across a line of processes. Every solver in
//! this crate talks to its neighbours through the [`Comm`] trait: tagged point-to-point
//! messages of complex values between adjacent ranks, plus sum/max reductions and an
//! all-gather over the whole line.

use num_complex::Complex64;

use crate::error::TriError;

pub mod serial_comm;
pub use serial_comm::SerialComm;

pub mod thread_comm;
pub use thread_comm::ThreadComm;

#[cfg(feature = "mpi")]
pub mod mpi_comm;
#[cfg(feature = "mpi")]
pub use mpi_comm::MpiComm;

/// Message tag. The low byte carries the level, the rest the purpose of the message.
pub type Tag = u32;

/// Purposes of the point-to-point messages exchanged by the solvers.
pub mod tags {
    use super::Tag;

    pub const HALO_TO_LEFT: Tag = 1 << 8;
    pub const HALO_TO_RIGHT: Tag = 2 << 8;
    pub const PIPELINE: Tag = 3 << 8;
    pub const RESTRICT_SLOPES: Tag = 4 << 8;
    pub const RESTRICT_RESIDUAL: Tag = 5 << 8;
    pub const PROLONG: Tag = 6 << 8;
    pub const REDUCE: Tag = 7 << 8;
    pub const GATHER: Tag = 8 << 8;

    /// Combine a purpose with the level it belongs to.
    pub fn at_level(purpose: Tag, level: usize) -> Tag {
        purpose | (level as Tag & 0xff)
    }
}

pub trait Comm {
    fn rank(&self) -> usize;
    fn size(&self) -> usize;
    fn barrier(&self);
    /// Sum of `x` over every process of the line.
    fn all_reduce(&self, x: f64) -> Result<f64, TriError>;
    /// Maximum of `x` over every process of the line.
    fn all_reduce_max(&self, x: f64) -> Result<f64, TriError>;
    /// Elementwise sum of `x` over every process of the line, in place.
    fn all_reduce_sum_vec(&self, x: &mut [f64]) -> Result<(), TriError> {
        for v in x.iter_mut() {
            *v = self.all_reduce(*v)?;
        }
        Ok(())
    }
    fn send(&self, dest: usize, tag: Tag, data: &[Complex64]) -> Result<(), TriError>;
    fn recv(&self, source: usize, tag: Tag) -> Result<Vec<Complex64>, TriError>;
    /// Concatenation of every rank's `local` in rank order. All ranks must pass the same length.
    fn all_gather(&self, local: &[Complex64]) -> Result<Vec<Complex64>, TriError>;
}

/// Any of the available communicators, selected at run time.
pub enum UniverseComm {
    Serial(SerialComm),
    Thread(ThreadComm),
    #[cfg(feature = "mpi")]
    Mpi(MpiComm),
}

impl Comm for UniverseComm {
    fn rank(&self) -> usize {
        match self {
            UniverseComm::Serial(comm) => comm.rank(),
            UniverseComm::Thread(comm) => comm.rank(),
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => comm.rank(),
        }
    }
    fn size(&self) -> usize {
        match self {
            UniverseComm::Serial(comm) => comm.size(),
            UniverseComm::Thread(comm) => comm.size(),
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => comm.size(),
        }
    }
    fn barrier(&self) {
        match self {
            UniverseComm::Serial(comm) => comm.barrier(),
            UniverseComm::Thread(comm) => comm.barrier(),
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => comm.barrier(),
        }
    }
    fn all_reduce(&self, x: f64) -> Result<f64, TriError> {
        match self {
            UniverseComm::Serial(comm) => comm.all_reduce(x),
            UniverseComm::Thread(comm) => comm.all_reduce(x),
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => comm.all_reduce(x),
        }
    }
    fn all_reduce_max(&self, x: f64) -> Result<f64, TriError> {
        match self {
            UniverseComm::Serial(comm) => comm.all_reduce_max(x),
            UniverseComm::Thread(comm) => comm.all_reduce_max(x),
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => comm.all_reduce_max(x),
        }
    }
    fn all_reduce_sum_vec(&self, x: &mut [f64]) -> Result<(), TriError> {
        match self {
            UniverseComm::Serial(comm) => comm.all_reduce_sum_vec(x),
            UniverseComm::Thread(comm) => comm.all_reduce_sum_vec(x),
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => comm.all_reduce_sum_vec(x),
        }
    }
    fn send(&self, dest: usize, tag: Tag, data: &[Complex64]) -> Result<(), TriError> {
        match self {
            UniverseComm::Serial(comm) => comm.send(dest, tag, data),
            UniverseComm::Thread(comm) => comm.send(dest, tag, data),
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => comm.send(dest, tag, data),
        }
    }
    fn recv(&self, source: usize, tag: Tag) -> Result<Vec<Complex64>, TriError> {
        match self {
            UniverseComm::Serial(comm) => comm.recv(source, tag),
            UniverseComm::Thread(comm) => comm.recv(source, tag),
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => comm.recv(source, tag),
        }
    }
    fn all_gather(&self, local: &[Complex64]) -> Result<Vec<Complex64>, TriError> {
        match self {
            UniverseComm::Serial(comm) => comm.all_gather(local),
            UniverseComm::Thread(comm) => comm.all_gather(local),
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => comm.all_gather(local),
        }
    }
}
