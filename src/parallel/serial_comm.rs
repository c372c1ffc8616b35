//! Single-process communicator: the whole radial line lives on this rank.

use num_complex::Complex64;

use super::{Comm, Tag};
use crate::error::TriError;

#[derive(Debug, Default, Clone, Copy)]
pub struct SerialComm;

impl SerialComm {
    pub fn new() -> Self {
        SerialComm
    }
}

impl Comm for SerialComm {
    fn rank(&self) -> usize { 0 }
    fn size(&self) -> usize { 1 }
    fn barrier(&self) {}
    fn all_reduce(&self, x: f64) -> Result<f64, TriError> { Ok(x) }
    fn all_reduce_max(&self, x: f64) -> Result<f64, TriError> { Ok(x) }
    fn all_reduce_sum_vec(&self, _x: &mut [f64]) -> Result<(), TriError> { Ok(()) }
    fn send(&self, dest: usize, _tag: Tag, _data: &[Complex64]) -> Result<(), TriError> {
        Err(TriError::Topology(format!("serial communicator has no rank {dest}")))
    }
    fn recv(&self, source: usize, _tag: Tag) -> Result<Vec<Complex64>, TriError> {
        Err(TriError::Topology(format!("serial communicator has no rank {source}")))
    }
    fn all_gather(&self, local: &[Complex64]) -> Result<Vec<Complex64>, TriError> {
        Ok(local.to_vec())
    }
}
