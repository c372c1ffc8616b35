//! In-process communicator: N threads acting as N ranks of a process line.
//!
//! Every ordered pair of ranks owns a FIFO channel, so messages between two ranks
//! arrive in the order they were sent. Tags are checked on receipt; a mismatch means
//! the ranks disagree about the protocol, which is reported as a topology error.
//! Reductions are rooted at rank 0 and combine contributions in rank order, so every
//! rank sees a bit-identical result.

use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Barrier};
use std::thread;

use num_complex::Complex64;

use super::{tags, Comm, Tag};
use crate::error::TriError;

struct Envelope {
    tag: Tag,
    data: Vec<Complex64>,
}

pub struct ThreadComm {
    rank: usize,
    size: usize,
    /// outbox[dest]: channel from this rank to `dest`.
    outbox: Vec<Sender<Envelope>>,
    /// inbox[source]: channel from `source` to this rank.
    inbox: Vec<Receiver<Envelope>>,
    barrier: Arc<Barrier>,
}

impl ThreadComm {
    /// Build the communicators of a line of `size` ranks, one per thread.
    pub fn create(size: usize) -> Vec<ThreadComm> {
        assert!(size > 0, "a process line needs at least one rank");
        let barrier = Arc::new(Barrier::new(size));
        // senders[src][dest], receivers[dest][src]
        let mut senders: Vec<Vec<Sender<Envelope>>> = (0..size).map(|_| Vec::with_capacity(size)).collect();
        let mut receivers: Vec<Vec<Option<Receiver<Envelope>>>> =
            (0..size).map(|_| (0..size).map(|_| None).collect()).collect();
        for (src, row) in senders.iter_mut().enumerate() {
            for dest_inbox in receivers.iter_mut() {
                let (tx, rx) = channel();
                row.push(tx);
                dest_inbox[src] = Some(rx);
            }
        }
        senders
            .into_iter()
            .zip(receivers)
            .enumerate()
            .map(|(rank, (outbox, inbox))| ThreadComm {
                rank,
                size,
                outbox,
                inbox: inbox.into_iter().flatten().collect(),
                barrier: Arc::clone(&barrier),
            })
            .collect()
    }

    /// Run `f` on `size` scoped threads, one per rank, and collect the results in rank order.
    pub fn run<R, F>(size: usize, f: F) -> Vec<R>
    where
        R: Send,
        F: Fn(ThreadComm) -> R + Sync,
    {
        let comms = Self::create(size);
        thread::scope(|s| {
            let handles: Vec<_> = comms
                .into_iter()
                .map(|comm| {
                    let f = &f;
                    s.spawn(move || f(comm))
                })
                .collect();
            handles
                .into_iter()
                .map(|h| match h.join() {
                    Ok(r) => r,
                    Err(panic) => std::panic::resume_unwind(panic),
                })
                .collect()
        })
    }

    fn check_rank(&self, other: usize) -> Result<(), TriError> {
        if other >= self.size {
            return Err(TriError::Topology(format!(
                "rank {other} is outside a line of {} ranks",
                self.size
            )));
        }
        Ok(())
    }

    fn reduce_with(&self, local: &mut [f64], op: fn(f64, f64) -> f64) -> Result<(), TriError> {
        if self.size == 1 {
            return Ok(());
        }
        if self.rank == 0 {
            for src in 1..self.size {
                let part = self.recv(src, tags::REDUCE)?;
                if part.len() != local.len() {
                    return Err(TriError::Topology(format!(
                        "rank {src} contributed {} values to a reduction of {}",
                        part.len(),
                        local.len()
                    )));
                }
                for (acc, z) in local.iter_mut().zip(&part) {
                    *acc = op(*acc, z.re);
                }
            }
            let packed: Vec<Complex64> = local.iter().map(|&v| Complex64::new(v, 0.0)).collect();
            for dest in 1..self.size {
                self.send(dest, tags::REDUCE, &packed)?;
            }
        } else {
            let packed: Vec<Complex64> = local.iter().map(|&v| Complex64::new(v, 0.0)).collect();
            self.send(0, tags::REDUCE, &packed)?;
            let total = self.recv(0, tags::REDUCE)?;
            for (v, z) in local.iter_mut().zip(&total) {
                *v = z.re;
            }
        }
        Ok(())
    }
}

impl Comm for ThreadComm {
    fn rank(&self) -> usize { self.rank }
    fn size(&self) -> usize { self.size }
    fn barrier(&self) {
        self.barrier.wait();
    }

    fn all_reduce(&self, x: f64) -> Result<f64, TriError> {
        let mut v = [x];
        self.reduce_with(&mut v, |a, b| a + b)?;
        Ok(v[0])
    }

    fn all_reduce_max(&self, x: f64) -> Result<f64, TriError> {
        let mut v = [x];
        self.reduce_with(&mut v, f64::max)?;
        Ok(v[0])
    }

    fn all_reduce_sum_vec(&self, x: &mut [f64]) -> Result<(), TriError> {
        self.reduce_with(x, |a, b| a + b)
    }

    fn send(&self, dest: usize, tag: Tag, data: &[Complex64]) -> Result<(), TriError> {
        self.check_rank(dest)?;
        self.outbox[dest]
            .send(Envelope { tag, data: data.to_vec() })
            .map_err(|_| TriError::Communication(format!("rank {dest} has hung up")))
    }

    fn recv(&self, source: usize, tag: Tag) -> Result<Vec<Complex64>, TriError> {
        self.check_rank(source)?;
        let envelope = self.inbox[source]
            .recv()
            .map_err(|_| TriError::Communication(format!("rank {source} has hung up")))?;
        if envelope.tag != tag {
            return Err(TriError::Topology(format!(
                "rank {} expected tag {tag:#x} from rank {source}, got {:#x}",
                self.rank, envelope.tag
            )));
        }
        Ok(envelope.data)
    }

    fn all_gather(&self, local: &[Complex64]) -> Result<Vec<Complex64>, TriError> {
        if self.size == 1 {
            return Ok(local.to_vec());
        }
        if self.rank == 0 {
            let mut all = local.to_vec();
            for src in 1..self.size {
                let part = self.recv(src, tags::GATHER)?;
                if part.len() != local.len() {
                    return Err(TriError::Topology(format!(
                        "rank {src} gathered {} values, rank 0 gathered {}",
                        part.len(),
                        local.len()
                    )));
                }
                all.extend(part);
            }
            for dest in 1..self.size {
                self.send(dest, tags::GATHER, &all)?;
            }
            Ok(all)
        } else {
            self.send(0, tags::GATHER, local)?;
            self.recv(0, tags::GATHER)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reductions_agree_on_every_rank() {
        let sums = ThreadComm::run(4, |comm| {
            let r = comm.rank() as f64;
            let sum = comm.all_reduce(r + 1.0).unwrap();
            let max = comm.all_reduce_max(r).unwrap();
            let mut v = [r, 2.0 * r];
            comm.all_reduce_sum_vec(&mut v).unwrap();
            (sum, max, v)
        });
        for (sum, max, v) in sums {
            assert_eq!(sum, 10.0);
            assert_eq!(max, 3.0);
            assert_eq!(v, [6.0, 12.0]);
        }
    }

    #[test]
    fn neighbours_exchange_in_order() {
        let got = ThreadComm::run(3, |comm| {
            let me = Complex64::new(comm.rank() as f64, 0.0);
            if comm.rank() + 1 < comm.size() {
                comm.send(comm.rank() + 1, tags::HALO_TO_RIGHT, &[me]).unwrap();
            }
            if comm.rank() > 0 {
                comm.recv(comm.rank() - 1, tags::HALO_TO_RIGHT).unwrap()[0].re
            } else {
                -1.0
            }
        });
        assert_eq!(got, vec![-1.0, 0.0, 1.0]);
    }

    #[test]
    fn tag_mismatch_is_a_topology_error() {
        let res = ThreadComm::run(2, |comm| {
            if comm.rank() == 0 {
                comm.send(1, tags::PROLONG, &[Complex64::new(1.0, 0.0)]).unwrap();
                Ok(Vec::new())
            } else {
                comm.recv(0, tags::RESTRICT_RESIDUAL)
            }
        });
        assert!(matches!(res[1], Err(TriError::Topology(_))));
    }

    #[test]
    fn gather_concatenates_in_rank_order() {
        let all = ThreadComm::run(3, |comm| {
            let z = Complex64::new(comm.rank() as f64, -(comm.rank() as f64));
            comm.all_gather(&[z, z]).unwrap()
        });
        for v in all {
            let re: Vec<f64> = v.iter().map(|z| z.re).collect();
            assert_eq!(re, vec![0.0, 0.0, 1.0, 1.0, 2.0, 2.0]);
        }
    }
}
