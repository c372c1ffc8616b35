//! Level topology and the multigrid hierarchy of one slice.
//!
//! Level 0 has one block per process. Each coarser level merges neighbouring pairs of
//! blocks, so level `ℓ` has `⌈P / 2^ℓ⌉` blocks and block `q` is owned by rank `q·2^ℓ`.
//! Ranks that own no block at a level are inactive there and at every coarser level.

use log::debug;
use num_complex::Complex64;

use super::guard::{ChunkElimination, Ends, GuardSlopes};
use super::transfer::MergeMaps;
use crate::parallel::{tags, Comm};
use crate::error::TriError;
use crate::system::TridiagonalSystem;
use crate::utils::parallel::{try_mode_map, ModePool};

/// Which blocks exist at a level and where this rank sits among them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LevelTopology {
    pub level: usize,
    /// Rank distance between neighbouring block owners, `2^level`.
    pub stride: usize,
    pub blocks: usize,
    pub rank: usize,
}

impl LevelTopology {
    pub fn new(level: usize, nprocs: usize, rank: usize) -> Self {
        let stride = 1usize << level;
        LevelTopology { level, stride, blocks: nprocs.div_ceil(stride), rank }
    }

    pub fn coarser(&self) -> Self {
        LevelTopology {
            level: self.level + 1,
            stride: self.stride * 2,
            blocks: self.blocks.div_ceil(2),
            rank: self.rank,
        }
    }

    pub fn is_active(&self) -> bool {
        self.rank % self.stride == 0
    }

    /// Index of the block owned by this rank.
    pub fn block(&self) -> Option<usize> {
        self.is_active().then(|| self.rank / self.stride)
    }

    pub fn lower_rank(&self) -> Option<usize> {
        self.block().filter(|&q| q > 0).map(|_| self.rank - self.stride)
    }

    pub fn upper_rank(&self) -> Option<usize> {
        self.block().filter(|&q| q + 1 < self.blocks).map(|_| self.rank + self.stride)
    }

    pub fn is_even(&self) -> bool {
        self.block().is_some_and(|q| q % 2 == 0)
    }

    /// Rank whose block is merged with this one at the next level.
    pub fn partner(&self) -> Option<usize> {
        match self.block()? {
            q if q % 2 == 1 => Some(self.rank - self.stride),
            q if q + 1 < self.blocks => Some(self.rank + self.stride),
            _ => None,
        }
    }
}

/// Number of levels used for `nprocs` blocks, capped at `max_level + 1`.
pub fn level_count(nprocs: usize, max_level: usize) -> usize {
    let mut count = 1;
    let mut blocks = nprocs;
    while count <= max_level && blocks > 1 {
        blocks = blocks.div_ceil(2);
        count += 1;
    }
    count
}

/// Summary of one level, as reported by `levels_info`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LevelInfo {
    pub level: usize,
    pub blocks: usize,
    pub active: bool,
    pub stride: usize,
}

/// One stage of the hierarchy with its per-mode state.
#[derive(Clone, Debug)]
pub struct Level {
    pub topo: LevelTopology,
    /// Slopes of the block owned here, per mode. Empty when inactive.
    pub slopes: Vec<GuardSlopes>,
    /// Present on owners of an even block with a partner: how the pair merges.
    pub merge: Option<Vec<MergeMaps>>,
    /// Intercepts of the current equations (level 0: the uncoupled solution ends).
    pub rhs: Vec<Ends>,
    pub soln: Vec<Ends>,
    pub residual: Vec<Ends>,
    /// Interior values `(λ0, φ0)` of the last restriction, reused by refinement.
    pub interior: Vec<(Complex64, Complex64)>,
}

impl Level {
    fn new(topo: LevelTopology, slopes: Vec<GuardSlopes>) -> Self {
        let nmode = slopes.len();
        Level {
            topo,
            slopes,
            merge: None,
            rhs: vec![Ends::ZERO; nmode],
            soln: vec![Ends::ZERO; nmode],
            residual: vec![Ends::ZERO; nmode],
            interior: Vec::new(),
        }
    }

    pub fn nmode(&self) -> usize {
        self.slopes.len()
    }

    pub fn info(&self) -> LevelInfo {
        LevelInfo {
            level: self.topo.level,
            blocks: self.topo.blocks,
            active: self.topo.is_active(),
            stride: self.topo.stride,
        }
    }
}

/// Everything cached for one slice between solves.
#[derive(Clone, Debug)]
pub struct Hierarchy {
    pub levels: Vec<Level>,
    /// Level-0 eliminations, one per mode.
    pub fine: Vec<ChunkElimination>,
    /// Boundary-folded operators the hierarchy was built from.
    pub systems: Vec<TridiagonalSystem>,
    pub generation: u64,
}

impl Hierarchy {
    /// Eliminate every mode's chunk and coarsen the interface slopes level by level.
    ///
    /// Collective over the line: every rank calls it with the same `max_level`, and every
    /// rank returns an error if the build failed anywhere.
    pub fn build<C: Comm>(
        comm: &C,
        systems: Vec<TridiagonalSystem>,
        max_level: usize,
        generation: u64,
        pool: &ModePool,
    ) -> Result<Self, TriError> {
        let (rank, nprocs) = (comm.rank(), comm.size());
        let has_lower = rank > 0;
        let has_upper = rank + 1 < nprocs;

        let fine = pool.install(|| try_mode_map(&systems, |s| ChunkElimination::new(s, has_lower, has_upper)));
        agree(comm, fine.as_ref().err())?;
        let fine = fine?;

        let nlevels = level_count(nprocs, max_level);
        let mut topo = LevelTopology::new(0, nprocs, rank);
        let mut levels = vec![Level::new(topo, fine.iter().map(|e| e.slopes()).collect())];
        let mut failure = None;

        for l in 0..nlevels - 1 {
            let next = topo.coarser();
            let current = &mut levels[l];
            let mut merged = Vec::new();
            if let Some(partner) = topo.partner() {
                let tag = tags::at_level(tags::RESTRICT_SLOPES, l);
                if topo.is_even() {
                    let packed = comm.recv(partner, tag)?;
                    let mut maps = Vec::with_capacity(current.nmode());
                    for (own, theirs) in current.slopes.iter().zip(packed.chunks_exact(4)) {
                        match MergeMaps::new(*own, GuardSlopes::from_slice(theirs), l) {
                            Ok((map, slopes)) => {
                                maps.push(map);
                                merged.push(slopes);
                            }
                            Err(e) => {
                                failure.get_or_insert(e);
                                maps.push(MergeMaps::default());
                                merged.push(GuardSlopes::default());
                            }
                        }
                    }
                    current.merge = Some(maps);
                } else {
                    let packed: Vec<Complex64> = current.slopes.iter().flat_map(|s| s.to_array()).collect();
                    comm.send(partner, tag, &packed)?;
                }
            } else if topo.is_active() {
                merged = current.slopes.clone();
            }
            if !next.is_active() {
                merged.clear();
            }
            levels.push(Level::new(next, merged));
            topo = next;
        }
        agree(comm, failure.as_ref())?;

        debug!(
            "rank {rank}: built {} levels over {nprocs} processes for {} modes",
            levels.len(),
            systems.len()
        );
        Ok(Hierarchy { levels, fine, systems, generation })
    }

    pub fn info(&self) -> Vec<LevelInfo> {
        self.levels.iter().map(Level::info).collect()
    }

    /// True when the operators match the ones this hierarchy was built from.
    pub fn matches(&self, systems: &[TridiagonalSystem]) -> bool {
        self.systems.len() == systems.len()
            && self.systems.iter().zip(systems).all(|(a, b)| a.same_operator(b))
    }
}

/// Turn a local failure into a failure on every rank.
fn agree<C: Comm>(comm: &C, local: Option<&TriError>) -> Result<(), TriError> {
    let flag = comm.all_reduce_max(if local.is_some() { 1.0 } else { 0.0 })?;
    match local {
        Some(e) => Err(e.clone()),
        None if flag > 0.0 => Err(TriError::Communication("hierarchy build failed on another rank".into())),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topology_of_five_processes() {
        let t = LevelTopology::new(0, 5, 4);
        assert_eq!(t.blocks, 5);
        assert_eq!(t.partner(), None);
        let t1 = t.coarser();
        assert_eq!((t1.blocks, t1.block()), (3, Some(2)));
        assert_eq!(t1.lower_rank(), Some(2));
        assert_eq!(t1.upper_rank(), None);
        let t2 = t1.coarser();
        assert_eq!((t2.blocks, t2.block()), (2, Some(1)));
        assert_eq!(t2.partner(), Some(0));
        assert!(!LevelTopology::new(1, 5, 3).is_active());
    }

    #[test]
    fn level_counts() {
        assert_eq!(level_count(1, 3), 1);
        assert_eq!(level_count(4, 3), 3);
        assert_eq!(level_count(5, 3), 4);
        assert_eq!(level_count(16, 3), 4);
        assert_eq!(level_count(8, 0), 1);
    }

    #[test]
    fn partners_pair_up() {
        for rank in 0..6 {
            let t = LevelTopology::new(0, 6, rank);
            let p = t.partner().unwrap();
            assert_eq!(LevelTopology::new(0, 6, p).partner(), Some(rank));
        }
    }
}
