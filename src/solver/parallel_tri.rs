//! Direct parallel tridiagonal solver.
//!
//! Every process eliminates its chunk into the two affine interface maps of its ends. The
//! maps of all processes are gathered on every process, which then factorises the dense
//! `2P × 2P` interface system with Faer's full-pivoting LU and reconstructs its own points.
//! Exact up to rounding, with one all-gather per slice; the cost of the dense solve grows
//! with the cube of the process count.

use faer::linalg::solvers::{FullPivLu, SolveCore};
use faer::{c64, Conj, Mat, MatMut};
use log::debug;
use num_complex::Complex64;

use super::{LaplaceSolver, Solution};
use crate::config::SolverOptions;
use crate::error::TriError;
use crate::multigrid::guard::{ChunkElimination, GuardSlopes};
use crate::multigrid::LineSolution;
use crate::parallel::Comm;
use crate::system::{Field2D, FieldPerp, LaplaceCoefficients, LocalMesh, TridiagonalSystem};
use crate::utils::convergence::{relative, SolveStats};
use crate::utils::parallel::{mode_map_indexed, try_mode_map, ModePool};

/// Interface data of one mode on one process: intercepts then slopes.
const PACKET: usize = 6;

fn to_faer(z: Complex64) -> c64 {
    c64::new(z.re, z.im)
}

fn from_faer(z: c64) -> Complex64 {
    Complex64::new(z.re, z.im)
}

pub struct ParallelTri<'c, C: Comm> {
    comm: &'c C,
    mesh: LocalMesh,
    options: SolverOptions,
    coefs: LaplaceCoefficients,
    pool: ModePool,
}

impl<'c, C: Comm> ParallelTri<'c, C> {
    pub fn new(comm: &'c C, mesh: LocalMesh, options: SolverOptions) -> Result<Self, TriError> {
        mesh.validate()?;
        options.validate()?;
        let pool = ModePool::new(options.threads)?;
        Ok(ParallelTri { coefs: LaplaceCoefficients::new(&mesh), comm, mesh, options, pool })
    }

    pub fn mesh(&self) -> &LocalMesh {
        &self.mesh
    }

    /// Solve caller-assembled local systems, one per mode. Collective over the line.
    pub fn solve_systems(&self, systems: &[TridiagonalSystem]) -> Result<LineSolution, TriError> {
        let comm = self.comm;
        let (rank, nprocs) = (comm.rank(), comm.size());
        let n = TridiagonalSystem::check_modes(systems, self.mesh.nmode)?;
        let nmode = systems.len();
        let inner = (rank == 0).then_some(self.options.inner_boundary);
        let outer = (rank + 1 == nprocs).then_some(self.options.outer_boundary);
        let folded: Vec<TridiagonalSystem> = systems
            .iter()
            .map(|s| {
                let mut s = s.clone();
                s.fold_boundaries(inner, outer);
                s
            })
            .collect();

        let (has_lower, has_upper) = (rank > 0, rank + 1 < nprocs);
        let elims = self
            .pool
            .install(|| try_mode_map(&folded, |s| ChunkElimination::new(s, has_lower, has_upper)));
        let failed = comm.all_reduce_max(if elims.is_err() { 1.0 } else { 0.0 })?;
        let elims = elims?;
        if failed > 0.0 {
            return Err(TriError::Communication("elimination failed on another rank".into()));
        }
        let minvb: Vec<Vec<Complex64>> = self
            .pool
            .install(|| mode_map_indexed(nmode, |m| elims[m].solve_local(&folded[m].r)));

        // Mode-major packets: [rl, ru, first_lower, first_upper, last_lower, last_upper].
        let mut packet = Vec::with_capacity(PACKET * nmode);
        for (elim, mv) in elims.iter().zip(&minvb) {
            let ends = ChunkElimination::intercepts(mv);
            packet.extend(ends.to_array());
            packet.extend(elim.slopes().to_array());
        }
        let all = comm.all_gather(&packet)?;
        if all.len() != PACKET * nmode * nprocs {
            return Err(TriError::Topology(format!(
                "gathered {} interface values, expected {}",
                all.len(),
                PACKET * nmode * nprocs
            )));
        }

        let interface: Vec<Vec<Complex64>> = self
            .pool
            .install(|| mode_map_indexed(nmode, |m| solve_interface(&all, m, nmode, nprocs)));
        if interface.iter().flatten().any(|z| !z.is_finite()) {
            return Err(TriError::FactorError("interface solve produced non-finite values".into()));
        }

        let zero = Complex64::new(0.0, 0.0);
        let mut x = Vec::with_capacity(nmode);
        let mut sq = vec![0.0; 2 * nmode];
        for m in 0..nmode {
            let z = &interface[m];
            let x_lower = if has_lower { z[2 * rank - 1] } else { zero };
            let x_upper = if has_upper { z[2 * rank + 2] } else { zero };
            let mut out = vec![zero; n];
            elims[m].reconstruct(&minvb[m], x_lower, x_upper, &mut out);
            sq[2 * m] = folded[m].residual(&out, x_lower, x_upper).iter().map(|r| r.norm_sqr()).sum();
            sq[2 * m + 1] = folded[m].r.iter().map(|r| r.norm_sqr()).sum();
            x.push(out);
        }
        comm.all_reduce_sum_vec(&mut sq)?;
        let (abs, rel) = sq.chunks_exact(2).fold((0.0f64, 0.0f64), |(abs, rel), pair| {
            let a = pair[0].sqrt();
            (abs.max(a), rel.max(relative(a, pair[1].sqrt())))
        });
        debug!("rank {rank}: direct interface solve of {nmode} modes over {nprocs} processes, residual {abs:.3e}");
        Ok(LineSolution { x, stats: SolveStats::direct(abs, rel), mode_converged: vec![true; nmode] })
    }

    fn solve_field(&self, rhs: &FieldPerp) -> Result<Solution, TriError> {
        let systems = self.coefs.assemble(&self.mesh, rhs)?;
        let line = self.solve_systems(&systems)?;
        let x = FieldPerp::from_modes(&self.mesh, rhs.jy(), line.x)?;
        Ok(Solution { x, stats: line.stats })
    }
}

/// Solve the dense interface system of mode `m` from the gathered packets.
///
/// Unknowns are ordered `(f_0, l_0, f_1, l_1, ...)`; row `2p` is the first end of process
/// `p`, row `2p + 1` its last end.
fn solve_interface(all: &[Complex64], m: usize, nmode: usize, nprocs: usize) -> Vec<Complex64> {
    let size = 2 * nprocs;
    let mut a = Mat::<c64>::zeros(size, size);
    let mut z = vec![c64::new(0.0, 0.0); size];
    for p in 0..nprocs {
        let base = (p * nmode + m) * PACKET;
        let s = GuardSlopes::from_slice(&all[base + 2..base + PACKET]);
        let (f, l) = (2 * p, 2 * p + 1);
        a[(f, f)] = c64::new(1.0, 0.0);
        a[(l, l)] = c64::new(1.0, 0.0);
        if p > 0 {
            a[(f, 2 * p - 1)] = to_faer(-s.first_lower);
            a[(l, 2 * p - 1)] = to_faer(-s.last_lower);
        }
        if p + 1 < nprocs {
            a[(f, 2 * p + 2)] = to_faer(-s.first_upper);
            a[(l, 2 * p + 2)] = to_faer(-s.last_upper);
        }
        z[f] = to_faer(all[base]);
        z[l] = to_faer(all[base + 1]);
    }
    let lu = FullPivLu::new(a.as_ref());
    let z_mat = MatMut::from_column_major_slice_mut(&mut z, size, 1);
    lu.solve_in_place_with_conj(Conj::No, z_mat);
    z.into_iter().map(from_faer).collect()
}

impl<C: Comm> LaplaceSolver for ParallelTri<'_, C> {
    fn set_coef_a(&mut self, val: &Field2D) -> Result<(), TriError> {
        self.coefs.set_a(&self.mesh, val)
    }
    fn set_coef_c(&mut self, val: &Field2D) -> Result<(), TriError> {
        self.coefs.set_c(&self.mesh, val)
    }
    fn set_coef_d(&mut self, val: &Field2D) -> Result<(), TriError> {
        self.coefs.set_d(&self.mesh, val)
    }

    fn solve(&mut self, rhs: &FieldPerp) -> Result<Solution, TriError> {
        self.solve_field(rhs)
    }

    /// The direct solve has no use for a starting point; `x0` is only checked.
    fn solve_with_guess(&mut self, rhs: &FieldPerp, x0: &FieldPerp) -> Result<Solution, TriError> {
        x0.check_against(&self.mesh)?;
        self.solve_field(rhs)
    }

    fn reset(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::{SerialComm, ThreadComm};
    use crate::system::{thomas_solve, MeshId};

    fn c(re: f64, im: f64) -> Complex64 {
        Complex64::new(re, im)
    }

    fn global_line(len: usize) -> TridiagonalSystem {
        let a = (0..len).map(|i| c(1.0, 0.05 * (i % 3) as f64)).collect();
        let b = (0..len).map(|i| c(-3.0 - 0.1 * (i % 5) as f64, 0.2)).collect();
        let cc = (0..len).map(|_| c(0.9, -0.05)).collect();
        let r = (0..len).map(|i| c((i as f64 * 0.4).cos(), (i as f64 * 0.1).sin())).collect();
        TridiagonalSystem::new(a, b, cc, r).unwrap()
    }

    fn slice(sys: &TridiagonalSystem, start: usize, n: usize) -> TridiagonalSystem {
        TridiagonalSystem::new(
            sys.a[start..start + n].to_vec(),
            sys.b[start..start + n].to_vec(),
            sys.c[start..start + n].to_vec(),
            sys.r[start..start + n].to_vec(),
        )
        .unwrap()
    }

    #[test]
    fn matches_serial_thomas_on_three_processes() {
        let n = 5;
        let mut global = global_line(3 * n);
        let parts = ThreadComm::run(3, |comm| {
            let mesh = LocalMesh::new(MeshId(0), n, 1, 1);
            let solver = ParallelTri::new(&comm, mesh, SolverOptions::default()).unwrap();
            let local = slice(&global_line(3 * n), comm.rank() * n, n);
            solver.solve_systems(&[local]).unwrap()
        });
        global.fold_boundaries(Some(Default::default()), Some(Default::default()));
        let reference = thomas_solve(&global).unwrap();
        let x: Vec<Complex64> = parts.iter().flat_map(|p| p.x[0].clone()).collect();
        for (u, v) in x.iter().zip(&reference) {
            assert!((u - v).norm() < 1e-12);
        }
        assert!(parts[0].stats.converged);
        assert!(parts[0].stats.final_residual < 1e-12);
    }

    #[test]
    fn mismatched_mode_lengths_are_rejected() {
        let comm = SerialComm::new();
        let solver = ParallelTri::new(&comm, LocalMesh::new(MeshId(0), 4, 1, 2), SolverOptions::default()).unwrap();
        let result = solver.solve_systems(&[global_line(4), global_line(6)]);
        assert!(matches!(result, Err(TriError::ShapeMismatch { expected: 4, found: 6, .. })));
        let result = solver.solve_systems(&[global_line(4)]);
        assert!(matches!(result, Err(TriError::ShapeMismatch { what: "mode count", .. })));
    }

    #[test]
    fn field_entry_point_checks_tags() {
        let comm = SerialComm::new();
        let mesh = LocalMesh::new(MeshId(3), 4, 1, 2);
        let mut solver = ParallelTri::new(&comm, mesh.clone(), SolverOptions::default()).unwrap();
        let other = LocalMesh::new(MeshId(4), 4, 1, 2);
        assert!(matches!(solver.solve(&FieldPerp::zeros(&other, 0)), Err(TriError::MeshMismatch { .. })));
        assert!(matches!(
            solver.set_coef_ex(&Field2D::constant(&mesh, 1.0)),
            Err(TriError::Unsupported(_))
        ));
        let sol = solver.solve(&FieldPerp::zeros(&mesh, 0)).unwrap();
        assert!(sol.x.modes().all(|m| m.iter().all(|z| z.norm() == 0.0)));
    }
}
