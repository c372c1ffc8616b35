//! Multigrid and direct solves on N in-process ranks vs a serial Thomas solve of the whole line.
//!
//! Each test builds one random, diagonally dominant complex tridiagonal system for the whole
//! radial line, hands every rank its contiguous chunk and compares the concatenated local
//! solutions with the serial reference.

use approx::assert_abs_diff_eq;
use num_complex::Complex64;
use partri::config::{BoundaryFlags, RelaxationKind, SolverOptions};
use partri::parallel::{Comm, SerialComm, ThreadComm};
use partri::solver::{LaplaceSolver, ParallelTri, ParallelTriMg};
use partri::system::{thomas_solve, LocalMesh, MeshId, TridiagonalSystem};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Random line with `|b_i| >= |a_i| + |c_i| + 1`.
fn random_line(len: usize, seed: u64) -> TridiagonalSystem {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut z = |scale: f64| Complex64::new(rng.gen_range(-scale..scale), rng.gen_range(-scale..scale));
    let a: Vec<Complex64> = (0..len).map(|_| z(1.0)).collect();
    let c: Vec<Complex64> = (0..len).map(|_| z(1.0)).collect();
    let r: Vec<Complex64> = (0..len).map(|_| z(2.0)).collect();
    let b = (0..len)
        .map(|i| {
            let phase = z(std::f64::consts::PI).re;
            Complex64::from_polar(a[i].norm() + c[i].norm() + 1.0 + z(1.0).re.abs(), phase)
        })
        .collect();
    TridiagonalSystem::new(a, b, c, r).unwrap()
}

fn chunk(global: &TridiagonalSystem, rank: usize, n: usize) -> TridiagonalSystem {
    let s = rank * n..(rank + 1) * n;
    TridiagonalSystem::new(
        global.a[s.clone()].to_vec(),
        global.b[s.clone()].to_vec(),
        global.c[s.clone()].to_vec(),
        global.r[s].to_vec(),
    )
    .unwrap()
}

fn reference(global: &TridiagonalSystem, inner: BoundaryFlags, outer: BoundaryFlags) -> Vec<Complex64> {
    let mut g = global.clone();
    g.fold_boundaries(Some(inner), Some(outer));
    thomas_solve(&g).unwrap()
}

fn assert_close(x: &[Complex64], y: &[Complex64], eps: f64) {
    assert_eq!(x.len(), y.len());
    for (u, v) in x.iter().zip(y) {
        assert_abs_diff_eq!(u.re, v.re, epsilon = eps);
        assert_abs_diff_eq!(u.im, v.im, epsilon = eps);
    }
}

fn tight() -> SolverOptions {
    SolverOptions::default().with_tolerances(1e-12, 1e-300).with_maxits(50)
}

#[test]
fn single_process_matches_thomas() {
    let global = random_line(24, 1);
    let comm = SerialComm::new();
    let mut solver = ParallelTriMg::new(&comm, LocalMesh::new(MeshId(0), 24, 1, 1), tight()).unwrap();
    let sol = solver.solve_systems(0, &[global.clone()], None).unwrap();
    let expected = reference(&global, BoundaryFlags::empty(), BoundaryFlags::empty());
    assert_close(&sol.x[0], &expected, 1e-12);
    assert_eq!(sol.stats.iterations, 0);
}

#[test]
fn multigrid_matches_thomas_for_several_process_counts() {
    let n = 6;
    let nmode = 3;
    for nprocs in [2, 3, 4, 5, 8] {
        let globals: Vec<TridiagonalSystem> = (0..nmode).map(|m| random_line(nprocs * n, 10 * nprocs as u64 + m as u64)).collect();
        let parts = ThreadComm::run(nprocs, |comm| {
            let mesh = LocalMesh::new(MeshId(0), n, 1, nmode);
            let mut solver = ParallelTriMg::new(&comm, mesh, tight()).unwrap();
            let local: Vec<TridiagonalSystem> = globals.iter().map(|g| chunk(g, comm.rank(), n)).collect();
            solver.solve_systems(0, &local, None).unwrap()
        });
        for (m, global) in globals.iter().enumerate() {
            let x: Vec<Complex64> = parts.iter().flat_map(|p| p.x[m].clone()).collect();
            assert_close(&x, &reference(global, BoundaryFlags::empty(), BoundaryFlags::empty()), 1e-10);
        }
        for p in &parts {
            assert!(p.stats.converged, "{nprocs} processes: {:?}", p.stats);
            assert_eq!(p.stats.iterations, parts[0].stats.iterations);
        }
    }
}

#[test]
fn smoothers_agree_on_a_shallow_hierarchy() {
    let (n, nprocs) = (5, 6);
    let global = random_line(n * nprocs, 77);
    let expected = reference(&global, BoundaryFlags::empty(), BoundaryFlags::empty());
    for kind in [RelaxationKind::Jacobi, RelaxationKind::GaussSeidel, RelaxationKind::RedBlack] {
        let parts = ThreadComm::run(nprocs, |comm| {
            let options = SolverOptions::default()
                .with_max_level(1)
                .with_tolerances(1e-11, 1e-300)
                .with_maxits(500)
                .with_relaxation(kind);
            let mut solver = ParallelTriMg::new(&comm, LocalMesh::new(MeshId(0), n, 1, 1), options).unwrap();
            let sol = solver.solve_systems(0, &[chunk(&global, comm.rank(), n)], None).unwrap();
            (sol, solver.levels_info(0).unwrap())
        });
        let x: Vec<Complex64> = parts.iter().flat_map(|(p, _)| p.x[0].clone()).collect();
        assert_close(&x, &expected, 1e-8);
        let (sol, info) = &parts[0];
        assert!(sol.stats.converged, "{kind}: {:?}", sol.stats);
        assert_eq!(info.len(), 2);
        assert_eq!(info[1].blocks, 3);
    }
}

#[test]
fn direct_variant_matches_thomas_with_boundary_flags() {
    let (n, nprocs) = (7, 4);
    let global = random_line(n * nprocs, 5);
    let (inner, outer) = (BoundaryFlags::NEUMANN, BoundaryFlags::DIRICHLET_CELL);
    let expected = reference(&global, inner, outer);
    let parts = ThreadComm::run(nprocs, |comm| {
        let options = tight().with_boundaries(inner, outer);
        let mesh = LocalMesh::new(MeshId(0), n, 1, 1);
        let direct = ParallelTri::new(&comm, mesh.clone(), options.clone()).unwrap();
        let mut mg = ParallelTriMg::new(&comm, mesh, options).unwrap();
        let local = [chunk(&global, comm.rank(), n)];
        (direct.solve_systems(&local).unwrap(), mg.solve_systems(0, &local, None).unwrap())
    });
    let direct: Vec<Complex64> = parts.iter().flat_map(|(d, _)| d.x[0].clone()).collect();
    let mg: Vec<Complex64> = parts.iter().flat_map(|(_, m)| m.x[0].clone()).collect();
    assert_close(&direct, &expected, 1e-11);
    assert_close(&mg, &expected, 1e-10);
}

#[test]
fn previous_timestep_and_explicit_guess_skip_the_cycles() {
    let (n, nprocs) = (6, 4);
    let global = random_line(n * nprocs, 3);
    let expected = reference(&global, BoundaryFlags::empty(), BoundaryFlags::empty());
    let parts = ThreadComm::run(nprocs, |comm| {
        let options = SolverOptions::default().with_previous_timestep(true);
        let mut solver = ParallelTriMg::new(&comm, LocalMesh::new(MeshId(0), n, 1, 1), options).unwrap();
        let local = [chunk(&global, comm.rank(), n)];
        let first = solver.solve_systems(0, &local, None).unwrap();
        let second = solver.solve_systems(0, &local, None).unwrap();
        let guess = vec![expected[comm.rank() * n..(comm.rank() + 1) * n].to_vec()];
        solver.reset();
        let guessed = solver.solve_systems(0, &local, Some(&guess)).unwrap();
        (first.stats.iterations, second.stats.iterations, guessed.stats.iterations, solver.mean_iterations())
    });
    for (first, second, guessed, mean) in parts {
        assert!(first >= 1);
        assert_eq!(second, 0);
        assert_eq!(guessed, 0);
        assert_abs_diff_eq!(mean, first as f64 / 3.0);
    }
}

#[test]
fn weak_diagonal_falls_back_to_the_zero_guess() {
    let (n, nprocs) = (6, 3);
    let one = Complex64::new(1.0, 0.0);
    let len = n * nprocs;
    let mut b = vec![Complex64::new(-4.0, 0.0); len];
    b[n + 2] = Complex64::new(1.9, 0.0);
    let r = (0..len).map(|i| Complex64::new((i as f64).sin(), 0.0)).collect();
    let global = TridiagonalSystem::new(vec![one; len], b, vec![one; len], r).unwrap();
    let expected = reference(&global, BoundaryFlags::empty(), BoundaryFlags::empty());
    let parts = ThreadComm::run(nprocs, |comm| {
        let mut solver = ParallelTriMg::new(&comm, LocalMesh::new(MeshId(0), n, 1, 1), tight()).unwrap();
        let local = [chunk(&global, comm.rank(), n)];
        solver.solve_systems(0, &local, None).unwrap();
        let again = solver.solve_systems(0, &local, None).unwrap();
        (again, solver.diagnostics().dominance_fallbacks)
    });
    let x: Vec<Complex64> = parts.iter().flat_map(|(s, _)| s.x[0].clone()).collect();
    assert_close(&x, &expected, 1e-10);
    let fallbacks: Vec<usize> = parts.iter().map(|(_, f)| *f).collect();
    assert_eq!(fallbacks, vec![0, 1, 0]);
}
