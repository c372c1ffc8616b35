use num_complex::Complex64;
use partri::config::SolverOptions;
use partri::context::{LaplaceContext, SolverKind};
use partri::parallel::{Comm, ThreadComm};
use partri::solver::LaplaceSolver;
use partri::system::{FieldPerp, LocalMesh, MeshId};

fn main() {
    // solver kind from the command line: "paralleltri" or "paralleltrimg" (default)
    let kind: SolverKind = std::env::args()
        .nth(1)
        .map(|s| s.parse().unwrap())
        .unwrap_or_default();
    let (nprocs, nx, nmode) = (4, 16, 4);
    let n = (nprocs * nx) as f64;
    let dx = 1.0 / (n + 1.0);
    let lambda = (2.0 * (std::f64::consts::PI / (n + 1.0)).cos() - 2.0) / (dx * dx);
    let profile = |g: usize| (std::f64::consts::PI * (g + 1) as f64 / (n + 1.0)).sin();

    let results = ThreadComm::run(nprocs, |comm| {
        let mesh = LocalMesh::new(MeshId(0), nx, 1, nmode).with_spacing(dx, 2.0 * std::f64::consts::PI);
        let offset = comm.rank() * nx;
        let modes = (0..nmode).map(|_| (0..nx).map(|i| Complex64::new(profile(offset + i), 0.0)).collect()).collect();
        let rhs = FieldPerp::from_modes(&mesh, 0, modes).unwrap();

        let mut solver = LaplaceContext::new(kind, &comm, mesh.clone(), SolverOptions::default()).unwrap();
        let sol = solver.solve(&rhs).unwrap();

        // max error against the exact discrete solution
        let mut err: f64 = 0.0;
        for kz in 0..nmode {
            let k = mesh.wavenumber(kz);
            for (i, x) in sol.x.mode(kz).iter().enumerate() {
                err = err.max((*x - profile(offset + i) / (lambda - k * k)).norm());
            }
        }
        (comm.rank(), sol.stats, err)
    });

    println!("{kind} on {nprocs} ranks, {nx} points each, {nmode} modes");
    for (rank, stats, err) in results {
        println!("rank {rank}: stats = {stats:?}, max error = {err:.3e}");
    }
}
