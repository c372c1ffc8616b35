//! Coefficient storage and assembly of the per-mode tridiagonal rows.
//!
//! The operator is `D ∇²_⊥ x + (1/C) ∇_⊥C · ∇_⊥x + A x = rhs`, discretised with second-order
//! central differences in the radial direction and spectrally in the periodic one.

use num_complex::Complex64;

use super::field::{Field2D, FieldPerp, LocalMesh};
use super::TridiagonalSystem;
use crate::error::TriError;

/// The three coefficient profiles, tagged with a generation that changes on every update.
#[derive(Debug, Clone)]
pub struct LaplaceCoefficients {
    a: Field2D,
    c: Field2D,
    d: Field2D,
    generation: u64,
}

impl LaplaceCoefficients {
    /// Defaults `A = 0`, `C = 1`, `D = 1`: the plain perpendicular Laplacian.
    pub fn new(mesh: &LocalMesh) -> Self {
        Self {
            a: Field2D::constant(mesh, 0.0),
            c: Field2D::constant(mesh, 1.0),
            d: Field2D::constant(mesh, 1.0),
            generation: 0,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn set_a(&mut self, mesh: &LocalMesh, val: &Field2D) -> Result<(), TriError> {
        Self::check(mesh, val)?;
        self.a = val.clone();
        self.generation += 1;
        Ok(())
    }

    pub fn set_c(&mut self, mesh: &LocalMesh, val: &Field2D) -> Result<(), TriError> {
        Self::check(mesh, val)?;
        if (0..mesh.nx as isize).any(|ix| (0..mesh.ny).any(|jy| val.at(ix, jy) == 0.0)) {
            return Err(TriError::InvalidOption { key: "C".into(), reason: "coefficient must be non-zero".into() });
        }
        self.c = val.clone();
        self.generation += 1;
        Ok(())
    }

    pub fn set_d(&mut self, mesh: &LocalMesh, val: &Field2D) -> Result<(), TriError> {
        Self::check(mesh, val)?;
        self.d = val.clone();
        self.generation += 1;
        Ok(())
    }

    fn check(mesh: &LocalMesh, val: &Field2D) -> Result<(), TriError> {
        mesh.check_tags(val.location(), val.mesh())?;
        if val.nx() != mesh.nx || val.ny() != mesh.ny {
            return Err(TriError::ShapeMismatch {
                what: "coefficient field",
                expected: mesh.nx * mesh.ny,
                found: val.nx() * val.ny(),
            });
        }
        Ok(())
    }

    /// Local systems of every mode on slice `rhs.jy()`, before boundary folding.
    pub fn assemble(&self, mesh: &LocalMesh, rhs: &FieldPerp) -> Result<Vec<TridiagonalSystem>, TriError> {
        rhs.check_against(mesh)?;
        let jy = rhs.jy();
        let dx = mesh.dx;
        let inv_dx2 = 1.0 / (dx * dx);
        let n = mesh.nx;

        // Mode-independent parts: off-diagonals and the k = 0 diagonal.
        let mut lower = Vec::with_capacity(n);
        let mut upper = Vec::with_capacity(n);
        let mut diag0 = Vec::with_capacity(n);
        let mut dcoef = Vec::with_capacity(n);
        for i in 0..n as isize {
            let d = self.d.at(i, jy);
            let g = (self.c.at(i + 1, jy) - self.c.at(i - 1, jy)) / (2.0 * dx * self.c.at(i, jy));
            lower.push(Complex64::new(d * inv_dx2 - g / (2.0 * dx), 0.0));
            upper.push(Complex64::new(d * inv_dx2 + g / (2.0 * dx), 0.0));
            diag0.push(-2.0 * d * inv_dx2 + self.a.at(i, jy));
            dcoef.push(d);
        }

        (0..mesh.nmode)
            .map(|kz| {
                let k = mesh.wavenumber(kz);
                let b = diag0
                    .iter()
                    .zip(&dcoef)
                    .map(|(b0, d)| Complex64::new(b0 - d * k * k, 0.0))
                    .collect();
                TridiagonalSystem::new(lower.clone(), b, upper.clone(), rhs.mode(kz).to_vec())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::field::{CellLocation, MeshId};
    use approx::assert_abs_diff_eq;

    fn mesh() -> LocalMesh {
        LocalMesh::new(MeshId(1), 4, 1, 2).with_spacing(0.5, 2.0 * std::f64::consts::PI)
    }

    #[test]
    fn defaults_give_the_laplacian() {
        let m = mesh();
        let coefs = LaplaceCoefficients::new(&m);
        let rhs = FieldPerp::zeros(&m, 0);
        let systems = coefs.assemble(&m, &rhs).unwrap();
        assert_eq!(systems.len(), 2);
        // dx = 0.5 → 1/dx² = 4; mode 1 has k = 1.
        assert_abs_diff_eq!(systems[0].a[1].re, 4.0);
        assert_abs_diff_eq!(systems[0].b[1].re, -8.0);
        assert_abs_diff_eq!(systems[1].b[1].re, -9.0);
        assert_abs_diff_eq!(systems[1].c[3].re, 4.0);
    }

    #[test]
    fn gradient_of_c_skews_the_off_diagonals() {
        let m = mesh();
        let mut coefs = LaplaceCoefficients::new(&m);
        coefs.set_c(&m, &Field2D::from_fn(&m, |ix, _| 1.0 + ix as f64)).unwrap();
        let systems = coefs.assemble(&m, &FieldPerp::zeros(&m, 0)).unwrap();
        // i = 1: C = 2, dC/dx = 2, g = 1 → a = 4 - 1, c = 4 + 1.
        assert_abs_diff_eq!(systems[0].a[1].re, 3.0);
        assert_abs_diff_eq!(systems[0].c[1].re, 5.0);
    }

    #[test]
    fn setters_check_tags_and_bump_generation() {
        let m = mesh();
        let mut coefs = LaplaceCoefficients::new(&m);
        assert!(coefs.set_a(&m, &Field2D::constant(&m, 2.0)).is_ok());
        assert_eq!(coefs.generation(), 1);
        let wrong = Field2D::constant(&m, 1.0).relocated(CellLocation::XLow);
        assert!(matches!(coefs.set_d(&m, &wrong), Err(TriError::LocationMismatch { .. })));
        assert_eq!(coefs.generation(), 1);
        assert!(coefs.set_c(&m, &Field2D::constant(&m, 0.0)).is_err());
    }
}
