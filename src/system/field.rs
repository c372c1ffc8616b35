//! Field containers exchanged with the surrounding mesh code.
//!
//! `Field2D` carries a real coefficient profile over the local radial points (plus one
//! guard cell on each side) for every slice. `FieldPerp` carries one spectrally
//! transformed slice: complex values indexed by (mode, local radial point). Both are
//! tagged with the cell location and mesh they were created for, and the solvers refuse
//! fields whose tags do not match their own configuration.

use num_complex::Complex64;

use crate::error::TriError;

/// Where on the cell the values of a field live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CellLocation {
    #[default]
    Centre,
    XLow,
}

/// Identifies the mesh a field was created on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshId(pub u64);

/// Local view of the partitioned mesh as seen by one process of the radial line.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalMesh {
    pub id: MeshId,
    pub location: CellLocation,
    /// Radial points owned by this process.
    pub nx: usize,
    /// Number of slices.
    pub ny: usize,
    /// Number of spectral modes solved per slice.
    pub nmode: usize,
    /// Uniform radial spacing.
    pub dx: f64,
    /// Length of the periodic direction; mode `kz` has wavenumber `2π·kz/zlength`.
    pub zlength: f64,
}

impl LocalMesh {
    pub fn new(id: MeshId, nx: usize, ny: usize, nmode: usize) -> Self {
        Self {
            id,
            location: CellLocation::Centre,
            nx,
            ny,
            nmode,
            dx: 1.0,
            zlength: 2.0 * std::f64::consts::PI,
        }
    }

    pub fn with_spacing(mut self, dx: f64, zlength: f64) -> Self {
        self.dx = dx;
        self.zlength = zlength;
        self
    }

    pub fn at(mut self, location: CellLocation) -> Self {
        self.location = location;
        self
    }

    pub fn wavenumber(&self, kz: usize) -> f64 {
        2.0 * std::f64::consts::PI * kz as f64 / self.zlength
    }

    pub fn validate(&self) -> Result<(), TriError> {
        if self.nx == 0 {
            return Err(TriError::ShapeMismatch { what: "local radial extent", expected: 1, found: 0 });
        }
        if self.nmode == 0 {
            return Err(TriError::ShapeMismatch { what: "mode count", expected: 1, found: 0 });
        }
        if !(self.dx > 0.0) || !(self.zlength > 0.0) {
            return Err(TriError::InvalidOption {
                key: "mesh".into(),
                reason: "dx and zlength must be positive".into(),
            });
        }
        Ok(())
    }

    /// Fail unless a field with these tags belongs to this mesh and location.
    pub fn check_tags(&self, location: CellLocation, mesh: MeshId) -> Result<(), TriError> {
        if location != self.location {
            return Err(TriError::LocationMismatch { expected: self.location, found: location });
        }
        if mesh != self.id {
            return Err(TriError::MeshMismatch { expected: self.id.0, found: mesh.0 });
        }
        Ok(())
    }
}

/// Real profile over (slice, local radial point), with one radial guard cell per side.
#[derive(Debug, Clone, PartialEq)]
pub struct Field2D {
    location: CellLocation,
    mesh: MeshId,
    nx: usize,
    ny: usize,
    /// Slice-major, `nx + 2` values per slice, guard cells included.
    data: Vec<f64>,
}

impl Field2D {
    pub const GUARDS: usize = 1;

    pub fn new(mesh: &LocalMesh, data: Vec<f64>) -> Result<Self, TriError> {
        let expected = (mesh.nx + 2 * Self::GUARDS) * mesh.ny;
        if data.len() != expected {
            return Err(TriError::ShapeMismatch { what: "Field2D data", expected, found: data.len() });
        }
        Ok(Self { location: mesh.location, mesh: mesh.id, nx: mesh.nx, ny: mesh.ny, data })
    }

    pub fn constant(mesh: &LocalMesh, value: f64) -> Self {
        Self::from_fn(mesh, |_, _| value)
    }

    /// Build from a function of (local radial index, slice); the index runs from -1 to `nx`.
    pub fn from_fn(mesh: &LocalMesh, f: impl Fn(isize, usize) -> f64) -> Self {
        let width = mesh.nx + 2 * Self::GUARDS;
        let mut data = Vec::with_capacity(width * mesh.ny);
        for jy in 0..mesh.ny {
            for ix in 0..width {
                data.push(f(ix as isize - Self::GUARDS as isize, jy));
            }
        }
        Self { location: mesh.location, mesh: mesh.id, nx: mesh.nx, ny: mesh.ny, data }
    }

    pub fn relocated(mut self, location: CellLocation) -> Self {
        self.location = location;
        self
    }

    pub fn location(&self) -> CellLocation {
        self.location
    }
    pub fn mesh(&self) -> MeshId {
        self.mesh
    }
    pub fn nx(&self) -> usize {
        self.nx
    }
    pub fn ny(&self) -> usize {
        self.ny
    }

    /// Value at local radial index `ix` (`-1..=nx`) on slice `jy`.
    pub fn at(&self, ix: isize, jy: usize) -> f64 {
        let width = self.nx + 2 * Self::GUARDS;
        let col = (ix + Self::GUARDS as isize) as usize;
        debug_assert!(col < width && jy < self.ny);
        self.data[jy * width + col]
    }
}

/// One spectrally transformed slice: complex values per (mode, local radial point).
#[derive(Debug, Clone, PartialEq)]
pub struct FieldPerp {
    location: CellLocation,
    mesh: MeshId,
    jy: usize,
    nmode: usize,
    nx: usize,
    /// Mode-major.
    data: Vec<Complex64>,
}

impl FieldPerp {
    pub fn zeros(mesh: &LocalMesh, jy: usize) -> Self {
        Self {
            location: mesh.location,
            mesh: mesh.id,
            jy,
            nmode: mesh.nmode,
            nx: mesh.nx,
            data: vec![Complex64::new(0.0, 0.0); mesh.nmode * mesh.nx],
        }
    }

    pub fn from_modes(mesh: &LocalMesh, jy: usize, modes: Vec<Vec<Complex64>>) -> Result<Self, TriError> {
        if modes.len() != mesh.nmode {
            return Err(TriError::ShapeMismatch { what: "FieldPerp modes", expected: mesh.nmode, found: modes.len() });
        }
        let mut field = Self::zeros(mesh, jy);
        for (kz, values) in modes.into_iter().enumerate() {
            if values.len() != mesh.nx {
                return Err(TriError::ShapeMismatch { what: "FieldPerp mode length", expected: mesh.nx, found: values.len() });
            }
            field.mode_mut(kz).copy_from_slice(&values);
        }
        Ok(field)
    }

    pub fn location(&self) -> CellLocation {
        self.location
    }
    pub fn mesh(&self) -> MeshId {
        self.mesh
    }
    pub fn jy(&self) -> usize {
        self.jy
    }
    pub fn nmode(&self) -> usize {
        self.nmode
    }
    pub fn nx(&self) -> usize {
        self.nx
    }

    pub fn mode(&self, kz: usize) -> &[Complex64] {
        &self.data[kz * self.nx..(kz + 1) * self.nx]
    }

    pub fn mode_mut(&mut self, kz: usize) -> &mut [Complex64] {
        &mut self.data[kz * self.nx..(kz + 1) * self.nx]
    }

    pub fn modes(&self) -> impl Iterator<Item = &[Complex64]> {
        self.data.chunks_exact(self.nx)
    }

    /// Check that this slice matches the mesh's location, tag and shape.
    pub fn check_against(&self, mesh: &LocalMesh) -> Result<(), TriError> {
        mesh.check_tags(self.location, self.mesh)?;
        if self.nx != mesh.nx {
            return Err(TriError::ShapeMismatch { what: "FieldPerp radial extent", expected: mesh.nx, found: self.nx });
        }
        if self.nmode != mesh.nmode {
            return Err(TriError::ShapeMismatch { what: "FieldPerp modes", expected: mesh.nmode, found: self.nmode });
        }
        if self.jy >= mesh.ny {
            return Err(TriError::ShapeMismatch { what: "FieldPerp slice index", expected: mesh.ny, found: self.jy });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mesh() -> LocalMesh {
        LocalMesh::new(MeshId(7), 4, 2, 3)
    }

    #[test]
    fn field2d_indexes_guard_cells() {
        let m = mesh();
        let f = Field2D::from_fn(&m, |ix, jy| ix as f64 + 10.0 * jy as f64);
        assert_eq!(f.at(-1, 0), -1.0);
        assert_eq!(f.at(4, 1), 14.0);
        assert!(Field2D::new(&m, vec![0.0; 3]).is_err());
    }

    #[test]
    fn tags_are_checked() {
        let m = mesh();
        assert!(m.check_tags(CellLocation::Centre, MeshId(7)).is_ok());
        assert!(matches!(m.check_tags(CellLocation::XLow, MeshId(7)), Err(TriError::LocationMismatch { .. })));
        assert!(matches!(m.check_tags(CellLocation::Centre, MeshId(8)), Err(TriError::MeshMismatch { .. })));
    }

    #[test]
    fn field_perp_shapes() {
        let m = mesh();
        let z = Complex64::new(1.0, -1.0);
        let f = FieldPerp::from_modes(&m, 1, vec![vec![z; 4]; 3]).unwrap();
        assert_eq!(f.mode(2), &[z; 4]);
        assert!(f.check_against(&m).is_ok());
        assert!(FieldPerp::from_modes(&m, 0, vec![vec![z; 3]; 3]).is_err());
        assert!(FieldPerp::zeros(&m, 5).check_against(&m).is_err());
    }
}
