//! Chunk coordinates, padded voxel dimensions, and raw voxel buffers.
#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

pub mod material;

/// Signed density at or above this value is solid; below it is air/liquid.
pub const ISO_LEVEL: f32 = 0.0;

/// Border voxels shared with each neighboring chunk on every side, so
/// surface extraction and light sampling can see one voxel past the
/// interior without cross-chunk queries.
pub const PAD: usize = 1;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkCoord {
    pub cx: i32,
    pub cz: i32,
}

impl ChunkCoord {
    #[inline]
    pub const fn new(cx: i32, cz: i32) -> Self {
        Self { cx, cz }
    }

    #[inline]
    pub fn offset(self, dx: i32, dz: i32) -> Self {
        Self {
            cx: self.cx + dx,
            cz: self.cz + dz,
        }
    }

    #[inline]
    pub fn distance_sq(self, other: ChunkCoord) -> i64 {
        let dx = i64::from(self.cx - other.cx);
        let dz = i64::from(self.cz - other.cz);
        dx * dx + dz * dz
    }
}

impl From<(i32, i32)> for ChunkCoord {
    fn from(value: (i32, i32)) -> Self {
        Self::new(value.0, value.1)
    }
}

impl From<ChunkCoord> for (i32, i32) {
    fn from(value: ChunkCoord) -> Self {
        (value.cx, value.cz)
    }
}

/// Padded chunk dimensions. `size_xz` and `size_y` include the `PAD`
/// border on every side; the interior spans `PAD..size-PAD`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkDims {
    pub size_xz: usize,
    pub size_y: usize,
}

impl ChunkDims {
    pub fn new(interior_xz: usize, interior_y: usize) -> Self {
        Self {
            size_xz: interior_xz + 2 * PAD,
            size_y: interior_y + 2 * PAD,
        }
    }

    #[inline]
    pub fn interior_xz(&self) -> usize {
        self.size_xz - 2 * PAD
    }

    #[inline]
    pub fn interior_y(&self) -> usize {
        self.size_y - 2 * PAD
    }

    #[inline]
    pub fn volume(&self) -> usize {
        self.size_xz * self.size_xz * self.size_y
    }

    /// Flat index into the padded buffers.
    #[inline]
    pub fn idx(&self, x: usize, y: usize, z: usize) -> usize {
        (y * self.size_xz + z) * self.size_xz + x
    }

    /// Inverse of `idx`.
    #[inline]
    pub fn coords_of(&self, idx: usize) -> (usize, usize, usize) {
        let x = idx % self.size_xz;
        let z = (idx / self.size_xz) % self.size_xz;
        let y = idx / (self.size_xz * self.size_xz);
        (x, y, z)
    }

    /// Flat index for interior-local coordinates (shifted past the border).
    #[inline]
    pub fn interior_idx(&self, lx: usize, ly: usize, lz: usize) -> usize {
        self.idx(lx + PAD, ly + PAD, lz + PAD)
    }

    #[inline]
    pub fn contains(&self, x: usize, y: usize, z: usize) -> bool {
        x < self.size_xz && y < self.size_y && z < self.size_xz
    }
}

/// A chunk's raw volumetric data. Buffer lengths are always
/// `dims.volume()`; constructors enforce this, never partial allocation.
#[derive(Clone, Debug)]
pub struct VoxelField {
    pub dims: ChunkDims,
    pub density: Vec<f32>,
    pub material: Vec<u8>,
    pub wetness: Option<Vec<u8>>,
    pub mossiness: Option<Vec<u8>>,
}

impl VoxelField {
    /// All-air field (density well below the iso level).
    pub fn new_empty(dims: ChunkDims) -> Self {
        let n = dims.volume();
        Self {
            dims,
            density: vec![-1.0; n],
            material: vec![material::MAT_AIR; n],
            wetness: None,
            mossiness: None,
        }
    }

    pub fn from_parts(dims: ChunkDims, density: Vec<f32>, material: Vec<u8>) -> Self {
        let n = dims.volume();
        let mut density = density;
        let mut material = material;
        if density.len() != n {
            density.resize(n, -1.0);
        }
        if material.len() != n {
            material.resize(n, material::MAT_AIR);
        }
        Self {
            dims,
            density,
            material,
            wetness: None,
            mossiness: None,
        }
    }

    pub fn with_surface_layers(mut self, wetness: Vec<u8>, mossiness: Vec<u8>) -> Self {
        let n = self.dims.volume();
        let mut wetness = wetness;
        let mut mossiness = mossiness;
        if wetness.len() != n {
            wetness.resize(n, 0);
        }
        if mossiness.len() != n {
            mossiness.resize(n, 0);
        }
        self.wetness = Some(wetness);
        self.mossiness = Some(mossiness);
        self
    }

    #[inline]
    pub fn idx(&self, x: usize, y: usize, z: usize) -> usize {
        self.dims.idx(x, y, z)
    }

    #[inline]
    pub fn density_at(&self, x: usize, y: usize, z: usize) -> f32 {
        self.density[self.dims.idx(x, y, z)]
    }

    #[inline]
    pub fn material_at(&self, x: usize, y: usize, z: usize) -> u8 {
        self.material[self.dims.idx(x, y, z)]
    }

    #[inline]
    pub fn is_solid(&self, x: usize, y: usize, z: usize) -> bool {
        self.density_at(x, y, z) >= ISO_LEVEL
    }

    #[inline]
    pub fn is_liquid(&self, x: usize, y: usize, z: usize) -> bool {
        !self.is_solid(x, y, z) && material::is_liquid(self.material_at(x, y, z))
    }

    pub fn has_solid(&self) -> bool {
        self.density.iter().any(|d| *d >= ISO_LEVEL)
    }
}
