//! Physics collider derivation.
//!
//! When the solid/air boundary is a single-valued function of (x, z) the
//! collider is a heightfield sample grid; any overhang or cave switches it
//! to an explicit triangle mesh. A non-heightfield collider with vertices
//! always carries a non-empty index buffer whose entries are all in range;
//! the physics integration downstream cannot tolerate anything else.

use grove_voxel::{ISO_LEVEL, PAD, VoxelField};
use log::debug;

use crate::surface::SurfaceMesh;

#[derive(Clone, Debug, Default)]
pub struct ChunkCollider {
    pub is_heightfield: bool,
    /// `hx * hz` interpolated surface heights, row-major over interior
    /// columns; only meaningful when `is_heightfield`.
    pub heights: Vec<f32>,
    pub hx: usize,
    pub hz: usize,
    /// Triangle mesh, only meaningful when `!is_heightfield`.
    pub positions: Vec<f32>,
    pub indices: Vec<u32>,
}

impl ChunkCollider {
    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }

    /// Index-validity check the physics layer relies on.
    pub fn is_valid(&self) -> bool {
        if self.is_heightfield {
            return self.heights.len() == self.hx * self.hz;
        }
        if self.positions.is_empty() {
            return self.indices.is_empty();
        }
        !self.indices.is_empty()
            && self
                .indices
                .iter()
                .all(|i| (*i as usize) < self.vertex_count())
    }
}

pub fn derive_collider(field: &VoxelField, surface: &SurfaceMesh) -> ChunkCollider {
    if column_profile_is_single_valued(field) || surface.is_empty() {
        heightfield_collider(field)
    } else {
        debug!("overhangs present, emitting trimesh collider");
        let collider = ChunkCollider {
            is_heightfield: false,
            positions: surface.positions.clone(),
            indices: surface.indices.clone(),
            ..ChunkCollider::default()
        };
        debug_assert!(collider.is_valid());
        collider
    }
}

/// True when every interior column is air all the way down to its first
/// solid voxel and solid below it, i.e. no overhangs or caves.
fn column_profile_is_single_valued(field: &VoxelField) -> bool {
    let dims = field.dims;
    for z in PAD..dims.size_xz - PAD {
        for x in PAD..dims.size_xz - PAD {
            let mut seen_solid = false;
            for y in (0..dims.size_y).rev() {
                let solid = field.density_at(x, y, z) >= ISO_LEVEL;
                if solid {
                    seen_solid = true;
                } else if seen_solid {
                    return false;
                }
            }
        }
    }
    true
}

fn heightfield_collider(field: &VoxelField) -> ChunkCollider {
    let dims = field.dims;
    let n = dims.interior_xz();
    let mut heights = vec![0.0f32; n * n];
    for lz in 0..n {
        for lx in 0..n {
            let x = lx + PAD;
            let z = lz + PAD;
            heights[lz * n + lx] = column_surface_height(field, x, z);
        }
    }
    let collider = ChunkCollider {
        is_heightfield: true,
        heights,
        hx: n,
        hz: n,
        ..ChunkCollider::default()
    };
    debug_assert!(collider.is_valid());
    collider
}

/// Interpolated iso-crossing height of a column in interior-local space,
/// 0 when the column holds no solid voxel.
fn column_surface_height(field: &VoxelField, x: usize, z: usize) -> f32 {
    let dims = field.dims;
    for y in (0..dims.size_y).rev() {
        let d = field.density_at(x, y, z);
        if d >= ISO_LEVEL {
            if y + 1 >= dims.size_y {
                return (y + 1 - PAD) as f32;
            }
            let above = field.density_at(x, y + 1, z);
            let t = if (d - above).abs() > f32::EPSILON {
                ((d - ISO_LEVEL) / (d - above)).clamp(0.0, 1.0)
            } else {
                0.0
            };
            return y as f32 - PAD as f32 + t;
        }
    }
    0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::extract_surface;
    use grove_voxel::ChunkDims;

    fn field_with(dims: ChunkDims, f: &dyn Fn(usize, usize, usize) -> f32) -> VoxelField {
        let mut vf = VoxelField::new_empty(dims);
        for y in 0..dims.size_y {
            for z in 0..dims.size_xz {
                for x in 0..dims.size_xz {
                    vf.density[dims.idx(x, y, z)] = f(x, y, z);
                }
            }
        }
        vf
    }

    #[test]
    fn flat_terrain_becomes_heightfield() {
        let dims = ChunkDims::new(8, 8);
        let field = field_with(dims, &|_, y, _| 4.5 - y as f32);
        let surface = extract_surface(&field);
        let collider = derive_collider(&field, &surface);
        assert!(collider.is_heightfield);
        assert!(collider.is_valid());
        assert_eq!(collider.heights.len(), 64);
        // Iso crossing sits midway between padded y=4 and y=5, which is
        // interior-local 3.5.
        for h in &collider.heights {
            assert!((h - 3.5).abs() < 1e-4, "height {h}");
        }
    }

    #[test]
    fn cave_switches_to_trimesh() {
        let dims = ChunkDims::new(8, 8);
        // Solid slab with a hollow pocket inside.
        let field = field_with(dims, &|x, y, z| {
            if (3..=5).contains(&x) && (3..=5).contains(&z) && (2..=3).contains(&y) {
                -1.0
            } else if y < 6 {
                1.0
            } else {
                -1.0
            }
        });
        let surface = extract_surface(&field);
        let collider = derive_collider(&field, &surface);
        assert!(!collider.is_heightfield);
        assert!(!collider.positions.is_empty());
        assert!(!collider.indices.is_empty());
        assert!(collider.is_valid());
        for i in &collider.indices {
            assert!((*i as usize) < collider.vertex_count());
        }
    }

    #[test]
    fn all_air_yields_valid_empty_heightfield() {
        let dims = ChunkDims::new(8, 8);
        let field = VoxelField::new_empty(dims);
        let surface = extract_surface(&field);
        let collider = derive_collider(&field, &surface);
        assert!(collider.is_heightfield);
        assert!(collider.is_valid());
        assert!(collider.heights.iter().all(|h| *h == 0.0));
    }

    #[test]
    fn determinism() {
        let dims = ChunkDims::new(8, 8);
        let field = field_with(dims, &|x, y, z| {
            ((x * 13 + z * 29 + y * 5) % 11) as f32 - 5.0
        });
        let surface = extract_surface(&field);
        let a = derive_collider(&field, &surface);
        let b = derive_collider(&field, &surface);
        assert_eq!(a.is_heightfield, b.is_heightfield);
        assert_eq!(a.positions, b.positions);
        assert_eq!(a.indices, b.indices);
        assert_eq!(a.heights, b.heights);
    }
}
