//! Water surface mesh and shoreline mask.

use grove_voxel::{PAD, VoxelField};

/// How far below the voxel top the rendered water plane sits.
const WATER_SURFACE_DROP: f32 = 0.1;

/// Shoreline fade width in columns.
const SHORE_FADE: f32 = 4.0;

/// Independently indexed water surface mesh plus a per-column shoreline
/// distance mask. The mask is 0 at the water/land boundary rising to 1 in
/// open water, so a shader can fade alpha near shorelines without any
/// runtime search.
#[derive(Clone, Debug, Default)]
pub struct WaterMesh {
    pub positions: Vec<f32>,
    pub normals: Vec<f32>,
    pub indices: Vec<u32>,
    /// `shore_nx * shore_nz` values over the chunk interior columns.
    pub shoreline: Vec<f32>,
    pub shore_nx: usize,
    pub shore_nz: usize,
}

impl WaterMesh {
    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

pub fn extract_water(field: &VoxelField) -> WaterMesh {
    let dims = field.dims;
    let n = dims.interior_xz();
    let mut mesh = WaterMesh {
        shore_nx: n,
        shore_nz: n,
        shoreline: Vec::new(),
        ..WaterMesh::default()
    };

    // Top-facing quad per column at the highest water voxel open to air.
    let mut has_water = vec![false; n * n];
    for lz in 0..n {
        for lx in 0..n {
            let x = lx + PAD;
            let z = lz + PAD;
            let mut column_has_water = false;
            let mut surface_y: Option<usize> = None;
            for y in (0..dims.size_y - 1).rev() {
                if field.is_liquid(x, y, z) {
                    column_has_water = true;
                    if !field.is_solid(x, y + 1, z) && !field.is_liquid(x, y + 1, z) {
                        surface_y = Some(y);
                        break;
                    }
                }
            }
            has_water[lz * n + lx] = column_has_water;
            if let Some(y) = surface_y {
                let top = (y + 1) as f32 - PAD as f32 - WATER_SURFACE_DROP;
                push_top_quad(&mut mesh, lx as f32, top, lz as f32);
            }
        }
    }

    mesh.shoreline = shoreline_mask(&has_water, n);
    mesh
}

fn push_top_quad(mesh: &mut WaterMesh, x: f32, y: f32, z: f32) {
    let base = mesh.vertex_count() as u32;
    for (dx, dz) in [(0.0, 0.0), (0.0, 1.0), (1.0, 1.0), (1.0, 0.0)] {
        mesh.positions.extend_from_slice(&[x + dx, y, z + dz]);
        mesh.normals.extend_from_slice(&[0.0, 1.0, 0.0]);
    }
    mesh.indices
        .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
}

/// Two-pass chamfer distance transform from water columns that border a
/// non-water column, normalized by the fade width.
fn shoreline_mask(has_water: &[bool], n: usize) -> Vec<f32> {
    if n == 0 {
        return Vec::new();
    }
    const INF: f32 = 1e9;
    let mut dist = vec![INF; n * n];
    for z in 0..n {
        for x in 0..n {
            if !has_water[z * n + x] {
                continue;
            }
            let mut boundary = x == 0 || z == 0 || x == n - 1 || z == n - 1;
            if !boundary {
                for (dx, dz) in [(-1i64, 0i64), (1, 0), (0, -1), (0, 1)] {
                    let nx = (x as i64 + dx) as usize;
                    let nz = (z as i64 + dz) as usize;
                    if !has_water[nz * n + nx] {
                        boundary = true;
                        break;
                    }
                }
            }
            if boundary {
                dist[z * n + x] = 0.0;
            }
        }
    }
    const DIAG: f32 = std::f32::consts::SQRT_2;
    // Forward sweep.
    for z in 0..n {
        for x in 0..n {
            let mut d = dist[z * n + x];
            if x > 0 {
                d = d.min(dist[z * n + x - 1] + 1.0);
            }
            if z > 0 {
                d = d.min(dist[(z - 1) * n + x] + 1.0);
                if x > 0 {
                    d = d.min(dist[(z - 1) * n + x - 1] + DIAG);
                }
                if x < n - 1 {
                    d = d.min(dist[(z - 1) * n + x + 1] + DIAG);
                }
            }
            dist[z * n + x] = d;
        }
    }
    // Backward sweep.
    for z in (0..n).rev() {
        for x in (0..n).rev() {
            let mut d = dist[z * n + x];
            if x < n - 1 {
                d = d.min(dist[z * n + x + 1] + 1.0);
            }
            if z < n - 1 {
                d = d.min(dist[(z + 1) * n + x] + 1.0);
                if x < n - 1 {
                    d = d.min(dist[(z + 1) * n + x + 1] + DIAG);
                }
                if x > 0 {
                    d = d.min(dist[(z + 1) * n + x - 1] + DIAG);
                }
            }
            dist[z * n + x] = d;
        }
    }
    (0..n * n)
        .map(|i| {
            if has_water[i] {
                (dist[i] / SHORE_FADE).clamp(0.0, 1.0)
            } else {
                0.0
            }
        })
        .collect()
}
