//! Surface-nets style iso-surface extraction.
//!
//! One vertex per sign-changing cell, placed at the mean of the cell's
//! edge crossings, quads emitted across every sign-changing lattice edge
//! whose four adjacent cells all lie inside the padded volume. A field
//! with no iso crossing strictly inside the padded volume yields an empty
//! mesh.

use grove_geom::{Aabb, Vec3};
use grove_voxel::{ISO_LEVEL, PAD, VoxelField};

/// Flat surface mesh buffers, one entry set per vertex. `material_ids` and
/// `material_weights` carry four channels per vertex for smooth
/// multi-material blending at a single vertex.
#[derive(Clone, Debug, Default)]
pub struct SurfaceMesh {
    pub positions: Vec<f32>,
    pub normals: Vec<f32>,
    pub indices: Vec<u32>,
    pub material_ids: Vec<u8>,
    pub material_weights: Vec<f32>,
    pub wetness: Vec<f32>,
    pub mossiness: Vec<f32>,
    pub cavity: Vec<f32>,
    pub bounds: Aabb,
}

impl SurfaceMesh {
    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty() && self.indices.is_empty()
    }
}

const CORNERS: [(usize, usize, usize); 8] = [
    (0, 0, 0),
    (1, 0, 0),
    (0, 1, 0),
    (1, 1, 0),
    (0, 0, 1),
    (1, 0, 1),
    (0, 1, 1),
    (1, 1, 1),
];

// Cell edges as corner-index pairs.
const EDGES: [(usize, usize); 12] = [
    (0, 1),
    (2, 3),
    (4, 5),
    (6, 7),
    (0, 2),
    (1, 3),
    (4, 6),
    (5, 7),
    (0, 4),
    (1, 5),
    (2, 6),
    (3, 7),
];

pub fn extract_surface(field: &VoxelField) -> SurfaceMesh {
    let dims = field.dims;
    let sx = dims.size_xz;
    let sy = dims.size_y;
    let cells_x = sx - 1;
    let cells_y = sy - 1;
    let cell_idx =
        |x: usize, y: usize, z: usize| -> usize { (y * cells_x + z) * cells_x + x };

    let mut mesh = SurfaceMesh {
        bounds: Aabb::empty(),
        ..SurfaceMesh::default()
    };
    let mut cell_vertex = vec![u32::MAX; cells_x * cells_x * cells_y];

    // Pass 1: one vertex per mixed-sign cell.
    for y in 0..cells_y {
        for z in 0..cells_x {
            for x in 0..cells_x {
                let mut d = [0.0f32; 8];
                let mut mask = 0u8;
                for (i, (dx, dy, dz)) in CORNERS.iter().enumerate() {
                    let v = field.density_at(x + dx, y + dy, z + dz);
                    d[i] = v;
                    if v >= ISO_LEVEL {
                        mask |= 1 << i;
                    }
                }
                if mask == 0 || mask == 0xff {
                    continue;
                }
                let mut sum = Vec3::ZERO;
                let mut crossings = 0u32;
                for (a, b) in EDGES {
                    let sa = d[a] >= ISO_LEVEL;
                    let sb = d[b] >= ISO_LEVEL;
                    if sa == sb {
                        continue;
                    }
                    let t = (ISO_LEVEL - d[a]) / (d[b] - d[a]);
                    let (ax, ay, az) = CORNERS[a];
                    let (bx, by, bz) = CORNERS[b];
                    sum += Vec3::new(
                        ax as f32 + (bx as f32 - ax as f32) * t,
                        ay as f32 + (by as f32 - ay as f32) * t,
                        az as f32 + (bz as f32 - az as f32) * t,
                    );
                    crossings += 1;
                }
                let local = sum / crossings as f32;
                // Positions in interior-local space (padding removed).
                let pos = Vec3::new(
                    x as f32 + local.x - PAD as f32,
                    y as f32 + local.y - PAD as f32,
                    z as f32 + local.z - PAD as f32,
                );
                cell_vertex[cell_idx(x, y, z)] = mesh.vertex_count() as u32;
                push_vertex(&mut mesh, field, x, y, z, pos, mask);
            }
        }
    }

    if mesh.positions.is_empty() {
        mesh.bounds = Aabb::default();
        return mesh;
    }

    // Pass 2: quads across sign-changing lattice edges. All four cells
    // around such an edge contain the edge and therefore own a vertex.
    let solid = |x: usize, y: usize, z: usize| field.density_at(x, y, z) >= ISO_LEVEL;
    let quad = |mesh: &mut SurfaceMesh, v: [u32; 4], flip: bool| {
        let [a, b, c, d] = if flip { [v[0], v[3], v[2], v[1]] } else { v };
        mesh.indices.extend_from_slice(&[a, b, c, a, c, d]);
    };

    // X-aligned edges.
    for y in 1..sy - 1 {
        for z in 1..sx - 1 {
            for x in 0..sx - 1 {
                let s0 = solid(x, y, z);
                if s0 == solid(x + 1, y, z) {
                    continue;
                }
                let v = [
                    cell_vertex[cell_idx(x, y - 1, z - 1)],
                    cell_vertex[cell_idx(x, y, z - 1)],
                    cell_vertex[cell_idx(x, y, z)],
                    cell_vertex[cell_idx(x, y - 1, z)],
                ];
                quad(&mut mesh, v, s0);
            }
        }
    }
    // Y-aligned edges.
    for y in 0..sy - 1 {
        for z in 1..sx - 1 {
            for x in 1..sx - 1 {
                let s0 = solid(x, y, z);
                if s0 == solid(x, y + 1, z) {
                    continue;
                }
                let v = [
                    cell_vertex[cell_idx(x - 1, y, z - 1)],
                    cell_vertex[cell_idx(x - 1, y, z)],
                    cell_vertex[cell_idx(x, y, z)],
                    cell_vertex[cell_idx(x, y, z - 1)],
                ];
                quad(&mut mesh, v, s0);
            }
        }
    }
    // Z-aligned edges.
    for y in 1..sy - 1 {
        for z in 0..sx - 1 {
            for x in 1..sx - 1 {
                let s0 = solid(x, y, z);
                if s0 == solid(x, y, z + 1) {
                    continue;
                }
                let v = [
                    cell_vertex[cell_idx(x - 1, y - 1, z)],
                    cell_vertex[cell_idx(x, y - 1, z)],
                    cell_vertex[cell_idx(x, y, z)],
                    cell_vertex[cell_idx(x - 1, y, z)],
                ];
                quad(&mut mesh, v, s0);
            }
        }
    }

    mesh
}

fn push_vertex(
    mesh: &mut SurfaceMesh,
    field: &VoxelField,
    cx: usize,
    cy: usize,
    cz: usize,
    pos: Vec3,
    mask: u8,
) {
    mesh.positions.extend_from_slice(&[pos.x, pos.y, pos.z]);
    mesh.bounds.expand(pos);

    let n = gradient_normal(field, cx, cy, cz);
    mesh.normals.extend_from_slice(&[n.x, n.y, n.z]);

    // Material histogram over solid corners, top four by count.
    let dims = field.dims;
    let mut counts: Vec<(u8, u32)> = Vec::with_capacity(8);
    let mut wet_sum = 0.0f32;
    let mut moss_sum = 0.0f32;
    let mut solid_corners = 0u32;
    for (i, (dx, dy, dz)) in CORNERS.iter().enumerate() {
        if mask & (1 << i) == 0 {
            continue;
        }
        solid_corners += 1;
        let idx = dims.idx(cx + dx, cy + dy, cz + dz);
        let mat = field.material[idx];
        match counts.iter_mut().find(|(m, _)| *m == mat) {
            Some((_, c)) => *c += 1,
            None => counts.push((mat, 1)),
        }
        if let Some(w) = &field.wetness {
            wet_sum += w[idx] as f32 / 255.0;
        }
        if let Some(m) = &field.mossiness {
            moss_sum += m[idx] as f32 / 255.0;
        }
    }
    // Deterministic channel order: count descending, id ascending on ties.
    counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    let total: u32 = counts.iter().map(|(_, c)| c).sum();
    let mut ids = [0u8; 4];
    let mut weights = [0.0f32; 4];
    for (slot, (mat, c)) in counts.into_iter().take(4).enumerate() {
        ids[slot] = mat;
        weights[slot] = c as f32 / total.max(1) as f32;
    }
    mesh.material_ids.extend_from_slice(&ids);
    mesh.material_weights.extend_from_slice(&weights);

    let inv = 1.0 / solid_corners.max(1) as f32;
    mesh.wetness.push(wet_sum * inv);
    mesh.mossiness.push(moss_sum * inv);
    // Enclosure measure: how much of the cell is solid. Flat ground sits at
    // 0.5, crevices approach 1, exposed spikes approach 0.
    mesh.cavity.push(solid_corners as f32 / 8.0);
}

/// Outward normal from the central-difference density gradient at the
/// cell's base voxel (density grows into solid, so the normal is -grad).
fn gradient_normal(field: &VoxelField, cx: usize, cy: usize, cz: usize) -> Vec3 {
    let dims = field.dims;
    let sample = |x: i64, y: i64, z: i64| -> f32 {
        let x = x.clamp(0, dims.size_xz as i64 - 1) as usize;
        let y = y.clamp(0, dims.size_y as i64 - 1) as usize;
        let z = z.clamp(0, dims.size_xz as i64 - 1) as usize;
        field.density_at(x, y, z)
    };
    let (x, y, z) = (cx as i64, cy as i64, cz as i64);
    let grad = Vec3::new(
        sample(x + 1, y, z) - sample(x - 1, y, z),
        sample(x, y + 1, z) - sample(x, y - 1, z),
        sample(x, y, z + 1) - sample(x, y, z - 1),
    );
    let n = (-grad).normalized();
    if n == Vec3::ZERO { Vec3::UP } else { n }
}
