//! Coarse volumetric light approximation for indirect/ambient illumination.
//!
//! `compute_light_volume` is a pure function of its inputs: no shared
//! state, no randomness, no clocks. Given identical inputs it returns a
//! bit-for-bit identical volume, which is what lets results computed on a
//! worker thread be applied (or discarded) solely by version comparison.
#![forbid(unsafe_code)]

use grove_voxel::{ISO_LEVEL, VoxelField};


/// Voxels per light cell along each axis when the caller has no override.
pub const DEFAULT_CELL_SIZE: usize = 4;

/// Flood-fill bounce iterations.
const PROPAGATION_ITERATIONS: usize = 3;

/// Sky transmission through an open cell per downward step.
const SKY_ATTENUATION: f32 = 0.92;
/// Residual sky transmission through a fully occluded cell. Keeps caves
/// dimly lit instead of pitch black.
const SKY_RESIDUAL: f32 = 0.08;
/// Column walk stops once remaining sky light falls below this.
const SKY_EPSILON: f32 = 1e-3;

/// Fraction of a point light blocked by a fully occluded cell. Solid rock
/// dampens but never fully blocks at this resolution, approximating light
/// leaking through cracks.
const POINT_OCCLUSION_FACTOR: f32 = 0.5;

/// Cells with occlusion above this do not gather bounced light.
const FILL_OCCLUSION_CUTOFF: f32 = 0.9;
/// Per-edge transmission loss factor against neighbor occlusion.
const FILL_EDGE_OCCLUSION: f32 = 0.7;
/// Edges with transmission below this are skipped entirely.
const FILL_EDGE_MIN_TRANSMISSION: f32 = 0.05;
/// Fraction of the averaged neighbor light added back per iteration.
const FILL_BOUNCE_DAMP: f32 = 0.25;

/// Occlusion ramp steepness from mean cell density above the iso level.
const OCCLUSION_SHARPNESS: f32 = 4.0;

/// A point light in local chunk space (padded voxel coordinates).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LightSource {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    /// RGB in [0, 1].
    pub color: [f32; 3],
    pub intensity: f32,
    /// Falloff radius in voxels.
    pub radius: f32,
}

/// Sky contribution, derived externally from time of day.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SkyLight {
    pub color: [f32; 3],
    pub intensity: f32,
}

impl Default for SkyLight {
    fn default() -> Self {
        Self {
            color: [1.0, 1.0, 1.0],
            intensity: 1.0,
        }
    }
}

/// Tone-mapped RGBA light volume at cell resolution.
#[derive(Clone, Debug, PartialEq)]
pub struct LightVolume {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
    pub cell_size: usize,
    /// `nx * ny * nz * 4` bytes, RGBA, alpha always 255.
    pub rgba: Vec<u8>,
}

impl LightVolume {
    #[inline]
    pub fn cell_count(&self) -> usize {
        self.nx * self.ny * self.nz
    }

    #[inline]
    pub fn cell_rgba(&self, x: usize, y: usize, z: usize) -> [u8; 4] {
        let i = ((y * self.nz + z) * self.nx + x) * 4;
        [self.rgba[i], self.rgba[i + 1], self.rgba[i + 2], self.rgba[i + 3]]
    }
}

struct Accumulator {
    nx: usize,
    ny: usize,
    nz: usize,
    r: Vec<f32>,
    g: Vec<f32>,
    b: Vec<f32>,
}

impl Accumulator {
    fn new(nx: usize, ny: usize, nz: usize) -> Self {
        let n = nx * ny * nz;
        Self {
            nx,
            ny,
            nz,
            r: vec![0.0; n],
            g: vec![0.0; n],
            b: vec![0.0; n],
        }
    }

    #[inline]
    fn idx(&self, x: usize, y: usize, z: usize) -> usize {
        (y * self.nz + z) * self.nx + x
    }

    #[inline]
    fn add(&mut self, idx: usize, rgb: [f32; 3]) {
        self.r[idx] += rgb[0];
        self.g[idx] += rgb[1];
        self.b[idx] += rgb[2];
    }
}

/// Mean density of the cell's voxels mapped to an occlusion value in [0, 1].
fn occlusion_grid(field: &VoxelField, cell_size: usize, nx: usize, ny: usize, nz: usize) -> Vec<f32> {
    let dims = field.dims;
    let mut occ = vec![0.0f32; nx * ny * nz];
    for cy in 0..ny {
        for cz in 0..nz {
            for cx in 0..nx {
                let mut sum = 0.0f32;
                let mut count = 0u32;
                for vy in (cy * cell_size)..((cy + 1) * cell_size).min(dims.size_y) {
                    for vz in (cz * cell_size)..((cz + 1) * cell_size).min(dims.size_xz) {
                        for vx in (cx * cell_size)..((cx + 1) * cell_size).min(dims.size_xz) {
                            sum += field.density[dims.idx(vx, vy, vz)];
                            count += 1;
                        }
                    }
                }
                let mean = if count > 0 { sum / count as f32 } else { -1.0 };
                let v = ((mean - ISO_LEVEL) * OCCLUSION_SHARPNESS).clamp(0.0, 1.0);
                occ[(cy * nz + cz) * nx + cx] = v;
            }
        }
    }
    occ
}

/// Pass 1: per-column top-to-bottom sky seeding with soft attenuation.
fn seed_sky(acc: &mut Accumulator, occ: &[f32], sky: &SkyLight) {
    let base = [
        sky.color[0] * sky.intensity,
        sky.color[1] * sky.intensity,
        sky.color[2] * sky.intensity,
    ];
    for cz in 0..acc.nz {
        for cx in 0..acc.nx {
            let mut remaining = 1.0f32;
            for cy in (0..acc.ny).rev() {
                let idx = acc.idx(cx, cy, cz);
                acc.add(idx, [base[0] * remaining, base[1] * remaining, base[2] * remaining]);
                let o = occ[idx];
                remaining *= (1.0 - o) * SKY_ATTENUATION + o * SKY_RESIDUAL;
                if remaining < SKY_EPSILON {
                    break;
                }
            }
        }
    }
}

/// Pass 2: point-light seeding with inverse-square-like falloff and
/// partial per-cell occlusion transmission.
fn seed_point_lights(acc: &mut Accumulator, occ: &[f32], lights: &[LightSource], cell_size: usize) {
    let cs = cell_size as f32;
    for light in lights {
        if light.intensity <= 0.0 || light.radius <= 0.0 {
            continue;
        }
        let lx = light.x / cs;
        let ly = light.y / cs;
        let lz = light.z / cs;
        let radius_cells = (light.radius / cs).ceil().max(1.0);
        let reach = radius_cells as i64;
        let ccx = lx.floor() as i64;
        let ccy = ly.floor() as i64;
        let ccz = lz.floor() as i64;
        for cy in (ccy - reach).max(0)..=(ccy + reach).min(acc.ny as i64 - 1) {
            for cz in (ccz - reach).max(0)..=(ccz + reach).min(acc.nz as i64 - 1) {
                for cx in (ccx - reach).max(0)..=(ccx + reach).min(acc.nx as i64 - 1) {
                    let dx = cx as f32 + 0.5 - lx;
                    let dy = cy as f32 + 0.5 - ly;
                    let dz = cz as f32 + 0.5 - lz;
                    let dist = (dx * dx + dy * dy + dz * dz).sqrt();
                    let fall = (1.0 - dist / radius_cells).max(0.0);
                    if fall <= 0.0 {
                        continue;
                    }
                    let idx = acc.idx(cx as usize, cy as usize, cz as usize);
                    let transmit = 1.0 - occ[idx] * POINT_OCCLUSION_FACTOR;
                    let s = fall * fall * light.intensity * transmit;
                    acc.add(
                        idx,
                        [light.color[0] * s, light.color[1] * s, light.color[2] * s],
                    );
                }
            }
        }
    }
}

/// Pass 3: damped additive flood fill. Each iteration reads the previous
/// iteration's full grid (double-buffered); this is a cheap multi-bounce
/// approximation, not a radiosity solve.
fn propagate(acc: &mut Accumulator, occ: &[f32]) {
    let (nx, ny, nz) = (acc.nx, acc.ny, acc.nz);
    for _ in 0..PROPAGATION_ITERATIONS {
        let prev_r = acc.r.clone();
        let prev_g = acc.g.clone();
        let prev_b = acc.b.clone();
        for cy in 0..ny {
            for cz in 0..nz {
                for cx in 0..nx {
                    let idx = acc.idx(cx, cy, cz);
                    if occ[idx] > FILL_OCCLUSION_CUTOFF {
                        continue;
                    }
                    let mut sum = [0.0f32; 3];
                    let mut edges = 0u32;
                    let mut gather = |x: i64, y: i64, z: i64| {
                        if x < 0 || y < 0 || z < 0 || x >= nx as i64 || y >= ny as i64 || z >= nz as i64 {
                            return;
                        }
                        let n = ((y as usize) * nz + z as usize) * nx + x as usize;
                        let transmit = 1.0 - occ[n] * FILL_EDGE_OCCLUSION;
                        if transmit < FILL_EDGE_MIN_TRANSMISSION {
                            return;
                        }
                        sum[0] += prev_r[n] * transmit;
                        sum[1] += prev_g[n] * transmit;
                        sum[2] += prev_b[n] * transmit;
                        edges += 1;
                    };
                    gather(cx as i64 + 1, cy as i64, cz as i64);
                    gather(cx as i64 - 1, cy as i64, cz as i64);
                    gather(cx as i64, cy as i64 + 1, cz as i64);
                    gather(cx as i64, cy as i64 - 1, cz as i64);
                    gather(cx as i64, cy as i64, cz as i64 + 1);
                    gather(cx as i64, cy as i64, cz as i64 - 1);
                    if edges == 0 {
                        continue;
                    }
                    let inv = FILL_BOUNCE_DAMP / edges as f32;
                    acc.r[idx] += sum[0] * inv;
                    acc.g[idx] += sum[1] * inv;
                    acc.b[idx] += sum[2] * inv;
                }
            }
        }
    }
}

/// Reinhard-style compression of one accumulated channel to a byte.
#[inline]
pub fn tone_map(v: f32) -> u8 {
    (255.0 * 2.0 * (v / (1.0 + v))).clamp(0.0, 255.0) as u8
}

/// Builds the coarse light volume for one chunk. See the module docs for
/// the purity/determinism contract.
pub fn compute_light_volume(
    field: &VoxelField,
    lights: &[LightSource],
    sky: &SkyLight,
    cell_size: usize,
) -> LightVolume {
    let cell_size = cell_size.max(1);
    let dims = field.dims;
    let nx = dims.size_xz.div_ceil(cell_size);
    let nz = dims.size_xz.div_ceil(cell_size);
    let ny = dims.size_y.div_ceil(cell_size);

    let occ = occlusion_grid(field, cell_size, nx, ny, nz);
    let mut acc = Accumulator::new(nx, ny, nz);
    seed_sky(&mut acc, &occ, sky);
    seed_point_lights(&mut acc, &occ, lights, cell_size);
    propagate(&mut acc, &occ);

    let mut rgba = vec![0u8; nx * ny * nz * 4];
    for i in 0..nx * ny * nz {
        rgba[i * 4] = tone_map(acc.r[i]);
        rgba[i * 4 + 1] = tone_map(acc.g[i]);
        rgba[i * 4 + 2] = tone_map(acc.b[i]);
        rgba[i * 4 + 3] = 255;
    }
    LightVolume {
        nx,
        ny,
        nz,
        cell_size,
        rgba,
    }
}
