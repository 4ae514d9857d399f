//! Deterministic terrain generation.
//!
//! Chunks regenerate bit-for-bit from `(seed, coord)`, which is what lets
//! the cache evict clean chunks freely and persist only player edits.
#![forbid(unsafe_code)]

mod config;

pub use config::WorldGenConfig;

use fastnoise_lite::{FastNoiseLite, NoiseType};
use grove_voxel::{ChunkCoord, ChunkDims, ISO_LEVEL, PAD, VoxelField, material};

pub struct World {
    dims: ChunkDims,
    cfg: WorldGenConfig,
    terrain: FastNoiseLite,
    detail: FastNoiseLite,
    tunnel: FastNoiseLite,
    moss: FastNoiseLite,
}

impl World {
    pub fn new(cfg: WorldGenConfig, dims: ChunkDims) -> Self {
        let mut terrain = FastNoiseLite::with_seed(cfg.seed);
        terrain.set_noise_type(Some(NoiseType::OpenSimplex2));
        terrain.set_frequency(Some(cfg.height.frequency));
        let mut detail = FastNoiseLite::with_seed(cfg.seed ^ 99_173);
        detail.set_noise_type(Some(NoiseType::OpenSimplex2));
        detail.set_frequency(Some(cfg.height.detail_frequency));
        let mut tunnel = FastNoiseLite::with_seed(cfg.seed ^ 41_337);
        tunnel.set_noise_type(Some(NoiseType::OpenSimplex2));
        tunnel.set_frequency(Some(cfg.caves.frequency));
        let mut moss = FastNoiseLite::with_seed(cfg.seed ^ 7_741);
        moss.set_noise_type(Some(NoiseType::OpenSimplex2));
        moss.set_frequency(Some(cfg.surface.moss_frequency));
        Self {
            dims,
            cfg,
            terrain,
            detail,
            tunnel,
            moss,
        }
    }

    pub fn dims(&self) -> ChunkDims {
        self.dims
    }

    pub fn seed(&self) -> i32 {
        self.cfg.seed
    }

    pub fn sea_level(&self) -> f32 {
        self.dims.interior_y() as f32 * self.cfg.water.level_ratio
    }

    fn surface_height(&self, wx: f32, wz: f32) -> f32 {
        let base = self.dims.interior_y() as f32 * self.cfg.height.base_ratio;
        base + self.cfg.height.amplitude * self.terrain.get_noise_2d(wx, wz)
    }

    /// Generates the padded field for a chunk. Padded border voxels sample
    /// the same world-space noise as the neighbor's interior, so fields of
    /// adjacent chunks agree on their shared columns.
    pub fn generate(&self, coord: ChunkCoord) -> VoxelField {
        let dims = self.dims;
        let n = dims.interior_xz();
        let sea = self.sea_level();
        let mut field = VoxelField::new_empty(dims);
        let mut wetness = vec![0u8; dims.volume()];
        let mut mossiness = vec![0u8; dims.volume()];

        let ox = coord.cx as f32 * n as f32;
        let oz = coord.cz as f32 * n as f32;

        for z in 0..dims.size_xz {
            let wz = oz + z as f32 - PAD as f32;
            for x in 0..dims.size_xz {
                let wx = ox + x as f32 - PAD as f32;
                let height = self.surface_height(wx, wz);
                for y in 0..dims.size_y {
                    let wy = y as f32 - PAD as f32;
                    let idx = dims.idx(x, y, z);
                    let mut d = height - wy
                        + self.cfg.height.detail_amplitude * self.detail.get_noise_3d(wx, wy, wz);

                    if self.cfg.caves.enable
                        && d >= ISO_LEVEL
                        && wy < height - self.cfg.caves.min_cover
                        && self.tunnel.get_noise_3d(wx, wy, wz) > self.cfg.caves.threshold
                    {
                        d = -1.0;
                    }

                    field.density[idx] = d;
                    if d >= ISO_LEVEL {
                        field.material[idx] = self.solid_material(wy, height, sea);
                    } else if self.cfg.water.enable && wy < sea {
                        field.material[idx] = material::MAT_WATER;
                    }

                    let depth = height - wy;
                    if d >= ISO_LEVEL && depth < self.cfg.surface.topsoil_depth {
                        wetness[idx] = self.wetness_at(wy, sea);
                        mossiness[idx] = self.mossiness_at(wx, wy, wz, height);
                    }
                }
            }
        }

        field.with_surface_layers(wetness, mossiness)
    }

    fn solid_material(&self, wy: f32, height: f32, sea: f32) -> u8 {
        let depth = height - wy;
        if depth >= self.cfg.surface.topsoil_depth {
            material::MAT_ROCK
        } else if height < sea + self.cfg.surface.beach_band {
            material::MAT_SAND
        } else {
            material::MAT_SOIL
        }
    }

    /// Full saturation at sea level fading out over the beach band above it.
    fn wetness_at(&self, wy: f32, sea: f32) -> u8 {
        let band = self.cfg.surface.beach_band.max(0.5) * 4.0;
        let t = (1.0 - (wy - sea) / band).clamp(0.0, 1.0);
        (t * 255.0) as u8
    }

    fn mossiness_at(&self, wx: f32, wy: f32, wz: f32, height: f32) -> u8 {
        // Moss clings to exposed surface voxels where the noise says damp.
        if height - wy > 1.5 {
            return 0;
        }
        let m = self.moss.get_noise_3d(wx, wy, wz);
        ((m * 0.5 + 0.5) * 255.0).clamp(0.0, 255.0) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world() -> World {
        World::new(WorldGenConfig::default(), ChunkDims::new(16, 32))
    }

    #[test]
    fn generation_is_deterministic() {
        let w = world();
        let coord = ChunkCoord::new(3, -2);
        let a = w.generate(coord);
        let b = w.generate(coord);
        assert_eq!(a.density, b.density);
        assert_eq!(a.material, b.material);
        assert_eq!(a.wetness, b.wetness);
        assert_eq!(a.mossiness, b.mossiness);
    }

    #[test]
    fn different_seeds_differ() {
        let a = world().generate(ChunkCoord::new(0, 0));
        let mut cfg = WorldGenConfig::default();
        cfg.seed = 99;
        let b = World::new(cfg, ChunkDims::new(16, 32)).generate(ChunkCoord::new(0, 0));
        assert_ne!(a.density, b.density);
    }

    #[test]
    fn bottom_is_solid_top_is_air() {
        let mut cfg = WorldGenConfig::default();
        cfg.caves.enable = false;
        let w = World::new(cfg, ChunkDims::new(16, 32));
        let f = w.generate(ChunkCoord::new(0, 0));
        let dims = f.dims;
        for z in PAD..dims.size_xz - PAD {
            for x in PAD..dims.size_xz - PAD {
                assert!(
                    f.density[dims.idx(x, PAD, z)] >= ISO_LEVEL,
                    "floor solid at ({x}, {z})"
                );
                assert!(
                    f.density[dims.idx(x, dims.size_y - 1, z)] < ISO_LEVEL,
                    "sky open at ({x}, {z})"
                );
            }
        }
    }

    #[test]
    fn adjacent_chunks_agree_on_shared_columns() {
        let w = world();
        let left = w.generate(ChunkCoord::new(0, 0));
        let right = w.generate(ChunkCoord::new(1, 0));
        let dims = w.dims();
        let n = dims.interior_xz();
        // Left chunk's +x pad column samples the same world x as the right
        // chunk's first interior column.
        for y in 0..dims.size_y {
            for z in 0..dims.size_xz {
                let a = left.density[dims.idx(n + PAD, y, z)];
                let b = right.density[dims.idx(PAD, y, z)];
                assert_eq!(a, b, "mismatch at y={y} z={z}");
            }
        }
    }

    #[test]
    fn water_fills_low_ground() {
        let mut cfg = WorldGenConfig::default();
        cfg.water.level_ratio = 0.9;
        cfg.caves.enable = false;
        let w = World::new(cfg, ChunkDims::new(16, 32));
        let f = w.generate(ChunkCoord::new(0, 0));
        let dims = f.dims;
        let water = f
            .material
            .iter()
            .filter(|m| **m == material::MAT_WATER)
            .count();
        assert!(water > 0, "high sea level floods open air");
        // Water only sits in non-solid voxels.
        for i in 0..dims.volume() {
            if f.material[i] == material::MAT_WATER {
                assert!(f.density[i] < ISO_LEVEL);
            }
        }
    }

    #[test]
    fn config_parses_with_partial_toml() {
        let cfg: WorldGenConfig = toml::from_str(
            r#"
            seed = 42
            [water]
            level_ratio = 0.5
            "#,
        )
        .unwrap();
        assert_eq!(cfg.seed, 42);
        assert_eq!(cfg.water.level_ratio, 0.5);
        assert!(cfg.caves.enable, "unset sections fall back to defaults");
    }
}
