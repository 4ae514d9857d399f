//! Glue between generation, the chunk cache, and the background workers.

use std::sync::Arc;
use std::time::Instant;

use grove_cache::{ChunkCache, VoxelEdit};
use grove_lighting::{LightSource, SkyLight};
use grove_persist::{MemoryStore, PersistenceStore};
use grove_runtime::{JobResult, LightJob, MeshJob, Runtime};
use grove_voxel::{ChunkCoord, ChunkDims};
use grove_world::World;
use hashbrown::HashMap;
use log::info;

use crate::config::EngineConfig;

/// What one `pump` call merged back from the workers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PumpSummary {
    pub light_applied: usize,
    pub mesh_applied: usize,
    pub stale_discarded: usize,
}

pub struct Engine<S: PersistenceStore> {
    world: World,
    cache: ChunkCache<S>,
    runtime: Runtime,
    sky: SkyLight,
    /// Point lights bucketed per chunk. Positions are in that chunk's
    /// padded voxel space, matching what the light pass samples.
    lights: HashMap<ChunkCoord, Vec<LightSource>>,
    cell_size: usize,
}

impl Engine<MemoryStore> {
    pub fn with_memory_store(cfg: EngineConfig) -> Self {
        Self::new(cfg, MemoryStore::new())
    }
}

impl<S: PersistenceStore> Engine<S> {
    pub fn new(cfg: EngineConfig, store: S) -> Self {
        let dims = ChunkDims::new(cfg.chunk_size_xz, cfg.chunk_size_y);
        let world = World::new(cfg.worldgen.clone(), dims);
        let cache = ChunkCache::new(
            store,
            cfg.cache_capacity,
            std::time::Duration::from_millis(cfg.persist_debounce_ms),
        );
        Self {
            world,
            cache,
            runtime: Runtime::new(),
            sky: SkyLight::default(),
            lights: HashMap::new(),
            cell_size: cfg.light_cell_size,
        }
    }

    pub fn cache(&self) -> &ChunkCache<S> {
        &self.cache
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn set_sky(&mut self, sky: SkyLight) {
        self.sky = sky;
        let resident: Vec<ChunkCoord> = self.cache.resident_coords();
        for coord in resident {
            self.dispatch_light(coord);
        }
    }

    /// Registers a point light at padded voxel coordinates within `coord`.
    pub fn add_point_light(&mut self, coord: ChunkCoord, light: LightSource) {
        self.lights.entry(coord).or_default().push(light);
        if self.cache.has_chunk(coord) {
            self.dispatch_light(coord);
        }
    }

    /// Makes a chunk resident: generates terrain, replays persisted edits,
    /// and queues lighting and meshing for the resulting field.
    pub fn ensure_chunk(&mut self, coord: ChunkCoord) {
        if self.cache.has_chunk(coord) {
            return;
        }
        let field = self.world.generate(coord);
        self.cache.add_chunk(coord, field);
        self.cache.apply_persisted_modifications(coord);
        self.dispatch_all(coord);
    }

    /// Ensures every chunk within `radius` (Chebyshev) of `center`.
    pub fn stream_around(&mut self, center: ChunkCoord, radius: i32) {
        for dz in -radius..=radius {
            for dx in -radius..=radius {
                self.ensure_chunk(center.offset(dx, dz));
            }
        }
    }

    /// Applies edits and re-queues derivation at the new terrain version.
    pub fn edit(&mut self, coord: ChunkCoord, edits: &[VoxelEdit]) -> bool {
        if !self.cache.modify_terrain(coord, edits) {
            return false;
        }
        self.dispatch_all(coord);
        true
    }

    fn dispatch_all(&mut self, coord: ChunkCoord) {
        let Some((field, version)) = self.snapshot(coord) else {
            return;
        };
        self.runtime.submit_mesh_job(MeshJob {
            coord,
            version,
            field: Arc::clone(&field),
        });
        self.submit_light(coord, version, field);
    }

    fn dispatch_light(&mut self, coord: ChunkCoord) {
        if let Some((field, version)) = self.snapshot(coord) {
            self.submit_light(coord, version, field);
        }
    }

    fn snapshot(&self, coord: ChunkCoord) -> Option<(Arc<grove_voxel::VoxelField>, u64)> {
        let state = self.cache.peek_chunk(coord)?;
        Some((Arc::new(state.field.clone()), state.terrain_version))
    }

    fn submit_light(&self, coord: ChunkCoord, version: u64, field: Arc<grove_voxel::VoxelField>) {
        let lights = self.lights.get(&coord).cloned().unwrap_or_default();
        self.runtime.submit_light_job(LightJob {
            coord,
            version,
            field,
            lights,
            sky: self.sky,
            cell_size: self.cell_size,
        });
    }

    /// Merges finished worker results and drives debounced persistence.
    /// Call once per frame or poll interval.
    pub fn pump(&mut self, now: Instant) -> PumpSummary {
        let mut summary = PumpSummary::default();
        for result in self.runtime.drain_results() {
            match result {
                JobResult::Light {
                    coord,
                    version,
                    volume,
                    ..
                } => {
                    if self.cache.apply_light_result(coord, version, volume) {
                        summary.light_applied += 1;
                    } else {
                        summary.stale_discarded += 1;
                    }
                }
                JobResult::Mesh {
                    coord,
                    version,
                    output,
                    ..
                } => {
                    if self.cache.apply_mesh_result(coord, version, output) {
                        summary.mesh_applied += 1;
                    } else {
                        summary.stale_discarded += 1;
                    }
                }
            }
        }
        self.cache.tick(now);
        summary
    }

    /// Flushes all dirty chunks before teardown.
    pub fn shutdown(&mut self) {
        self.cache.save_all_dirty();
        let stats = self.cache.stats();
        info!(
            "engine shutdown: {} resident, {} hits, {} misses, {} evictions",
            self.cache.resident_count(),
            stats.hits,
            stats.misses,
            stats.evictions
        );
    }
}
