//! Chunk residency, dirty tracking, eviction, and persistence coordination.
//!
//! The cache is the single writer for chunk state. Async light/mesh workers
//! receive snapshots and hand results back through the version-guarded
//! `apply_*_result` entry points; anything computed against a stale terrain
//! version is discarded here.
#![forbid(unsafe_code)]

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::{Duration, Instant};

use grove_lighting::LightVolume;
use grove_mesh_cpu::ChunkMeshOutput;
use grove_persist::{PersistenceStore, VoxelMod};
use grove_voxel::{ChunkCoord, VoxelField};
use hashbrown::hash_map::Entry;
use hashbrown::{HashMap, HashSet};
use log::{debug, warn};

pub const DEFAULT_CAPACITY: usize = 64;
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(2);

/// One in-place voxel edit in interior-local coordinates.
#[derive(Clone, Copy, Debug)]
pub struct VoxelEdit {
    pub x: usize,
    pub y: usize,
    pub z: usize,
    pub density: f32,
    /// `None` keeps the voxel's current material.
    pub material: Option<u8>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChunkEventKind {
    Ready,
    Updated,
    Remove,
    Dirty,
}

/// Payload handed to event listeners. `chunk` is `None` for removals.
pub struct ChunkEvent<'a> {
    pub kind: ChunkEventKind,
    pub coord: ChunkCoord,
    pub chunk: Option<&'a ChunkState>,
}

type ListenerFn = Box<dyn Fn(&ChunkEvent<'_>) + Send>;

struct Listener {
    id: u64,
    kind: ChunkEventKind,
    f: ListenerFn,
}

/// Authoritative per-chunk state plus derived outputs.
pub struct ChunkState {
    pub coord: ChunkCoord,
    pub field: VoxelField,
    /// Bumped on every terrain change; results computed against an older
    /// value are discarded on arrival.
    pub terrain_version: u64,
    pub meshes: Option<ChunkMeshOutput>,
    pub light: Option<LightVolume>,
}

struct CacheEntry {
    state: ChunkState,
    /// Logical access clock value, higher = more recently used.
    last_access: u64,
    dirty: bool,
    /// Padded flat indices of player-edited voxels.
    modified: HashSet<u32>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

pub struct ChunkCache<S: PersistenceStore> {
    entries: HashMap<ChunkCoord, CacheEntry>,
    store: S,
    capacity: usize,
    clock: u64,
    listeners: Vec<Listener>,
    next_listener_id: u64,
    /// Chunks with unsaved edits awaiting the debounce deadline.
    pending: HashSet<ChunkCoord>,
    flush_deadline: Option<Instant>,
    debounce: Duration,
    stats: CacheStats,
}

impl<S: PersistenceStore> ChunkCache<S> {
    pub fn new(store: S, capacity: usize, debounce: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            store,
            capacity: capacity.max(1),
            clock: 0,
            listeners: Vec::new(),
            next_listener_id: 0,
            pending: HashSet::new(),
            flush_deadline: None,
            debounce,
            stats: CacheStats::default(),
        }
    }

    pub fn with_store(store: S) -> Self {
        Self::new(store, DEFAULT_CAPACITY, DEFAULT_DEBOUNCE)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn resident_count(&self) -> usize {
        self.entries.len()
    }

    pub fn resident_coords(&self) -> Vec<ChunkCoord> {
        self.entries.keys().copied().collect()
    }

    pub fn has_chunk(&self, coord: ChunkCoord) -> bool {
        self.entries.contains_key(&coord)
    }

    pub fn is_dirty(&self, coord: ChunkCoord) -> bool {
        self.entries.get(&coord).is_some_and(|e| e.dirty)
    }

    pub fn terrain_version(&self, coord: ChunkCoord) -> Option<u64> {
        self.entries.get(&coord).map(|e| e.state.terrain_version)
    }

    /// Looks a chunk up without touching its recency, for read-only callers
    /// that should not perturb eviction order.
    pub fn peek_chunk(&self, coord: ChunkCoord) -> Option<&ChunkState> {
        self.entries.get(&coord).map(|e| &e.state)
    }

    pub fn get_chunk(&mut self, coord: ChunkCoord) -> Option<&ChunkState> {
        self.clock += 1;
        match self.entries.get_mut(&coord) {
            Some(e) => {
                e.last_access = self.clock;
                self.stats.hits += 1;
                Some(&e.state)
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    /// Registers a listener for one event kind and returns its handle.
    pub fn on<F>(&mut self, kind: ChunkEventKind, f: F) -> u64
    where
        F: Fn(&ChunkEvent<'_>) + Send + 'static,
    {
        self.next_listener_id += 1;
        let id = self.next_listener_id;
        self.listeners.push(Listener {
            id,
            kind,
            f: Box::new(f),
        });
        id
    }

    pub fn off(&mut self, id: u64) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|l| l.id != id);
        self.listeners.len() != before
    }

    /// Installs freshly generated terrain for a chunk.
    ///
    /// Absent chunks are inserted as clean; a resident dirty chunk keeps its
    /// edited density/material and only takes the incoming decorative layers;
    /// a resident clean chunk is replaced wholesale. Either resident path
    /// bumps the terrain version so in-flight worker results get discarded.
    pub fn add_chunk(&mut self, coord: ChunkCoord, field: VoxelField) {
        self.clock += 1;
        let event = match self.entries.entry(coord) {
            Entry::Vacant(v) => {
                v.insert(CacheEntry {
                    state: ChunkState {
                        coord,
                        field,
                        terrain_version: 1,
                        meshes: None,
                        light: None,
                    },
                    last_access: self.clock,
                    dirty: false,
                    modified: HashSet::new(),
                });
                ChunkEventKind::Ready
            }
            Entry::Occupied(mut o) => {
                let e = o.get_mut();
                if e.dirty {
                    if e.state.field.dims == field.dims {
                        e.state.field.wetness = field.wetness;
                        e.state.field.mossiness = field.mossiness;
                    } else {
                        warn!(
                            "regenerated chunk {:?} has mismatched dims, keeping edited field",
                            coord
                        );
                    }
                } else {
                    e.state.field = field;
                    e.state.meshes = None;
                    e.state.light = None;
                }
                e.state.terrain_version += 1;
                e.last_access = self.clock;
                ChunkEventKind::Updated
            }
        };
        self.emit(event, coord);
        self.evict_if_needed();
    }

    /// Applies voxel edits to a resident chunk. Returns false when the chunk
    /// is not resident; out-of-bounds edits are skipped with a warning.
    pub fn modify_terrain(&mut self, coord: ChunkCoord, edits: &[VoxelEdit]) -> bool {
        self.clock += 1;
        let Some(e) = self.entries.get_mut(&coord) else {
            return false;
        };
        let dims = e.state.field.dims;
        let n = dims.interior_xz();
        let ny = dims.interior_y();
        for ed in edits {
            if ed.x >= n || ed.y >= ny || ed.z >= n {
                warn!(
                    "edit at ({}, {}, {}) outside chunk {:?} interior, skipped",
                    ed.x, ed.y, ed.z, coord
                );
                continue;
            }
            let idx = dims.interior_idx(ed.x, ed.y, ed.z);
            e.state.field.density[idx] = ed.density;
            if let Some(m) = ed.material {
                e.state.field.material[idx] = m;
            }
            e.modified.insert(idx as u32);
        }
        e.dirty = true;
        e.state.terrain_version += 1;
        e.last_access = self.clock;
        self.schedule_persist(coord);
        self.emit(ChunkEventKind::Dirty, coord);
        self.emit(ChunkEventKind::Updated, coord);
        true
    }

    /// Marks voxels dirty without changing their values, e.g. after an
    /// external writer touched the field directly.
    pub fn mark_dirty(&mut self, coord: ChunkCoord, indices: &[u32]) -> bool {
        let Some(e) = self.entries.get_mut(&coord) else {
            return false;
        };
        e.modified.extend(indices.iter().copied());
        e.dirty = true;
        e.state.terrain_version += 1;
        self.schedule_persist(coord);
        self.emit(ChunkEventKind::Dirty, coord);
        true
    }

    /// Evicts least-recently-used clean chunks until at or under capacity.
    /// Dirty chunks are never evicted; if they alone exceed capacity the
    /// cache stays oversized and logs the shortfall.
    pub fn evict_if_needed(&mut self) {
        if self.entries.len() <= self.capacity {
            return;
        }
        let excess = self.entries.len() - self.capacity;
        let mut clean: Vec<(u64, ChunkCoord)> = self
            .entries
            .iter()
            .filter(|(_, e)| !e.dirty)
            .map(|(c, e)| (e.last_access, *c))
            .collect();
        clean.sort_by_key(|(t, c)| (*t, c.cx, c.cz));
        let victims: Vec<ChunkCoord> = clean.into_iter().take(excess).map(|(_, c)| c).collect();
        if victims.len() < excess {
            warn!(
                "cache over capacity by {} but only {} clean chunks evictable",
                excess,
                victims.len()
            );
        }
        for coord in victims {
            self.entries.remove(&coord);
            self.pending.remove(&coord);
            self.stats.evictions += 1;
            self.emit(ChunkEventKind::Remove, coord);
        }
    }

    /// Removes a chunk regardless of recency, synchronously flushing its
    /// edits first so nothing is lost.
    pub fn force_evict(&mut self, coord: ChunkCoord) -> bool {
        let Some(dirty) = self.entries.get(&coord).map(|e| e.dirty) else {
            return false;
        };
        if dirty {
            self.flush_chunk(coord);
        }
        self.pending.remove(&coord);
        self.entries.remove(&coord);
        self.stats.evictions += 1;
        self.emit(ChunkEventKind::Remove, coord);
        true
    }

    fn schedule_persist(&mut self, coord: ChunkCoord) {
        self.pending.insert(coord);
        // Each new edit pushes the deadline back; a burst of edits becomes
        // one write.
        self.flush_deadline = Some(Instant::now() + self.debounce);
    }

    /// Drives the debounced flush; call once per frame or poll interval.
    pub fn tick(&mut self, now: Instant) {
        if self.flush_deadline.is_some_and(|d| now >= d) {
            self.flush_deadline = None;
            self.flush_pending();
        }
    }

    /// Writes every pending chunk's edits to the store. Failures are logged
    /// and re-queued for the next deadline.
    pub fn flush_pending(&mut self) {
        let mut coords: Vec<ChunkCoord> = self.pending.drain().collect();
        coords.sort_by_key(|c| (c.cx, c.cz));
        for coord in coords {
            self.flush_chunk(coord);
        }
    }

    fn flush_chunk(&mut self, coord: ChunkCoord) {
        let Some(e) = self.entries.get(&coord) else {
            return;
        };
        if !e.dirty || e.modified.is_empty() {
            return;
        }
        let mut indices: Vec<u32> = e.modified.iter().copied().collect();
        indices.sort_unstable();
        let mods: Vec<VoxelMod> = indices
            .into_iter()
            .map(|i| VoxelMod {
                voxel_index: i,
                material: e.state.field.material[i as usize],
                density: e.state.field.density[i as usize],
            })
            .collect();
        match self.store.put_modifications(coord, &mods) {
            Ok(()) => {
                // The dirty flag stays set: it means "diverged from the
                // generator", not "unsaved".
                debug!("persisted {} voxel mods for {:?}", mods.len(), coord);
            }
            Err(err) => {
                warn!("persist failed for {:?}: {err}; re-queued", coord);
                self.pending.insert(coord);
                self.flush_deadline = Some(Instant::now() + self.debounce);
            }
        }
    }

    /// Flushes everything immediately, for shutdown.
    pub fn save_all_dirty(&mut self) {
        self.flush_deadline = None;
        self.pending.clear();
        let mut dirty: Vec<ChunkCoord> = self
            .entries
            .iter()
            .filter(|(_, e)| e.dirty)
            .map(|(c, _)| *c)
            .collect();
        dirty.sort_by_key(|c| (c.cx, c.cz));
        for coord in dirty {
            self.flush_chunk(coord);
        }
    }

    /// Replays stored edits onto a freshly generated resident chunk.
    /// Returns true when any edit was applied. The records are already
    /// durable, so no new persistence is scheduled.
    pub fn apply_persisted_modifications(&mut self, coord: ChunkCoord) -> bool {
        let mods = match self.store.get_modifications(coord) {
            Ok(m) => m,
            Err(err) => {
                warn!("failed to load persisted mods for {:?}: {err}", coord);
                return false;
            }
        };
        if mods.is_empty() {
            return false;
        }
        let Some(e) = self.entries.get_mut(&coord) else {
            return false;
        };
        let volume = e.state.field.density.len();
        let mut applied = false;
        for m in &mods {
            let idx = m.voxel_index as usize;
            if idx >= volume {
                warn!(
                    "persisted voxel index {} out of range for {:?}, skipped",
                    m.voxel_index, coord
                );
                continue;
            }
            e.state.field.density[idx] = m.density;
            e.state.field.material[idx] = m.material;
            e.modified.insert(m.voxel_index);
            applied = true;
        }
        if applied {
            e.dirty = true;
            e.state.terrain_version += 1;
        }
        applied
    }

    /// Drops a chunk's persisted edits and clean-marks it, reverting to pure
    /// generator output on next regeneration.
    pub fn reset_chunk(&mut self, coord: ChunkCoord) -> bool {
        if let Err(err) = self.store.clear_modifications(coord) {
            warn!("failed to clear persisted mods for {:?}: {err}", coord);
            return false;
        }
        self.pending.remove(&coord);
        if let Some(e) = self.entries.get_mut(&coord) {
            e.dirty = false;
            e.modified.clear();
        }
        true
    }

    /// Merges a finished lighting job. Discards the result unless its
    /// version exactly matches the chunk's current terrain version.
    pub fn apply_light_result(
        &mut self,
        coord: ChunkCoord,
        version: u64,
        volume: LightVolume,
    ) -> bool {
        let Some(e) = self.entries.get_mut(&coord) else {
            debug!("light result for non-resident chunk {:?} discarded", coord);
            return false;
        };
        if e.state.terrain_version != version {
            debug!(
                "stale light result for {:?} (v{} != v{}) discarded",
                coord, version, e.state.terrain_version
            );
            return false;
        }
        e.state.light = Some(volume);
        self.emit(ChunkEventKind::Updated, coord);
        true
    }

    /// Merges a finished mesh/collider job under the same version guard.
    pub fn apply_mesh_result(
        &mut self,
        coord: ChunkCoord,
        version: u64,
        output: ChunkMeshOutput,
    ) -> bool {
        let Some(e) = self.entries.get_mut(&coord) else {
            debug!("mesh result for non-resident chunk {:?} discarded", coord);
            return false;
        };
        if e.state.terrain_version != version {
            debug!(
                "stale mesh result for {:?} (v{} != v{}) discarded",
                coord, version, e.state.terrain_version
            );
            return false;
        }
        e.state.meshes = Some(output);
        self.emit(ChunkEventKind::Updated, coord);
        true
    }

    fn emit(&self, kind: ChunkEventKind, coord: ChunkCoord) {
        let chunk = self.entries.get(&coord).map(|e| &e.state);
        let event = ChunkEvent { kind, coord, chunk };
        for l in self.listeners.iter().filter(|l| l.kind == kind) {
            // A panicking listener must not poison the cache or starve the
            // other listeners.
            if catch_unwind(AssertUnwindSafe(|| (l.f)(&event))).is_err() {
                warn!("chunk event listener {} panicked on {:?}", l.id, kind);
            }
        }
    }
}

#[cfg(test)]
mod tests;
