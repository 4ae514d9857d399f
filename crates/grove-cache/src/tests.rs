use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use grove_lighting::{SkyLight, compute_light_volume};
use grove_mesh_cpu::build_chunk_meshes;
use grove_persist::{MemoryStore, PersistError, PersistenceStore, VoxelMod};
use grove_voxel::{ChunkCoord, ChunkDims, VoxelField, material};

use super::*;

const DIMS: ChunkDims = ChunkDims {
    size_xz: 10,
    size_y: 10,
};

fn ground_field() -> VoxelField {
    let mut f = VoxelField::new_empty(DIMS);
    for y in 0..5 {
        for z in 0..DIMS.size_xz {
            for x in 0..DIMS.size_xz {
                let idx = DIMS.idx(x, y, z);
                f.density[idx] = 1.0;
                f.material[idx] = material::MAT_SOIL;
            }
        }
    }
    f
}

fn cache_with_capacity(capacity: usize) -> ChunkCache<MemoryStore> {
    ChunkCache::new(MemoryStore::new(), capacity, Duration::from_millis(50))
}

fn edit_at(x: usize, y: usize, z: usize) -> VoxelEdit {
    VoxelEdit {
        x,
        y,
        z,
        density: 9.0,
        material: Some(material::MAT_ROCK),
    }
}

/// Store that rejects the first `failures_left` writes, for retry tests.
struct FlakyStore {
    inner: MemoryStore,
    failures_left: u32,
}

impl PersistenceStore for FlakyStore {
    fn put_modifications(
        &mut self,
        chunk: ChunkCoord,
        mods: &[VoxelMod],
    ) -> Result<(), PersistError> {
        if self.failures_left > 0 {
            self.failures_left -= 1;
            return Err(PersistError::Unavailable("injected outage".into()));
        }
        self.inner.put_modifications(chunk, mods)
    }

    fn get_modifications(&self, chunk: ChunkCoord) -> Result<Vec<VoxelMod>, PersistError> {
        self.inner.get_modifications(chunk)
    }

    fn clear_modifications(&mut self, chunk: ChunkCoord) -> Result<(), PersistError> {
        self.inner.clear_modifications(chunk)
    }
}

#[test]
fn add_chunk_emits_ready_and_is_resident() {
    let mut cache = cache_with_capacity(8);
    let hits = Arc::new(AtomicUsize::new(0));
    let hits2 = Arc::clone(&hits);
    cache.on(ChunkEventKind::Ready, move |ev| {
        assert_eq!(ev.coord, ChunkCoord::new(1, 2));
        assert!(ev.chunk.is_some());
        hits2.fetch_add(1, Ordering::SeqCst);
    });
    cache.add_chunk(ChunkCoord::new(1, 2), ground_field());
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert!(cache.has_chunk(ChunkCoord::new(1, 2)));
    assert_eq!(cache.terrain_version(ChunkCoord::new(1, 2)), Some(1));
}

#[test]
fn eviction_never_removes_dirty_chunks() {
    let mut cache = cache_with_capacity(4);
    for i in 0..4 {
        cache.add_chunk(ChunkCoord::new(i, 0), ground_field());
    }
    let edited = ChunkCoord::new(0, 0);
    assert!(cache.modify_terrain(edited, &[edit_at(1, 1, 1)]));
    // Two more inserts push the cache over capacity twice; the oldest
    // clean chunks go, the dirty one stays.
    cache.add_chunk(ChunkCoord::new(4, 0), ground_field());
    cache.add_chunk(ChunkCoord::new(5, 0), ground_field());
    assert_eq!(cache.resident_count(), 4);
    assert!(cache.has_chunk(edited));
    assert!(!cache.has_chunk(ChunkCoord::new(1, 0)));
    assert!(!cache.has_chunk(ChunkCoord::new(2, 0)));
    assert_eq!(cache.stats().evictions, 2);
}

#[test]
fn all_dirty_cache_exceeds_capacity_without_panicking() {
    let mut cache = cache_with_capacity(2);
    for i in 0..4 {
        let coord = ChunkCoord::new(i, 0);
        cache.add_chunk(coord, ground_field());
        cache.modify_terrain(coord, &[edit_at(0, 0, 0)]);
    }
    assert_eq!(cache.resident_count(), 4);
    assert_eq!(cache.stats().evictions, 0);
}

#[test]
fn capacity_overflow_keeps_most_recent() {
    let capacity = 6;
    let mut cache = cache_with_capacity(capacity);
    for i in 0..(capacity as i32 + 5) {
        cache.add_chunk(ChunkCoord::new(i, 0), ground_field());
    }
    assert_eq!(cache.resident_count(), capacity);
    for i in 0..5 {
        assert!(!cache.has_chunk(ChunkCoord::new(i, 0)), "chunk {i} evicted");
    }
    for i in 5..(capacity as i32 + 5) {
        assert!(cache.has_chunk(ChunkCoord::new(i, 0)), "chunk {i} resident");
    }
}

#[test]
fn get_chunk_refreshes_recency() {
    let mut cache = cache_with_capacity(2);
    let a = ChunkCoord::new(0, 0);
    let b = ChunkCoord::new(1, 0);
    cache.add_chunk(a, ground_field());
    cache.add_chunk(b, ground_field());
    assert!(cache.get_chunk(a).is_some());
    cache.add_chunk(ChunkCoord::new(2, 0), ground_field());
    assert!(cache.has_chunk(a), "recently read chunk survives");
    assert!(!cache.has_chunk(b), "stalest chunk evicted");
    let stats = cache.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 0);
}

#[test]
fn dirty_flag_survives_flush() {
    let mut cache = cache_with_capacity(4);
    let coord = ChunkCoord::new(0, 0);
    cache.add_chunk(coord, ground_field());
    cache.modify_terrain(coord, &[edit_at(2, 2, 2)]);
    assert!(cache.is_dirty(coord));
    cache.tick(Instant::now() + Duration::from_secs(1));
    assert_eq!(cache.store().chunk_count(), 1, "edits reached the store");
    assert!(cache.is_dirty(coord), "dirty means diverged, not unsaved");
}

#[test]
fn merge_preserves_edited_voxels_and_refreshes_layers() {
    let mut cache = cache_with_capacity(4);
    let coord = ChunkCoord::new(0, 0);
    cache.add_chunk(coord, ground_field());
    cache.modify_terrain(coord, &[edit_at(3, 3, 3)]);
    let v_before = cache.terrain_version(coord).unwrap();

    let regen =
        ground_field().with_surface_layers(vec![200; DIMS.volume()], vec![50; DIMS.volume()]);
    cache.add_chunk(coord, regen);

    let state = cache.peek_chunk(coord).unwrap();
    let idx = DIMS.interior_idx(3, 3, 3);
    assert_eq!(state.field.density[idx], 9.0, "edit kept through merge");
    assert_eq!(state.field.material[idx], material::MAT_ROCK);
    assert_eq!(state.field.wetness.as_ref().unwrap()[idx], 200);
    assert_eq!(state.field.mossiness.as_ref().unwrap()[idx], 50);
    assert_eq!(state.terrain_version, v_before + 1);
    assert!(cache.is_dirty(coord));
}

#[test]
fn clean_chunk_is_replaced_wholesale() {
    let mut cache = cache_with_capacity(4);
    let coord = ChunkCoord::new(0, 0);
    cache.add_chunk(coord, ground_field());
    let mut taller = VoxelField::new_empty(DIMS);
    taller.density[DIMS.idx(4, 8, 4)] = 1.0;
    cache.add_chunk(coord, taller);
    let state = cache.peek_chunk(coord).unwrap();
    assert_eq!(state.field.density[DIMS.idx(4, 8, 4)], 1.0);
    assert_eq!(state.field.density[DIMS.idx(4, 1, 4)], -1.0);
    assert_eq!(state.terrain_version, 2);
    assert!(!cache.is_dirty(coord));
}

#[test]
fn stale_results_are_discarded_and_fresh_applied_idempotently() {
    let mut cache = cache_with_capacity(4);
    let coord = ChunkCoord::new(0, 0);
    cache.add_chunk(coord, ground_field());
    let stale_version = cache.terrain_version(coord).unwrap();

    // Edit twice while a job computed at the old version is "in flight".
    cache.modify_terrain(coord, &[edit_at(1, 1, 1)]);
    cache.modify_terrain(coord, &[edit_at(2, 2, 2)]);
    let current = cache.terrain_version(coord).unwrap();
    assert_eq!(current, stale_version + 2);

    let field = cache.peek_chunk(coord).unwrap().field.clone();
    let meshes = build_chunk_meshes(&field);
    let light = compute_light_volume(&field, &[], &SkyLight::default(), 4);

    assert!(!cache.apply_mesh_result(coord, stale_version, meshes.clone()));
    assert!(!cache.apply_light_result(coord, stale_version, light.clone()));
    assert!(cache.peek_chunk(coord).unwrap().meshes.is_none());
    assert!(cache.peek_chunk(coord).unwrap().light.is_none());

    assert!(cache.apply_mesh_result(coord, current, meshes.clone()));
    assert!(cache.apply_light_result(coord, current, light.clone()));
    // Re-applying the same result is harmless.
    assert!(cache.apply_mesh_result(coord, current, meshes));
    assert!(cache.apply_light_result(coord, current, light));
    assert!(cache.peek_chunk(coord).unwrap().meshes.is_some());
    assert!(cache.peek_chunk(coord).unwrap().light.is_some());
}

#[test]
fn edit_evict_reload_round_trip() {
    let mut cache = cache_with_capacity(4);
    let coord = ChunkCoord::new(7, -2);
    cache.add_chunk(coord, ground_field());
    cache.modify_terrain(coord, &[edit_at(4, 4, 4)]);

    // Force-evict flushes synchronously even though the debounce deadline
    // has not passed.
    assert!(cache.force_evict(coord));
    assert!(!cache.has_chunk(coord));
    assert_eq!(cache.store().chunk_count(), 1);

    cache.add_chunk(coord, ground_field());
    assert!(cache.apply_persisted_modifications(coord));
    let state = cache.peek_chunk(coord).unwrap();
    let idx = DIMS.interior_idx(4, 4, 4);
    assert_eq!(state.field.density[idx], 9.0);
    assert_eq!(state.field.material[idx], material::MAT_ROCK);
    assert!(cache.is_dirty(coord));
}

#[test]
fn apply_persisted_is_a_no_op_without_records() {
    let mut cache = cache_with_capacity(4);
    let coord = ChunkCoord::new(0, 0);
    cache.add_chunk(coord, ground_field());
    assert!(!cache.apply_persisted_modifications(coord));
    assert!(!cache.is_dirty(coord));
    assert_eq!(cache.terrain_version(coord), Some(1));
}

#[test]
fn modify_terrain_on_absent_chunk_returns_false() {
    let mut cache = cache_with_capacity(4);
    assert!(!cache.modify_terrain(ChunkCoord::new(9, 9), &[edit_at(0, 0, 0)]));
}

#[test]
fn out_of_bounds_edit_is_skipped_but_valid_edits_apply() {
    let mut cache = cache_with_capacity(4);
    let coord = ChunkCoord::new(0, 0);
    cache.add_chunk(coord, ground_field());
    let n = DIMS.interior_xz();
    assert!(cache.modify_terrain(coord, &[edit_at(n, 0, 0), edit_at(1, 1, 1)]));
    let state = cache.peek_chunk(coord).unwrap();
    assert_eq!(state.field.density[DIMS.interior_idx(1, 1, 1)], 9.0);
}

#[test]
fn debounce_rearms_and_flushes_after_deadline() {
    let mut cache = cache_with_capacity(4);
    let coord = ChunkCoord::new(0, 0);
    cache.add_chunk(coord, ground_field());
    let t0 = Instant::now();
    cache.modify_terrain(coord, &[edit_at(1, 1, 1)]);
    // Deadline is 50ms out; an early tick must not flush.
    cache.tick(t0);
    assert_eq!(cache.store().chunk_count(), 0);
    cache.modify_terrain(coord, &[edit_at(2, 2, 2)]);
    cache.tick(Instant::now() + Duration::from_secs(1));
    let mods = cache.store().get_modifications(coord).unwrap();
    assert_eq!(mods.len(), 2, "burst of edits became one write");
}

#[test]
fn failed_persist_is_requeued_and_retried() {
    let store = FlakyStore {
        inner: MemoryStore::new(),
        failures_left: 1,
    };
    let mut cache = ChunkCache::new(store, 4, Duration::from_millis(10));
    let coord = ChunkCoord::new(0, 0);
    cache.add_chunk(coord, ground_field());
    cache.modify_terrain(coord, &[edit_at(1, 1, 1)]);

    cache.tick(Instant::now() + Duration::from_secs(1));
    assert!(cache.store().get_modifications(coord).unwrap().is_empty());

    // The outage is over; the re-armed deadline retries the write.
    cache.tick(Instant::now() + Duration::from_secs(2));
    assert_eq!(cache.store().get_modifications(coord).unwrap().len(), 1);
}

#[test]
fn save_all_dirty_flushes_without_waiting() {
    let mut cache = cache_with_capacity(4);
    let a = ChunkCoord::new(0, 0);
    let b = ChunkCoord::new(1, 0);
    cache.add_chunk(a, ground_field());
    cache.add_chunk(b, ground_field());
    cache.modify_terrain(a, &[edit_at(1, 1, 1)]);
    cache.modify_terrain(b, &[edit_at(2, 2, 2)]);
    cache.save_all_dirty();
    assert_eq!(cache.store().chunk_count(), 2);
    // Nothing left pending: a later tick writes nothing new.
    cache.tick(Instant::now() + Duration::from_secs(5));
    assert_eq!(cache.store().get_modifications(a).unwrap().len(), 1);
}

#[test]
fn reset_chunk_drops_records_and_clean_marks() {
    let mut cache = cache_with_capacity(4);
    let coord = ChunkCoord::new(0, 0);
    cache.add_chunk(coord, ground_field());
    cache.modify_terrain(coord, &[edit_at(1, 1, 1)]);
    cache.save_all_dirty();
    assert!(cache.reset_chunk(coord));
    assert!(!cache.is_dirty(coord));
    assert!(cache.store().get_modifications(coord).unwrap().is_empty());
}

#[test]
fn modify_emits_dirty_then_updated() {
    let (tx, rx) = mpsc::channel::<&'static str>();
    let mut cache = cache_with_capacity(4);
    let tx_dirty = tx.clone();
    cache.on(ChunkEventKind::Dirty, move |_| {
        let _ = tx_dirty.send("dirty");
    });
    cache.on(ChunkEventKind::Updated, move |_| {
        let _ = tx.send("updated");
    });
    let coord = ChunkCoord::new(0, 0);
    cache.add_chunk(coord, ground_field());
    cache.modify_terrain(coord, &[edit_at(1, 1, 1)]);
    let order: Vec<&str> = rx.try_iter().collect();
    assert_eq!(order, vec!["dirty", "updated"]);
}

#[test]
fn panicking_listener_does_not_starve_others() {
    let mut cache = cache_with_capacity(4);
    cache.on(ChunkEventKind::Ready, |_| panic!("listener bug"));
    let seen = Arc::new(AtomicUsize::new(0));
    let seen2 = Arc::clone(&seen);
    cache.on(ChunkEventKind::Ready, move |_| {
        seen2.fetch_add(1, Ordering::SeqCst);
    });
    cache.add_chunk(ChunkCoord::new(0, 0), ground_field());
    assert_eq!(seen.load(Ordering::SeqCst), 1);
}

#[test]
fn off_unregisters_a_listener() {
    let mut cache = cache_with_capacity(4);
    let seen = Arc::new(AtomicUsize::new(0));
    let seen2 = Arc::clone(&seen);
    let id = cache.on(ChunkEventKind::Ready, move |_| {
        seen2.fetch_add(1, Ordering::SeqCst);
    });
    assert!(cache.off(id));
    assert!(!cache.off(id));
    cache.add_chunk(ChunkCoord::new(0, 0), ground_field());
    assert_eq!(seen.load(Ordering::SeqCst), 0);
}

#[test]
fn remove_event_fires_on_eviction() {
    let removed = Arc::new(AtomicUsize::new(0));
    let removed2 = Arc::clone(&removed);
    let mut cache = cache_with_capacity(1);
    cache.on(ChunkEventKind::Remove, move |ev| {
        assert!(ev.chunk.is_none());
        removed2.fetch_add(1, Ordering::SeqCst);
    });
    cache.add_chunk(ChunkCoord::new(0, 0), ground_field());
    cache.add_chunk(ChunkCoord::new(1, 0), ground_field());
    assert_eq!(removed.load(Ordering::SeqCst), 1);
}
