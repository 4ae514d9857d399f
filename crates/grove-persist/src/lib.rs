//! Durable storage contract for player-made voxel edits.
//!
//! Only edits are persisted; clean chunks regenerate bit-for-bit from the
//! deterministic generator, so the store holds `(chunk, voxel index) ->
//! (material, density)` records with last-write-wins semantics.
#![forbid(unsafe_code)]

use std::collections::HashMap;

use grove_voxel::ChunkCoord;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("write rejected: {0}")]
    WriteFailed(String),
}

/// One persisted voxel override. `voxel_index` is the padded flat index
/// into the chunk's buffers.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VoxelMod {
    pub voxel_index: u32,
    pub material: u8,
    pub density: f32,
}

/// Bulk upsert / fetch / clear contract consumed by the chunk cache.
/// `put_modifications` is idempotent on `(chunk, voxel_index)`.
pub trait PersistenceStore {
    fn put_modifications(&mut self, chunk: ChunkCoord, mods: &[VoxelMod])
    -> Result<(), PersistError>;
    fn get_modifications(&self, chunk: ChunkCoord) -> Result<Vec<VoxelMod>, PersistError>;
    fn clear_modifications(&mut self, chunk: ChunkCoord) -> Result<(), PersistError>;
}

/// In-memory reference store.
#[derive(Default)]
pub struct MemoryStore {
    inner: HashMap<ChunkCoord, HashMap<u32, (u8, f32)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chunk_count(&self) -> usize {
        self.inner.len()
    }
}

impl PersistenceStore for MemoryStore {
    fn put_modifications(
        &mut self,
        chunk: ChunkCoord,
        mods: &[VoxelMod],
    ) -> Result<(), PersistError> {
        let entry = self.inner.entry(chunk).or_default();
        for m in mods {
            entry.insert(m.voxel_index, (m.material, m.density));
        }
        Ok(())
    }

    fn get_modifications(&self, chunk: ChunkCoord) -> Result<Vec<VoxelMod>, PersistError> {
        let Some(entry) = self.inner.get(&chunk) else {
            return Ok(Vec::new());
        };
        let mut out: Vec<VoxelMod> = entry
            .iter()
            .map(|(idx, (mat, den))| VoxelMod {
                voxel_index: *idx,
                material: *mat,
                density: *den,
            })
            .collect();
        // Stable replay order regardless of map iteration order.
        out.sort_by_key(|m| m.voxel_index);
        Ok(out)
    }

    fn clear_modifications(&mut self, chunk: ChunkCoord) -> Result<(), PersistError> {
        self.inner.remove(&chunk);
        Ok(())
    }
}
