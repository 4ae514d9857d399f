//! CPU derivation of render meshes and physics colliders from voxel fields.
//!
//! Everything here is a pure function of the input `VoxelField`: no shared
//! state and no randomness, so the same field always yields byte-identical
//! buffers and the work can run on any worker thread against a snapshot.
#![forbid(unsafe_code)]

mod collider;
mod surface;
mod water;

pub use collider::ChunkCollider;
pub use surface::SurfaceMesh;
pub use water::WaterMesh;

use grove_voxel::VoxelField;

/// All derived outputs for one chunk.
#[derive(Clone, Debug)]
pub struct ChunkMeshOutput {
    pub surface: SurfaceMesh,
    pub water: WaterMesh,
    pub collider: ChunkCollider,
}

pub fn build_chunk_meshes(field: &VoxelField) -> ChunkMeshOutput {
    let surface = surface::extract_surface(field);
    let water = water::extract_water(field);
    let collider = collider::derive_collider(field, &surface);
    ChunkMeshOutput {
        surface,
        water,
        collider,
    }
}
