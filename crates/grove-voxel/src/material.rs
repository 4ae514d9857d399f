//! Per-voxel material ids.

pub const MAT_AIR: u8 = 0;
pub const MAT_SOIL: u8 = 1;
pub const MAT_ROCK: u8 = 2;
pub const MAT_SAND: u8 = 3;
pub const MAT_WATER: u8 = 4;
pub const MAT_MOSS: u8 = 5;

#[inline]
pub fn is_liquid(mat: u8) -> bool {
    mat == MAT_WATER
}
