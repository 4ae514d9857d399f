//! Engine configuration, loadable from TOML with per-field defaults.

use serde::Deserialize;
use std::error::Error;
use std::fs;
use std::path::Path;

use grove_world::WorldGenConfig;

#[derive(Clone, Debug, Deserialize)]
pub struct EngineConfig {
    /// Interior chunk footprint in voxels.
    #[serde(default = "default_chunk_size_xz")]
    pub chunk_size_xz: usize,
    #[serde(default = "default_chunk_size_y")]
    pub chunk_size_y: usize,
    /// Resident chunk ceiling before clean chunks get evicted.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    /// Quiet period after an edit before its chunk is persisted.
    #[serde(default = "default_persist_debounce_ms")]
    pub persist_debounce_ms: u64,
    /// Light grid cell edge in voxels.
    #[serde(default = "default_light_cell_size")]
    pub light_cell_size: usize,
    #[serde(default)]
    pub worldgen: WorldGenConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_size_xz: default_chunk_size_xz(),
            chunk_size_y: default_chunk_size_y(),
            cache_capacity: default_cache_capacity(),
            persist_debounce_ms: default_persist_debounce_ms(),
            light_cell_size: default_light_cell_size(),
            worldgen: WorldGenConfig::default(),
        }
    }
}

fn default_chunk_size_xz() -> usize {
    32
}
fn default_chunk_size_y() -> usize {
    64
}
fn default_cache_capacity() -> usize {
    64
}
fn default_persist_debounce_ms() -> u64 {
    2_000
}
fn default_light_cell_size() -> usize {
    4
}

pub fn load_config_from_path(path: &Path) -> Result<EngineConfig, Box<dyn Error>> {
    let s = fs::read_to_string(path)?;
    let cfg: EngineConfig = toml::from_str(&s)?;
    Ok(cfg)
}
