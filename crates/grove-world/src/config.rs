use serde::Deserialize;

#[derive(Clone, Debug, Deserialize)]
pub struct WorldGenConfig {
    #[serde(default = "default_seed")]
    pub seed: i32,
    #[serde(default)]
    pub height: Height,
    #[serde(default)]
    pub caves: Caves,
    #[serde(default)]
    pub water: Water,
    #[serde(default)]
    pub surface: Surface,
}

impl Default for WorldGenConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            height: Height::default(),
            caves: Caves::default(),
            water: Water::default(),
            surface: Surface::default(),
        }
    }
}

fn default_seed() -> i32 {
    1337
}

#[derive(Clone, Debug, Deserialize)]
pub struct Height {
    /// Mean terrain height as a fraction of chunk height.
    #[serde(default = "default_base_ratio")]
    pub base_ratio: f32,
    #[serde(default = "default_height_freq")]
    pub frequency: f32,
    /// Heightmap swing in voxels around the mean.
    #[serde(default = "default_amplitude")]
    pub amplitude: f32,
    #[serde(default = "default_detail_freq")]
    pub detail_frequency: f32,
    #[serde(default = "default_detail_amplitude")]
    pub detail_amplitude: f32,
}

impl Default for Height {
    fn default() -> Self {
        Self {
            base_ratio: default_base_ratio(),
            frequency: default_height_freq(),
            amplitude: default_amplitude(),
            detail_frequency: default_detail_freq(),
            detail_amplitude: default_detail_amplitude(),
        }
    }
}

fn default_base_ratio() -> f32 {
    0.45
}
fn default_height_freq() -> f32 {
    0.012
}
fn default_amplitude() -> f32 {
    10.0
}
fn default_detail_freq() -> f32 {
    0.06
}
fn default_detail_amplitude() -> f32 {
    1.5
}

#[derive(Clone, Debug, Deserialize)]
pub struct Caves {
    #[serde(default = "default_caves_enable")]
    pub enable: bool,
    #[serde(default = "default_cave_freq")]
    pub frequency: f32,
    /// Noise values above this carve air.
    #[serde(default = "default_cave_threshold")]
    pub threshold: f32,
    /// Minimum solid cover above a carved voxel, in voxels.
    #[serde(default = "default_cave_cover")]
    pub min_cover: f32,
}

impl Default for Caves {
    fn default() -> Self {
        Self {
            enable: default_caves_enable(),
            frequency: default_cave_freq(),
            threshold: default_cave_threshold(),
            min_cover: default_cave_cover(),
        }
    }
}

fn default_caves_enable() -> bool {
    true
}
fn default_cave_freq() -> f32 {
    0.05
}
fn default_cave_threshold() -> f32 {
    0.62
}
fn default_cave_cover() -> f32 {
    3.0
}

#[derive(Clone, Debug, Deserialize)]
pub struct Water {
    #[serde(default = "default_water_enable")]
    pub enable: bool,
    /// Sea level as a fraction of chunk height.
    #[serde(default = "default_water_level_ratio")]
    pub level_ratio: f32,
}

impl Default for Water {
    fn default() -> Self {
        Self {
            enable: default_water_enable(),
            level_ratio: default_water_level_ratio(),
        }
    }
}

fn default_water_enable() -> bool {
    true
}
fn default_water_level_ratio() -> f32 {
    0.35
}

#[derive(Clone, Debug, Deserialize)]
pub struct Surface {
    /// Soil thickness below the surface before rock takes over.
    #[serde(default = "default_topsoil")]
    pub topsoil_depth: f32,
    /// Height band above sea level that turns soil into sand.
    #[serde(default = "default_beach_band")]
    pub beach_band: f32,
    #[serde(default = "default_moss_freq")]
    pub moss_frequency: f32,
}

impl Default for Surface {
    fn default() -> Self {
        Self {
            topsoil_depth: default_topsoil(),
            beach_band: default_beach_band(),
            moss_frequency: default_moss_freq(),
        }
    }
}

fn default_topsoil() -> f32 {
    3.0
}
fn default_beach_band() -> f32 {
    1.5
}
fn default_moss_freq() -> f32 {
    0.08
}
