//! Streaming voxel world core: deterministic generation, a single-writer
//! chunk cache with edit persistence, and background lighting/meshing.
#![forbid(unsafe_code)]

pub mod config;
pub mod engine;

pub use config::{EngineConfig, load_config_from_path};
pub use engine::{Engine, PumpSummary};
