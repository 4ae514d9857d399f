use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Parser;
use grove::{Engine, EngineConfig, load_config_from_path};
use grove_cache::VoxelEdit;
use grove_voxel::{ChunkCoord, material};

#[derive(Parser, Debug)]
#[command(name = "grove", about = "Stream a region of voxel terrain headlessly")]
struct Args {
    /// Engine config TOML; defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    /// World seed override.
    #[arg(long)]
    seed: Option<i32>,
    /// Chunk radius around the origin to stream.
    #[arg(long, default_value_t = 2)]
    radius: i32,
    /// Carve a test edit into the origin chunk before shutdown.
    #[arg(long)]
    edit: bool,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = match &args.config {
        Some(path) => match load_config_from_path(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                log::error!("failed to load {}: {err}", path.display());
                std::process::exit(1);
            }
        },
        None => EngineConfig::default(),
    };
    if let Some(seed) = args.seed {
        cfg.worldgen.seed = seed;
    }

    let mut engine = Engine::with_memory_store(cfg);
    let center = ChunkCoord::new(0, 0);
    let t0 = Instant::now();
    engine.stream_around(center, args.radius);
    log::info!(
        "queued {} chunks in {:?}",
        engine.cache().resident_count(),
        t0.elapsed()
    );

    if args.edit {
        engine.edit(
            center,
            &[VoxelEdit {
                x: 2,
                y: 2,
                z: 2,
                density: -2.0,
                material: Some(material::MAT_AIR),
            }],
        );
    }

    // Drain workers until everything queued has been merged back.
    let deadline = Instant::now() + Duration::from_secs(60);
    let mut merged = 0usize;
    loop {
        let s = engine.pump(Instant::now());
        merged += s.light_applied + s.mesh_applied;
        if engine.runtime().idle() {
            // One last drain for results that landed between checks.
            let s = engine.pump(Instant::now());
            merged += s.light_applied + s.mesh_applied;
            break;
        }
        if Instant::now() > deadline {
            log::warn!("worker drain timed out");
            break;
        }
        std::thread::sleep(Duration::from_millis(5));
    }

    let mut surface_verts = 0usize;
    let mut water_verts = 0usize;
    for coord in engine.cache().resident_coords() {
        if let Some(state) = engine.cache().peek_chunk(coord)
            && let Some(meshes) = state.meshes.as_ref()
        {
            surface_verts += meshes.surface.vertex_count();
            water_verts += meshes.water.vertex_count();
        }
    }
    log::info!("merged {merged} results: {surface_verts} surface verts, {water_verts} water verts");

    engine.shutdown();
}
