//! Background job queues for lighting and mesh derivation.
//!
//! Workers consume immutable field snapshots and never touch cache state;
//! results flow back through a single channel that the engine drains on its
//! own thread and merges under the terrain version guard.
#![forbid(unsafe_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender, unbounded};
use grove_lighting::{LightSource, LightVolume, SkyLight, compute_light_volume};
use grove_mesh_cpu::{ChunkMeshOutput, build_chunk_meshes};
use grove_voxel::{ChunkCoord, VoxelField};
use log::warn;
use rayon::{ThreadPool, ThreadPoolBuilder};

/// Lighting work order. The field is a snapshot taken at `version`.
#[derive(Clone)]
pub struct LightJob {
    pub coord: ChunkCoord,
    pub version: u64,
    pub field: Arc<VoxelField>,
    pub lights: Vec<LightSource>,
    pub sky: SkyLight,
    pub cell_size: usize,
}

/// Mesh/collider work order.
#[derive(Clone)]
pub struct MeshJob {
    pub coord: ChunkCoord,
    pub version: u64,
    pub field: Arc<VoxelField>,
}

pub enum JobResult {
    Light {
        coord: ChunkCoord,
        version: u64,
        volume: LightVolume,
        t_ms: u32,
    },
    Mesh {
        coord: ChunkCoord,
        version: u64,
        output: ChunkMeshOutput,
        t_ms: u32,
    },
}

impl JobResult {
    pub fn coord(&self) -> ChunkCoord {
        match self {
            JobResult::Light { coord, .. } | JobResult::Mesh { coord, .. } => *coord,
        }
    }

    pub fn version(&self) -> u64 {
        match self {
            JobResult::Light { version, .. } | JobResult::Mesh { version, .. } => *version,
        }
    }
}

fn elapsed_ms(t0: Instant) -> u32 {
    t0.elapsed().as_millis().min(u128::from(u32::MAX)) as u32
}

fn process_light_job(job: LightJob, tx: &Sender<JobResult>) {
    let t0 = Instant::now();
    let volume = compute_light_volume(&job.field, &job.lights, &job.sky, job.cell_size);
    let _ = tx.send(JobResult::Light {
        coord: job.coord,
        version: job.version,
        volume,
        t_ms: elapsed_ms(t0),
    });
}

fn process_mesh_job(job: MeshJob, tx: &Sender<JobResult>) {
    let t0 = Instant::now();
    let output = build_chunk_meshes(&job.field);
    let _ = tx.send(JobResult::Mesh {
        coord: job.coord,
        version: job.version,
        output,
        t_ms: elapsed_ms(t0),
    });
}

pub struct Runtime {
    light_tx: Sender<LightJob>,
    mesh_tx: Sender<MeshJob>,
    res_rx: Receiver<JobResult>,
    _light_pool: Arc<ThreadPool>,
    _mesh_pool: Arc<ThreadPool>,
    q_light: Arc<AtomicUsize>,
    q_mesh: Arc<AtomicUsize>,
    inflight_light: Arc<AtomicUsize>,
    inflight_mesh: Arc<AtomicUsize>,
    pub w_light: usize,
    pub w_mesh: usize,
}

impl Runtime {
    pub fn new() -> Self {
        let worker_count: usize = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        // Meshing dominates; lighting gets one dedicated worker so a burst
        // of mesh jobs cannot starve it.
        let w_light = 1usize;
        let w_mesh = worker_count.saturating_sub(w_light).max(1);
        Self::with_workers(w_light, w_mesh)
    }

    pub fn with_workers(w_light: usize, w_mesh: usize) -> Self {
        let w_light = w_light.max(1);
        let w_mesh = w_mesh.max(1);
        let (light_tx, light_rx) = unbounded::<LightJob>();
        let (mesh_tx, mesh_rx) = unbounded::<MeshJob>();
        let (res_tx, res_rx) = unbounded::<JobResult>();

        let q_light = Arc::new(AtomicUsize::new(0));
        let q_mesh = Arc::new(AtomicUsize::new(0));
        let inflight_light = Arc::new(AtomicUsize::new(0));
        let inflight_mesh = Arc::new(AtomicUsize::new(0));

        let light_pool = Arc::new(
            ThreadPoolBuilder::new()
                .num_threads(w_light)
                .thread_name(|i| format!("grove-light-{i}"))
                .build()
                .expect("light pool"),
        );
        for _ in 0..w_light {
            let rx = light_rx.clone();
            let tx = res_tx.clone();
            let q = q_light.clone();
            let inflight = inflight_light.clone();
            light_pool.spawn(move || {
                while let Ok(job) = rx.recv() {
                    q.fetch_sub(1, Ordering::Relaxed);
                    inflight.fetch_add(1, Ordering::Relaxed);
                    process_light_job(job, &tx);
                    inflight.fetch_sub(1, Ordering::Relaxed);
                }
            });
        }

        let mesh_pool = Arc::new(
            ThreadPoolBuilder::new()
                .num_threads(w_mesh)
                .thread_name(|i| format!("grove-mesh-{i}"))
                .build()
                .expect("mesh pool"),
        );
        for _ in 0..w_mesh {
            let rx = mesh_rx.clone();
            let tx = res_tx.clone();
            let q = q_mesh.clone();
            let inflight = inflight_mesh.clone();
            mesh_pool.spawn(move || {
                while let Ok(job) = rx.recv() {
                    q.fetch_sub(1, Ordering::Relaxed);
                    inflight.fetch_add(1, Ordering::Relaxed);
                    process_mesh_job(job, &tx);
                    inflight.fetch_sub(1, Ordering::Relaxed);
                }
            });
        }

        Self {
            light_tx,
            mesh_tx,
            res_rx,
            _light_pool: light_pool,
            _mesh_pool: mesh_pool,
            q_light,
            q_mesh,
            inflight_light,
            inflight_mesh,
            w_light,
            w_mesh,
        }
    }

    pub fn submit_light_job(&self, job: LightJob) {
        let coord = job.coord;
        self.q_light.fetch_add(1, Ordering::Relaxed);
        if self.light_tx.send(job).is_err() {
            self.q_light.fetch_sub(1, Ordering::Relaxed);
            warn!("light workers gone, dropping job for {:?}", coord);
        }
    }

    pub fn submit_mesh_job(&self, job: MeshJob) {
        let coord = job.coord;
        self.q_mesh.fetch_add(1, Ordering::Relaxed);
        if self.mesh_tx.send(job).is_err() {
            self.q_mesh.fetch_sub(1, Ordering::Relaxed);
            warn!("mesh workers gone, dropping job for {:?}", coord);
        }
    }

    /// Non-blocking drain of every finished job.
    pub fn drain_results(&self) -> Vec<JobResult> {
        self.res_rx.try_iter().collect()
    }

    /// `(queued_light, inflight_light, queued_mesh, inflight_mesh)`.
    pub fn queue_debug_counts(&self) -> (usize, usize, usize, usize) {
        (
            self.q_light.load(Ordering::Relaxed),
            self.inflight_light.load(Ordering::Relaxed),
            self.q_mesh.load(Ordering::Relaxed),
            self.inflight_mesh.load(Ordering::Relaxed),
        )
    }

    pub fn idle(&self) -> bool {
        let (ql, il, qm, im) = self.queue_debug_counts();
        ql == 0 && il == 0 && qm == 0 && im == 0
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grove_voxel::{ChunkDims, material};
    use std::time::Duration;

    fn ground_field() -> Arc<VoxelField> {
        let dims = ChunkDims::new(8, 8);
        let mut f = VoxelField::new_empty(dims);
        for y in 0..4 {
            for z in 0..dims.size_xz {
                for x in 0..dims.size_xz {
                    let idx = dims.idx(x, y, z);
                    f.density[idx] = 1.0;
                    f.material[idx] = material::MAT_SOIL;
                }
            }
        }
        Arc::new(f)
    }

    fn drain_until(rt: &Runtime, want: usize) -> Vec<JobResult> {
        let deadline = Instant::now() + Duration::from_secs(10);
        let mut out = Vec::new();
        while out.len() < want && Instant::now() < deadline {
            out.extend(rt.drain_results());
            thread::sleep(Duration::from_millis(5));
        }
        out
    }

    #[test]
    fn mesh_job_round_trips_with_coord_and_version() {
        let rt = Runtime::with_workers(1, 1);
        let coord = ChunkCoord::new(3, -1);
        rt.submit_mesh_job(MeshJob {
            coord,
            version: 7,
            field: ground_field(),
        });
        let results = drain_until(&rt, 1);
        assert_eq!(results.len(), 1);
        match &results[0] {
            JobResult::Mesh {
                coord: c,
                version,
                output,
                ..
            } => {
                assert_eq!(*c, coord);
                assert_eq!(*version, 7);
                assert!(!output.surface.positions.is_empty());
            }
            JobResult::Light { .. } => panic!("expected mesh result"),
        }
        assert!(rt.idle());
    }

    #[test]
    fn light_job_round_trips() {
        let rt = Runtime::with_workers(1, 1);
        let coord = ChunkCoord::new(0, 0);
        rt.submit_light_job(LightJob {
            coord,
            version: 2,
            field: ground_field(),
            lights: Vec::new(),
            sky: SkyLight::default(),
            cell_size: 4,
        });
        let results = drain_until(&rt, 1);
        assert_eq!(results.len(), 1);
        match &results[0] {
            JobResult::Light {
                coord: c,
                version,
                volume,
                ..
            } => {
                assert_eq!(*c, coord);
                assert_eq!(*version, 2);
                assert!(volume.nx > 0 && volume.ny > 0 && volume.nz > 0);
            }
            JobResult::Mesh { .. } => panic!("expected light result"),
        }
    }

    #[test]
    fn many_jobs_all_come_back() {
        let rt = Runtime::with_workers(1, 2);
        let field = ground_field();
        for i in 0..12 {
            rt.submit_mesh_job(MeshJob {
                coord: ChunkCoord::new(i, 0),
                version: 1,
                field: Arc::clone(&field),
            });
        }
        let results = drain_until(&rt, 12);
        assert_eq!(results.len(), 12);
        let mut coords: Vec<i32> = results.iter().map(|r| r.coord().cx).collect();
        coords.sort_unstable();
        assert_eq!(coords, (0..12).collect::<Vec<_>>());
    }
}
