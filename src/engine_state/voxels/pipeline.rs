//! Shared state between the chunk manager and its worker tasks.
//!
//! The manager builds one [`GenerationContext`] and one [`MeshingContext`] at startup
//! and hands an `Arc` of the relevant one to every task it publishes. Outcomes are
//! tallied in [`PipelineCounters`] and surfaced through [`PipelineStats`].

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use serde::Serialize;

use crate::{
    core::MtResource,
    engine_state::{
        rendering::mesher::ChunkMesher, task_management::TaskQueue,
        voxels::{chunk::position::ChunkPosition, terrain::TerrainGenerator},
    },
};

/// Running totals updated by workers.
#[derive(Debug, Default)]
pub struct PipelineCounters {
    chunks_generated: AtomicUsize,
    meshes_built: AtomicUsize,
    generation_failures: AtomicUsize,
    meshing_failures: AtomicUsize,
    dropped_jobs: AtomicUsize,
    deferred_jobs: AtomicUsize,
}

macro_rules! counter {
    ($record:ident, $read:ident) => {
        #[doc = concat!("Increments `", stringify!($read), "`.")]
        pub fn $record(&self) {
            self.$read.fetch_add(1, Ordering::Relaxed);
        }

        #[doc = concat!("Current value of `", stringify!($read), "`.")]
        pub fn $read(&self) -> usize {
            self.$read.load(Ordering::Relaxed)
        }
    };
}

impl PipelineCounters {
    counter!(record_generated, chunks_generated);
    counter!(record_mesh_built, meshes_built);
    counter!(record_generation_failure, generation_failures);
    counter!(record_meshing_failure, meshing_failures);
    counter!(record_dropped_job, dropped_jobs);
    counter!(record_deferred_job, deferred_jobs);
}

/// A point-in-time summary of the pipeline.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    /// Chunks in the table.
    pub tracked: usize,
    /// Chunks with generated terrain.
    pub ready: usize,
    /// Chunks holding a mesh.
    pub meshed: usize,
    /// Generated chunks waiting for a mesh rebuild.
    pub dirty: usize,
    /// Tasks waiting in the generation queue.
    pub queued_generation: usize,
    /// Tasks waiting in the meshing queue.
    pub queued_meshing: usize,
    /// Generation tasks queued or running.
    pub pending_generation: usize,
    /// Meshing tasks queued or running.
    pub pending_meshing: usize,
    /// Idle voxel buffers in the storage pool.
    pub pooled_storage: usize,
    /// Unloaded chunks still referenced elsewhere, awaiting storage reclaim.
    pub retired: usize,
    /// Chunks generated since startup.
    pub chunks_generated: usize,
    /// Meshes built since startup.
    pub meshes_built: usize,
    /// Generation failures since startup.
    pub generation_failures: usize,
    /// Meshing failures since startup.
    pub meshing_failures: usize,
    /// Generation jobs dropped because the observer moved away.
    pub dropped_jobs: usize,
    /// Generation jobs put off because the queue was full.
    pub deferred_jobs: usize,
}

/// Everything a meshing task needs besides its chunk.
pub struct MeshingContext {
    /// The external mesher.
    pub mesher: Arc<dyn ChunkMesher>,
    /// Shared counters.
    pub counters: Arc<PipelineCounters>,
}

/// Everything a generation task needs besides its chunk.
pub struct GenerationContext {
    /// The external terrain generator.
    pub generator: Arc<dyn TerrainGenerator>,
    /// World seed.
    pub seed: u32,
    /// Load radius, in chunks.
    pub load_radius: i32,
    /// The observer's chunk as of the last manager tick.
    pub observer: MtResource<ChunkPosition>,
    /// Where finished chunks are sent for meshing.
    pub meshing_queue: TaskQueue,
    /// Context for the meshing tasks this stage publishes.
    pub meshing: Arc<MeshingContext>,
    /// Shared counters.
    pub counters: Arc<PipelineCounters>,
}
