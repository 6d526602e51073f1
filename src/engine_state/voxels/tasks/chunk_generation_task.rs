//! # Chunk Generation Task
//!
//! This module defines the `ChunkGenerationTask`, which fills one chunk with terrain on
//! a generation worker and then hands it to the meshing stage.

use std::{
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use log::{debug, error, trace};
use web_time::Instant;

use crate::engine_state::{
    rendering::tasks::chunk_mesh_generation_task::ChunkMeshGenerationTask,
    task_management::{panic_message, task::Task},
    voxels::{
        chunk::{Chunk, ChunkState},
        pipeline::GenerationContext,
        terrain::GenerationError,
    },
};

/// A task that generates terrain for one chunk.
///
/// This task is responsible for:
/// 1. Dropping itself if the observer has moved out of range since it was queued
/// 2. Running the terrain generator and packing its output into the chunk
/// 3. Marking the chunk Ready and scheduling its first mesh build
pub struct ChunkGenerationTask {
    chunk: Arc<Chunk>,
    context: Arc<GenerationContext>,
}

impl ChunkGenerationTask {
    /// Creates a new chunk generation task.
    ///
    /// # Arguments
    /// * `chunk` - A chunk in the Loading state
    /// * `context` - Generator, seed and meshing hand-off shared by all generation tasks
    pub fn new(chunk: Arc<Chunk>, context: Arc<GenerationContext>) -> Self {
        ChunkGenerationTask { chunk, context }
    }

    fn generate(&self) -> Result<(), GenerationError> {
        let chunk = &self.chunk;
        let generator = &*self.context.generator;
        let seed = self.context.seed;
        panic::catch_unwind(AssertUnwindSafe(|| chunk.generate_terrain(seed, generator)))
            .unwrap_or_else(|payload| Err(GenerationError::Panicked(panic_message(payload.as_ref()))))
    }
}

impl Task for ChunkGenerationTask {
    fn process(self: Box<Self>) {
        let chunk = &self.chunk;
        let position = chunk.position();
        if chunk.state() != ChunkState::Loading {
            trace!("Skipping generation of chunk {}: no longer loading", position);
            return;
        }

        let observer = self.context.observer.load();
        if !observer.within_radius(position, self.context.load_radius) {
            if chunk.transition(ChunkState::Loading, ChunkState::Unloaded) {
                self.context.counters.record_dropped_job();
                debug!("Dropped generation of chunk {}: observer moved to {}", position, observer);
            }
            return;
        }

        if !chunk.transition(ChunkState::Loading, ChunkState::Generating) {
            return;
        }

        let started = Instant::now();
        match self.generate() {
            Ok(()) => {
                self.context.counters.record_generated();
                chunk.clear_failures();
                trace!("Generated chunk {} in {:?}", position, started.elapsed());
                if chunk.transition(ChunkState::Generating, ChunkState::Ready) {
                    ChunkMeshGenerationTask::schedule(
                        chunk,
                        &self.context.meshing_queue,
                        &self.context.meshing,
                    );
                }
            }
            Err(error) => {
                self.context.counters.record_generation_failure();
                // Failed chunks are retried every tick; only the first failure is loud.
                match chunk.record_failure() {
                    1 => error!("Failed to generate chunk {}: {}", position, error),
                    streak => debug!(
                        "Failed to generate chunk {} again ({} attempts): {}",
                        position, streak, error
                    ),
                }
                chunk.transition(ChunkState::Generating, ChunkState::Unloaded);
            }
        }
    }

    fn label(&self) -> String {
        format!("generation of chunk {}", self.chunk.position())
    }
}
