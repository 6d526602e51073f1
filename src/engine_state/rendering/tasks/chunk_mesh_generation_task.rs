//! Task for building the mesh of one chunk on a meshing worker.
//!
//! Meshing runs against the chunk's current contents. A chunk that is not dirty when
//! the task runs, or that has left the Ready state since it was queued, is skipped.

use std::{
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use log::{debug, error, trace};
use web_time::Instant;

use crate::engine_state::{
    rendering::mesher::{MeshHandle, MeshingError},
    task_management::{panic_message, task::Task, TaskQueue},
    voxels::{
        chunk::{Chunk, ChunkState},
        pipeline::MeshingContext,
    },
};

/// A task that rebuilds the mesh of a Ready, dirty chunk.
///
/// This task is responsible for:
/// 1. Claiming the chunk by moving it from Ready to Meshing
/// 2. Clearing the dirty flag before reading voxels, so edits made during the build
///    request another rebuild
/// 3. Handing the built mesh back to the chunk, which releases the previous one
pub struct ChunkMeshGenerationTask {
    chunk: Arc<Chunk>,
    context: Arc<MeshingContext>,
}

impl ChunkMeshGenerationTask {
    /// Creates a new chunk mesh generation task.
    ///
    /// # Arguments
    /// * `chunk` - The chunk to mesh
    /// * `context` - Mesher and counters shared by all meshing tasks
    pub fn new(chunk: Arc<Chunk>, context: Arc<MeshingContext>) -> Self {
        ChunkMeshGenerationTask { chunk, context }
    }

    /// Queues a mesh rebuild unless one is already queued for this chunk.
    ///
    /// # Returns
    /// `false` if the queue was full; the chunk stays dirty and is offered again later.
    pub fn schedule(chunk: &Arc<Chunk>, queue: &TaskQueue, context: &Arc<MeshingContext>) -> bool {
        if !chunk.try_mark_mesh_queued() {
            return true;
        }
        let task = Box::new(ChunkMeshGenerationTask::new(chunk.clone(), context.clone()));
        if queue.try_publish(task).is_err() {
            chunk.clear_mesh_queued();
            trace!("Meshing queue full, deferring chunk {}", chunk.position());
            return false;
        }
        true
    }

    fn build(&self) -> Result<Box<dyn MeshHandle>, MeshingError> {
        let chunk = &*self.chunk;
        let mesher = &*self.context.mesher;
        panic::catch_unwind(AssertUnwindSafe(|| mesher.build(chunk)))
            .unwrap_or_else(|payload| Err(MeshingError::Panicked(panic_message(payload.as_ref()))))
    }
}

impl Task for ChunkMeshGenerationTask {
    fn process(self: Box<Self>) {
        let chunk = &self.chunk;
        chunk.clear_mesh_queued();
        if !chunk.is_dirty() || !chunk.transition(ChunkState::Ready, ChunkState::Meshing) {
            return;
        }
        chunk.take_dirty();

        let started = Instant::now();
        match self.build() {
            Ok(mesh) => {
                if chunk.store_mesh(mesh) {
                    chunk.clear_failures();
                    self.context.counters.record_mesh_built();
                    trace!("Meshed chunk {} in {:?}", chunk.position(), started.elapsed());
                }
            }
            Err(error) => {
                self.context.counters.record_meshing_failure();
                match chunk.record_failure() {
                    1 => error!("Failed to mesh chunk {}: {}", chunk.position(), error),
                    streak => debug!(
                        "Failed to mesh chunk {} again ({} attempts): {}",
                        chunk.position(),
                        streak,
                        error
                    ),
                }
                chunk.mark_dirty();
                chunk.transition(ChunkState::Meshing, ChunkState::Ready);
            }
        }
    }

    fn label(&self) -> String {
        format!("meshing of chunk {}", self.chunk.position())
    }
}
