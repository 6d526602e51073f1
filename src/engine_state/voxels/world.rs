//! # World Module
//!
//! This module provides the [`ChunkManager`], which keeps the set of loaded chunks
//! centred on an observer and drives them through generation and meshing.
//!
//! ## Architecture
//!
//! The manager owns the chunk table, a map from [`ChunkPosition`] to `Arc<Chunk>`, and is
//! the only code that inserts into or removes from it. It runs on the caller's thread;
//! generation and meshing run on two [`WorkerPool`]s. Workers receive `Arc<Chunk>`
//! handles inside their tasks and never touch the table.
//!
//! ## The Update Tick
//!
//! Each call to [`ChunkManager::update`] runs three phases:
//! 1. **Load**: every position within `load_radius` that is untracked, or tracked but
//!    Unloaded, gets a chunk in the Loading state and a generation task. Positions are
//!    offered nearest first; a full queue ends the phase and the rest wait a tick.
//! 2. **Unload**: chunks beyond `unload_radius` leave the table and release their mesh.
//!    Their voxel buffers go back to the pool once no task references them.
//! 3. **Relink**: neighbor links are rebuilt between generated chunks, and Ready dirty
//!    chunks without a queued rebuild are offered to the meshing pool.
//!
//! The gap between the two radii keeps chunks on the boundary from thrashing as the
//! observer moves back and forth.

use std::{collections::HashMap, io, sync::Arc, thread, time::Duration};

use cgmath::{Point3, Vector3};
use log::{debug, info, warn};
use thiserror::Error;
use web_time::Instant;

use crate::{
    config::{ChunkDimensions, ConfigError, WorldConfig},
    core::MtResource,
    engine_state::{
        rendering::{
            culling::FrustumCuller, mesher::ChunkMesher,
            tasks::chunk_mesh_generation_task::ChunkMeshGenerationTask,
        },
        task_management::WorkerPool,
        voxels::{
            block::{
                block_registry::{BlockRegistry, RegistryError},
                BlockRecord,
            },
            chunk::{
                neighbors::NeighborLinks,
                position::ChunkPosition,
                storage::StoragePool,
                Chunk, ChunkState,
            },
            pipeline::{GenerationContext, MeshingContext, PipelineCounters, PipelineStats},
            tasks::chunk_generation_task::ChunkGenerationTask,
            terrain::TerrainGenerator,
        },
    },
};

/// Errors raised while starting the chunk manager.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// The configuration failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A worker thread could not be spawned.
    #[error("failed to start {pool} workers: {source}")]
    WorkerSpawn {
        /// The pool that failed to start.
        pool: &'static str,
        /// The OS error.
        source: io::Error,
    },
}

/// Streams chunks in and out around an observer.
///
/// # Examples
///
/// ```
/// use std::{sync::Arc, time::Duration};
///
/// use cgmath::Point3;
/// use voxel_streaming::{BlockRegistry, ChunkManager, FaceCountMesher, FlatTerrain, WorldConfig};
///
/// let config = WorldConfig {
///     load_radius: 1,
///     unload_radius: 2,
///     ..WorldConfig::default()
/// };
/// let registry = Arc::new(BlockRegistry::default());
/// let stone = registry.require("stone").unwrap();
/// let mut manager = ChunkManager::new(
///     config,
///     FlatTerrain::new(4, stone),
///     FaceCountMesher::new(registry.clone()),
///     registry,
/// )
/// .unwrap();
///
/// manager.update(Point3::new(0.0, 0.0, 0.0));
/// assert!(manager.wait_until_idle(Duration::from_secs(10)));
/// assert_eq!(manager.chunk_count(), 7);
/// manager.shutdown();
/// ```
pub struct ChunkManager {
    config: WorldConfig,
    dimensions: ChunkDimensions,
    registry: Arc<BlockRegistry>,
    chunks: HashMap<ChunkPosition, Arc<Chunk>>,
    /// Unloaded chunks still referenced by a task or a caller.
    retired: Vec<Arc<Chunk>>,
    pool: StoragePool,
    /// Offsets within `load_radius`, nearest first.
    load_offsets: Vec<Vector3<i32>>,
    observer: MtResource<ChunkPosition>,
    last_observer: Option<Point3<f32>>,
    generation: WorkerPool,
    meshing: WorkerPool,
    generation_context: Arc<GenerationContext>,
    meshing_context: Arc<MeshingContext>,
    counters: Arc<PipelineCounters>,
    stopped: bool,
}

impl ChunkManager {
    /// Validates the configuration and starts both worker pools.
    ///
    /// # Arguments
    /// * `config` - Radii, worker counts, queue capacities and chunk dimensions
    /// * `generator` - Fills new chunks with terrain
    /// * `mesher` - Builds meshes for Ready dirty chunks
    /// * `registry` - Block definitions shared with the mesher
    ///
    /// # Returns
    /// The running manager, or why it could not start.
    pub fn new<G, M>(
        config: WorldConfig,
        generator: G,
        mesher: M,
        registry: Arc<BlockRegistry>,
    ) -> Result<Self, ManagerError>
    where
        G: TerrainGenerator + 'static,
        M: ChunkMesher + 'static,
    {
        config.validate()?;
        let dimensions = config.dimensions();

        let meshing = WorkerPool::new("meshing", config.meshing_workers, config.meshing_queue_capacity)
            .map_err(|source| ManagerError::WorkerSpawn { pool: "meshing", source })?;
        let generation = WorkerPool::new(
            "generation",
            config.generation_workers,
            config.generation_queue_capacity,
        )
        .map_err(|source| ManagerError::WorkerSpawn { pool: "generation", source })?;

        let counters = Arc::new(PipelineCounters::default());
        let observer = MtResource::new(ChunkPosition::default());
        let meshing_context = Arc::new(MeshingContext {
            mesher: Arc::new(mesher),
            counters: counters.clone(),
        });
        let generation_context = Arc::new(GenerationContext {
            generator: Arc::new(generator),
            seed: config.seed,
            load_radius: config.load_radius,
            observer: observer.clone(),
            meshing_queue: meshing.queue(),
            meshing: meshing_context.clone(),
            counters: counters.clone(),
        });

        info!(
            "Chunk manager started: load radius {}, unload radius {}, chunks {}x{}x{}",
            config.load_radius,
            config.unload_radius,
            dimensions.edge,
            dimensions.height,
            dimensions.edge
        );

        Ok(ChunkManager {
            load_offsets: load_offsets(config.load_radius),
            pool: StoragePool::new(config.storage_pool_capacity),
            dimensions,
            config,
            registry,
            chunks: HashMap::new(),
            retired: Vec::new(),
            observer,
            last_observer: None,
            generation,
            meshing,
            generation_context,
            meshing_context,
            counters,
            stopped: false,
        })
    }

    /// Runs one tick: load, unload, relink and schedule meshing around `observer`.
    ///
    /// # Arguments
    /// * `observer` - The observer's world-space position
    pub fn update(&mut self, observer: Point3<f32>) {
        if self.stopped {
            return;
        }
        let center = ChunkPosition::from_world(observer, self.dimensions);
        self.observer.set(center);
        self.last_observer = Some(observer);

        self.load_around(center);
        self.unload_around(center);
        self.relink();
        self.schedule_meshing();
        self.reclaim_retired();
    }

    fn load_around(&mut self, center: ChunkPosition) {
        let queue = self.generation.queue();
        let mut queued = 0;
        for offset in &self.load_offsets {
            let position = center.offset(*offset);
            let chunk = match self.chunks.get(&position) {
                Some(chunk) if chunk.state() == ChunkState::Unloaded => chunk.clone(),
                Some(_) => continue,
                None => {
                    let storage = self.pool.acquire(self.dimensions);
                    let chunk = Arc::new(Chunk::with_storage(position, storage));
                    self.chunks.insert(position, chunk.clone());
                    chunk
                }
            };

            chunk.set_state(ChunkState::Loading);
            let task = Box::new(ChunkGenerationTask::new(
                chunk.clone(),
                self.generation_context.clone(),
            ));
            if queue.try_publish(task).is_err() {
                chunk.set_state(ChunkState::Unloaded);
                self.counters.record_deferred_job();
                debug!("Generation queue full at chunk {}, deferring the rest", position);
                break;
            }
            queued += 1;
        }
        if queued > 0 {
            debug!("Queued {} chunks for generation around {}", queued, center);
        }
    }

    fn unload_around(&mut self, center: ChunkPosition) {
        let load_radius = self.config.load_radius;
        let unload_radius = self.config.unload_radius;
        // Unloaded chunks between the radii are placeholders nobody will generate.
        let leaving: Vec<ChunkPosition> = self
            .chunks
            .iter()
            .filter(|(position, chunk)| {
                !center.within_radius(**position, unload_radius)
                    || (chunk.state() == ChunkState::Unloaded
                        && !center.within_radius(**position, load_radius))
            })
            .map(|(position, _)| *position)
            .collect();

        for position in &leaving {
            if let Some(chunk) = self.chunks.remove(position) {
                chunk.set_state(ChunkState::Unloading);
                chunk.unload();
                self.retire(chunk);
            }
        }
        if !leaving.is_empty() {
            debug!("Unloaded {} chunks around {}", leaving.len(), center);
        }
    }

    fn relink(&self) {
        for (position, chunk) in &self.chunks {
            let mut links = NeighborLinks::new();
            if chunk.is_generated() {
                for dx in -1..=1 {
                    for dy in -1..=1 {
                        for dz in -1..=1 {
                            let offset = Vector3::new(dx, dy, dz);
                            if offset == Vector3::new(0, 0, 0) {
                                continue;
                            }
                            // Offsets saturate at the edge of the grid.
                            let target = position.offset(offset);
                            if target == *position {
                                continue;
                            }
                            if let Some(neighbor) = self.chunks.get(&target) {
                                if neighbor.is_generated() {
                                    links.link(offset, neighbor);
                                }
                            }
                        }
                    }
                }
            }
            chunk.update_neighbors(links);
        }
    }

    fn schedule_meshing(&self) {
        let queue = self.meshing.queue();
        for chunk in self.chunks.values() {
            if chunk.state() == ChunkState::Ready
                && chunk.is_dirty()
                && !chunk.is_mesh_queued()
                && !ChunkMeshGenerationTask::schedule(chunk, &queue, &self.meshing_context)
            {
                break;
            }
        }
    }

    /// Returns the chunk's buffer to the pool, or parks it until the last reference drops.
    fn retire(&mut self, chunk: Arc<Chunk>) {
        match Arc::try_unwrap(chunk) {
            Ok(chunk) => {
                self.pool.release(chunk.into_storage());
            }
            Err(chunk) => self.retired.push(chunk),
        }
    }

    fn reclaim_retired(&mut self) {
        for chunk in std::mem::take(&mut self.retired) {
            self.retire(chunk);
        }
    }

    /// Chunks that have terrain and a mesh and whose bounds pass `culler`.
    ///
    /// Never blocks on workers; chunks still generating or without a mesh are left out.
    pub fn get_visible_chunks(&self, culler: &dyn FrustumCuller) -> Vec<Arc<Chunk>> {
        self.chunks
            .values()
            .filter(|chunk| {
                chunk.is_generated() && chunk.is_mesh_generated() && culler.is_visible(&chunk.bounds())
            })
            .cloned()
            .collect()
    }

    /// Reads the block at a world block coordinate.
    ///
    /// # Returns
    /// The block, or Air if the owning chunk is not loaded.
    pub fn get_block(&self, world: Point3<i32>) -> BlockRecord {
        match self.chunks.get(&ChunkPosition::from_block(world, self.dimensions)) {
            Some(chunk) => chunk.get_block_by_world_position(world),
            None => BlockRecord::AIR,
        }
    }

    /// Writes the block at a world block coordinate.
    ///
    /// Edits only apply to chunks whose terrain has been generated; anything else would
    /// be overwritten by the generator. The chunk and any face neighbor sharing the edited
    /// boundary are marked for remeshing.
    ///
    /// # Returns
    /// `true` if the block was written.
    pub fn set_block(&self, world: Point3<i32>, record: BlockRecord) -> bool {
        match self.chunks.get(&ChunkPosition::from_block(world, self.dimensions)) {
            Some(chunk) if chunk.is_generated() => chunk.set_block_by_world_position(world, record),
            _ => false,
        }
    }

    /// Writes a block by its registered name.
    pub fn set_block_named(&self, world: Point3<i32>, name: &str) -> Result<bool, RegistryError> {
        let code = self.registry.require(name)?;
        Ok(self.set_block(world, BlockRecord::from_raw(code)))
    }

    /// The tracked chunk at `position`, if any.
    pub fn chunk(&self, position: ChunkPosition) -> Option<Arc<Chunk>> {
        self.chunks.get(&position).cloned()
    }

    /// Positions of every tracked chunk, in no particular order.
    pub fn tracked_positions(&self) -> Vec<ChunkPosition> {
        self.chunks.keys().copied().collect()
    }

    /// Number of tracked chunks.
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// The observer's chunk as of the last tick.
    pub fn observer_chunk(&self) -> ChunkPosition {
        self.observer.load()
    }

    /// The validated configuration.
    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// The block registry.
    pub fn registry(&self) -> &Arc<BlockRegistry> {
        &self.registry
    }

    /// A snapshot of the pipeline.
    pub fn stats(&self) -> PipelineStats {
        let mut stats = PipelineStats {
            tracked: self.chunks.len(),
            queued_generation: self.generation.queued(),
            queued_meshing: self.meshing.queued(),
            pending_generation: self.generation.pending(),
            pending_meshing: self.meshing.pending(),
            pooled_storage: self.pool.len(),
            retired: self.retired.len(),
            chunks_generated: self.counters.chunks_generated(),
            meshes_built: self.counters.meshes_built(),
            generation_failures: self.counters.generation_failures(),
            meshing_failures: self.counters.meshing_failures(),
            dropped_jobs: self.counters.dropped_jobs(),
            deferred_jobs: self.counters.deferred_jobs(),
            ..PipelineStats::default()
        };
        for chunk in self.chunks.values() {
            if chunk.is_generated() {
                stats.ready += 1;
                if chunk.is_dirty() {
                    stats.dirty += 1;
                }
            }
            if chunk.is_mesh_generated() {
                stats.meshed += 1;
            }
        }
        stats
    }

    /// Whether every tracked chunk is Ready and clean with no work queued or running.
    pub fn is_idle(&self) -> bool {
        self.generation.pending() == 0
            && self.meshing.pending() == 0
            && self
                .chunks
                .values()
                .all(|chunk| chunk.state() == ChunkState::Ready && !chunk.is_dirty())
    }

    /// Ticks at the last observer position until the pipeline is idle.
    ///
    /// # Returns
    /// `false` if `timeout` elapsed first.
    pub fn wait_until_idle(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(observer) = self.last_observer {
                self.update(observer);
            }
            if self.is_idle() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
    }

    /// Stops both worker pools and releases every chunk.
    ///
    /// # Returns
    /// `true` if all workers exited within `shutdown_timeout_ms`.
    pub fn shutdown(mut self) -> bool {
        self.stop()
    }

    fn stop(&mut self) -> bool {
        if self.stopped {
            return true;
        }
        self.stopped = true;

        let deadline = Instant::now() + Duration::from_millis(self.config.shutdown_timeout_ms);
        // Generation first: it feeds the meshing queue.
        let generation_stopped = self.generation.shutdown(deadline);
        let meshing_stopped = self.meshing.shutdown(deadline);
        if !(generation_stopped && meshing_stopped) {
            warn!("Chunk manager shut down with workers still running");
        }

        let chunks: Vec<Arc<Chunk>> = self.chunks.drain().map(|(_, chunk)| chunk).collect();
        for chunk in chunks {
            chunk.set_state(ChunkState::Unloading);
            chunk.unload();
            self.retire(chunk);
        }
        info!(
            "Chunk manager stopped: {} buffers pooled, {} chunks still referenced",
            self.pool.len(),
            self.retired.len()
        );
        generation_stopped && meshing_stopped
    }
}

impl Drop for ChunkManager {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Every offset within `radius` chunks of the origin, nearest first.
fn load_offsets(radius: i32) -> Vec<Vector3<i32>> {
    let origin = ChunkPosition::default();
    let mut offsets = Vec::new();
    for x in -radius..=radius {
        for y in -radius..=radius {
            for z in -radius..=radius {
                if origin.within_radius(ChunkPosition::new(x, y, z), radius) {
                    offsets.push(Vector3::new(x, y, z));
                }
            }
        }
    }
    offsets.sort_by_key(|offset| {
        (
            origin.distance_squared(ChunkPosition::new(offset.x, offset.y, offset.z)),
            offset.y,
            offset.x,
            offset.z,
        )
    });
    offsets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::{
        rendering::mesher::FaceCountMesher,
        voxels::{
            block::block_side::BlockSide,
            terrain::{EmptyTerrain, FlatTerrain},
        },
    };

    fn small_config() -> WorldConfig {
        WorldConfig {
            load_radius: 1,
            unload_radius: 2,
            generation_workers: 2,
            meshing_workers: 1,
            chunk_edge: 8,
            chunk_height: 8,
            ..WorldConfig::default()
        }
    }

    fn manager(config: WorldConfig) -> ChunkManager {
        let registry = Arc::new(BlockRegistry::default());
        let stone = registry.require("stone").unwrap();
        ChunkManager::new(
            config,
            FlatTerrain::new(4, stone),
            FaceCountMesher::new(registry.clone()),
            registry,
        )
        .unwrap()
    }

    #[test]
    fn load_offsets_are_nearest_first() {
        let offsets = load_offsets(2);
        assert_eq!(offsets[0], Vector3::new(0, 0, 0));
        assert_eq!(offsets.len(), 33);
        let origin = ChunkPosition::default();
        let distances: Vec<i64> = offsets
            .iter()
            .map(|o| origin.distance_squared(ChunkPosition::new(o.x, o.y, o.z)))
            .collect();
        assert!(distances.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn rejects_invalid_config() {
        let registry = Arc::new(BlockRegistry::default());
        let config = WorldConfig {
            load_radius: 3,
            unload_radius: 3,
            ..WorldConfig::default()
        };
        let result = ChunkManager::new(
            config,
            EmptyTerrain,
            FaceCountMesher::new(registry.clone()),
            registry,
        );
        assert!(matches!(result, Err(ManagerError::Config(_))));
    }

    #[test]
    fn first_tick_tracks_the_load_sphere() {
        let mut manager = manager(small_config());
        manager.update(Point3::new(0.0, 0.0, 0.0));
        assert_eq!(manager.chunk_count(), 7);
        assert!(manager.chunk(ChunkPosition::new(0, 0, 0)).is_some());
        assert!(manager.chunk(ChunkPosition::new(1, 1, 0)).is_none());
        assert!(manager.wait_until_idle(Duration::from_secs(10)));
        assert_eq!(manager.stats().meshed, 7);
        assert!(manager.shutdown());
    }

    #[test]
    fn edits_outside_loaded_chunks_are_ignored() {
        let mut manager = manager(small_config());
        manager.update(Point3::new(0.0, 0.0, 0.0));
        assert!(manager.wait_until_idle(Duration::from_secs(10)));

        let far = Point3::new(1000, 0, 0);
        assert!(!manager.set_block(far, BlockRecord::from_raw(1)));
        assert!(manager.get_block(far).is_air());

        let near = Point3::new(1, 6, 1);
        assert!(manager.set_block_named(near, "glass").unwrap());
        let glass = manager.registry().require("glass").unwrap();
        assert_eq!(manager.get_block(near).type_code(), glass);
        assert!(manager.set_block_named(near, "unobtainium").is_err());
        manager.shutdown();
    }

    #[test]
    fn observer_beyond_the_grid_pins_to_the_outermost_chunk() {
        let mut manager = manager(small_config());
        manager.update(Point3::new(4.0e10, 0.0, 0.0));
        assert_eq!(manager.observer_chunk(), ChunkPosition::new(i32::MAX, 0, 0));
        // The +X neighbor saturates onto the observer's own chunk.
        assert_eq!(manager.chunk_count(), 6);
        assert!(manager.wait_until_idle(Duration::from_secs(10)));
        let edge = manager.chunk(ChunkPosition::new(i32::MAX, 0, 0)).unwrap();
        assert!(edge.neighbors().face(BlockSide::RIGHT).is_none());
        assert!(edge.neighbors().face(BlockSide::LEFT).is_some());

        manager.update(Point3::new(0.0, 0.0, 0.0));
        assert!(manager.wait_until_idle(Duration::from_secs(10)));
        assert_eq!(manager.chunk_count(), 7);
        assert!(manager.chunk(ChunkPosition::new(i32::MAX, 0, 0)).is_none());
        manager.shutdown();
    }

    #[test]
    fn unloaded_buffers_return_to_the_pool() {
        let mut manager = manager(small_config());
        manager.update(Point3::new(0.0, 0.0, 0.0));
        assert!(manager.wait_until_idle(Duration::from_secs(10)));

        // 8 blocks per chunk; x = 100 is chunk 12, far beyond the unload radius.
        manager.update(Point3::new(100.0, 0.0, 0.0));
        assert!(manager.wait_until_idle(Duration::from_secs(10)));
        assert!(manager.chunk(ChunkPosition::new(0, 0, 0)).is_none());
        assert_eq!(manager.chunk_count(), 7);
        let stats = manager.stats();
        assert_eq!(stats.pooled_storage, 7);
        assert_eq!(stats.retired, 0);
        assert_eq!(stats.chunks_generated, 14);

        // Coming back reuses the pooled buffers for the new chunks.
        manager.update(Point3::new(0.0, 0.0, 0.0));
        assert_eq!(manager.stats().pooled_storage, 7);
        assert!(manager.wait_until_idle(Duration::from_secs(10)));
        assert!(manager.get_block(Point3::new(0, 6, 0)).is_air());
        manager.shutdown();
    }
}
