//! # Chunk Module
//!
//! This module provides the `Chunk` struct: one fixed-size cuboid of the world, the unit
//! of loading, generation, meshing and unloading.
//!
//! ## Synchronization
//!
//! A chunk is shared between the manager, at most one worker and any number of editors,
//! so every mutable part sits behind its own primitive:
//! - lifecycle state and flags are atomics
//! - voxel storage is guarded by an `RwLock`; the dirty flag is raised while the write
//!   lock is held so an edit is never lost between a mesher's read and its flag reset
//! - neighbor links live in an `Arc<NeighborLinks>` that is swapped whole
//! - the mesh handle sits behind a `Mutex` that also serialises the Meshing → Ready
//!   transition against unloading
//!
//! No method holds two chunk locks at once. Reads that cross into a neighbor release
//! this chunk's lock first.
//!
//! ## Lifecycle
//!
//! `Unloaded → Loading → Generating → Ready ⇄ Meshing → Unloading → Unloaded`.
//! Transitions out of the worker-owned states use compare-and-swap, so a chunk that
//! was unloaded while a worker held it is never flipped back to Ready.

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering},
        Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
    },
};

use cgmath::Point3;
use num_derive::FromPrimitive;

use neighbors::NeighborLinks;
use position::{BoundingBox, ChunkPosition};
use storage::VoxelStorage;

use crate::{
    config::ChunkDimensions,
    engine_state::{
        rendering::mesher::MeshHandle,
        voxels::{
            block::{
                block_registry::BlockRegistry, block_side::BlockSide, visibility, BlockRecord,
            },
            terrain::{GenerationError, TerrainGenerator, TerrainRequest},
        },
    },
};

pub mod chunk_iteration;
pub mod neighbors;
pub mod position;
pub mod storage;

/// Lifecycle states of a chunk.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, FromPrimitive)]
pub enum ChunkState {
    /// Not tracked, or storage reset for reuse.
    Unloaded = 0,
    /// Tracked and waiting for a generation worker.
    Loading = 1,
    /// A generation worker is producing terrain.
    Generating = 2,
    /// Terrain is present; eligible for meshing when dirty.
    Ready = 3,
    /// A meshing worker is building geometry.
    Meshing = 4,
    /// Being removed from the world.
    Unloading = 5,
}

/// A fixed-size cuboid of blocks with its lifecycle, flags and neighbor links.
pub struct Chunk {
    position: ChunkPosition,
    dimensions: ChunkDimensions,
    bounds: BoundingBox,
    state: AtomicU8,
    dirty: AtomicBool,
    mesh_generated: AtomicBool,
    mesh_queued: AtomicBool,
    failure_streak: AtomicU32,
    voxels: RwLock<VoxelStorage>,
    neighbors: RwLock<Arc<NeighborLinks>>,
    mesh: Mutex<Option<Box<dyn MeshHandle>>>,
}

impl Chunk {
    /// Creates an Unloaded chunk filled with Air.
    ///
    /// # Arguments
    /// * `position` - Grid position of the chunk
    /// * `dimensions` - Chunk dimensions of the world
    pub fn new(position: ChunkPosition, dimensions: ChunkDimensions) -> Self {
        Self::with_storage(position, VoxelStorage::new(dimensions))
    }

    /// Creates an Unloaded chunk around an existing buffer, typically one from the pool.
    ///
    /// The buffer's contents are kept as they are; pooled buffers are already cleared.
    pub fn with_storage(position: ChunkPosition, storage: VoxelStorage) -> Self {
        let dimensions = storage.dimensions();
        Chunk {
            position,
            dimensions,
            bounds: position.bounds(dimensions),
            state: AtomicU8::new(ChunkState::Unloaded as u8),
            dirty: AtomicBool::new(false),
            mesh_generated: AtomicBool::new(false),
            mesh_queued: AtomicBool::new(false),
            failure_streak: AtomicU32::new(0),
            voxels: RwLock::new(storage),
            neighbors: RwLock::new(Arc::new(NeighborLinks::new())),
            mesh: Mutex::new(None),
        }
    }

    /// Grid position of this chunk.
    pub fn position(&self) -> ChunkPosition {
        self.position
    }

    /// Dimensions of this chunk.
    pub fn dimensions(&self) -> ChunkDimensions {
        self.dimensions
    }

    /// World-space bounding box.
    pub fn bounds(&self) -> BoundingBox {
        self.bounds
    }

    fn read_voxels(&self) -> RwLockReadGuard<'_, VoxelStorage> {
        self.voxels.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_voxels(&self) -> RwLockWriteGuard<'_, VoxelStorage> {
        self.voxels.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_mesh(&self) -> MutexGuard<'_, Option<Box<dyn MeshHandle>>> {
        self.mesh.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ChunkState {
        num_traits::FromPrimitive::from_u8(self.state.load(Ordering::Acquire))
            .unwrap_or(ChunkState::Unloaded)
    }

    /// Unconditionally sets the lifecycle state.
    pub fn set_state(&self, state: ChunkState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Moves from `from` to `to` if the chunk is still in `from`.
    ///
    /// # Returns
    /// `true` if this call performed the transition.
    pub fn transition(&self, from: ChunkState, to: ChunkState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Whether terrain has been generated and not yet unloaded.
    pub fn is_generated(&self) -> bool {
        matches!(self.state(), ChunkState::Ready | ChunkState::Meshing)
    }

    /// Whether voxel data changed since the last mesh build.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Flags the chunk for remeshing.
    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    /// Clears the dirty flag and returns its previous value.
    pub fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::AcqRel)
    }

    /// Whether a mesh has been built since the chunk was last reset.
    pub fn is_mesh_generated(&self) -> bool {
        self.mesh_generated.load(Ordering::Acquire)
    }

    /// Claims the single meshing-queue slot for this chunk.
    ///
    /// # Returns
    /// `true` if the caller should enqueue the chunk, `false` if it is already queued.
    pub fn try_mark_mesh_queued(&self) -> bool {
        !self.mesh_queued.swap(true, Ordering::AcqRel)
    }

    /// Releases the meshing-queue slot.
    pub fn clear_mesh_queued(&self) {
        self.mesh_queued.store(false, Ordering::Release);
    }

    /// Whether the chunk currently sits in the meshing queue.
    pub fn is_mesh_queued(&self) -> bool {
        self.mesh_queued.load(Ordering::Acquire)
    }

    /// Counts one more consecutive generation or meshing failure.
    ///
    /// # Returns
    /// The length of the current failure streak, starting at 1.
    pub fn record_failure(&self) -> u32 {
        self.failure_streak.fetch_add(1, Ordering::AcqRel).saturating_add(1)
    }

    /// Ends the failure streak after a successful generation or mesh build.
    pub fn clear_failures(&self) {
        self.failure_streak.store(0, Ordering::Release);
    }

    /// Number of consecutive failures since the last success.
    pub fn failure_streak(&self) -> u32 {
        self.failure_streak.load(Ordering::Acquire)
    }

    /// Reads a block at local coordinates. Out-of-range reads return Air.
    pub fn get_block(&self, local: Point3<i32>) -> BlockRecord {
        self.read_voxels().get(local.x, local.y, local.z)
    }

    /// Writes a block at local coordinates. Out-of-range writes are ignored.
    ///
    /// A changed block marks this chunk dirty. A changed block on a chunk face also marks
    /// the linked neighbor across that face dirty, since its visible faces may change.
    ///
    /// # Returns
    /// `true` if the stored block changed.
    pub fn set_block(&self, local: Point3<i32>, record: BlockRecord) -> bool {
        {
            let mut voxels = self.write_voxels();
            match voxels.replace(local.x, local.y, local.z, record) {
                Some(previous) if previous != record => self.mark_dirty(),
                _ => return false,
            }
        }

        let mut touched = self.boundary_sides(local).peekable();
        if touched.peek().is_some() {
            let links = self.neighbors();
            for side in touched {
                if let Some(neighbor) = links.face(side) {
                    neighbor.mark_dirty();
                }
            }
        }
        true
    }

    /// Faces of the chunk that the local coordinate lies on.
    fn boundary_sides(&self, local: Point3<i32>) -> impl Iterator<Item = BlockSide> {
        let last_x = self.dimensions.edge as i32 - 1;
        let last_y = self.dimensions.height as i32 - 1;
        [
            (local.x == 0, BlockSide::LEFT),
            (local.x == last_x, BlockSide::RIGHT),
            (local.y == 0, BlockSide::BOTTOM),
            (local.y == last_y, BlockSide::TOP),
            (local.z == 0, BlockSide::BACK),
            (local.z == last_x, BlockSide::FRONT),
        ]
        .into_iter()
        .filter_map(|(on_face, side)| on_face.then_some(side))
    }

    fn world_to_local(&self, world: Point3<i32>) -> Point3<i32> {
        let origin = self.position.origin_block(self.dimensions);
        Point3::new(
            world.x.saturating_sub(origin.x),
            world.y.saturating_sub(origin.y),
            world.z.saturating_sub(origin.z),
        )
    }

    /// Reads a block by world block coordinates, relative to this chunk's origin.
    ///
    /// The caller is responsible for routing to the owning chunk; positions outside this
    /// chunk read as Air.
    pub fn get_block_by_world_position(&self, world: Point3<i32>) -> BlockRecord {
        self.get_block(self.world_to_local(world))
    }

    /// Writes a block by world block coordinates. Positions outside this chunk are ignored.
    pub fn set_block_by_world_position(&self, world: Point3<i32>, record: BlockRecord) -> bool {
        self.set_block(self.world_to_local(world), record)
    }

    /// Runs `f` with shared access to the voxel storage.
    ///
    /// Do not call back into other chunks from inside `f`.
    pub fn with_voxels<R>(&self, f: impl FnOnce(&VoxelStorage) -> R) -> R {
        let voxels = self.read_voxels();
        f(&voxels)
    }

    /// Copy of the current voxel storage.
    pub fn snapshot(&self) -> VoxelStorage {
        self.read_voxels().clone()
    }

    /// Fills the chunk from a terrain generator.
    ///
    /// Every type code is validated before anything is written, so a failing generator
    /// leaves the storage untouched. On success the chunk is marked dirty.
    ///
    /// # Arguments
    /// * `seed` - World seed
    /// * `generator` - Source of type codes for this chunk
    pub fn generate_terrain(
        &self,
        seed: u32,
        generator: &dyn TerrainGenerator,
    ) -> Result<(), GenerationError> {
        let request = TerrainRequest {
            position: self.position,
            edge: self.dimensions.edge,
            height: self.dimensions.height,
            seed,
        };
        let grid = generator.generate(&request)?;
        if grid.dimensions() != self.dimensions {
            return Err(GenerationError::GridMismatch {
                expected: self.dimensions,
                found: grid.dimensions(),
            });
        }

        let records = grid
            .codes()
            .iter()
            .map(|code| BlockRecord::from_type(*code as u32))
            .collect::<Result<Vec<_>, _>>()?;

        {
            let mut voxels = self.write_voxels();
            for (index, record) in records.into_iter().enumerate() {
                let local = voxels.position_of(index);
                voxels.set(local.x, local.y, local.z, record);
            }
            self.mark_dirty();
        }
        Ok(())
    }

    /// The current neighbor link set.
    pub fn neighbors(&self) -> Arc<NeighborLinks> {
        self.neighbors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replaces the neighbor links wholesale.
    ///
    /// When a face link appears, disappears or points at a different chunk, and the slab
    /// of this chunk bordering it holds any block, the chunk is marked dirty so its border
    /// faces are rebuilt against the new neighbor, or against open air.
    ///
    /// # Returns
    /// `true` if the link set changed.
    pub fn update_neighbors(&self, links: NeighborLinks) -> bool {
        let links = Arc::new(links);
        let previous = {
            let mut current = self.neighbors.write().unwrap_or_else(PoisonError::into_inner);
            if current.same_links(&links) {
                return false;
            }
            std::mem::replace(&mut *current, links.clone())
        };

        let redirty = {
            let voxels = self.read_voxels();
            links
                .new_face_links(&previous)
                .chain(links.lost_face_links(&previous))
                .any(|side| self.slab_facing(&voxels, side))
        };
        if redirty {
            self.mark_dirty();
        }
        true
    }

    fn slab_facing(&self, voxels: &VoxelStorage, side: BlockSide) -> bool {
        let last_x = self.dimensions.edge as i32 - 1;
        let last_y = self.dimensions.height as i32 - 1;
        match side {
            BlockSide::LEFT => voxels.slab_has_blocks(0, 0),
            BlockSide::RIGHT => voxels.slab_has_blocks(0, last_x),
            BlockSide::BOTTOM => voxels.slab_has_blocks(1, 0),
            BlockSide::TOP => voxels.slab_has_blocks(1, last_y),
            BlockSide::BACK => voxels.slab_has_blocks(2, 0),
            BlockSide::FRONT => voxels.slab_has_blocks(2, last_x),
        }
    }

    /// Wraps a coordinate that left this chunk into the frame of the neighbor it entered.
    fn wrap_into_neighbor(&self, target: Point3<i32>) -> Point3<i32> {
        let edge = self.dimensions.edge as i32;
        let height = self.dimensions.height as i32;
        Point3::new(
            target.x.rem_euclid(edge),
            target.y.rem_euclid(height),
            target.z.rem_euclid(edge),
        )
    }

    fn neighbor_block_from(
        &self,
        links: &NeighborLinks,
        target: Point3<i32>,
        side: BlockSide,
    ) -> BlockRecord {
        // Unlinked neighbors read as open air.
        links
            .face(side)
            .map_or(BlockRecord::AIR, |neighbor| {
                neighbor.get_block(self.wrap_into_neighbor(target))
            })
    }

    /// The block adjacent to `local` across `side`, following neighbor links at the
    /// chunk border. Missing neighbors read as Air.
    pub fn get_neighbor_block(&self, local: Point3<i32>, side: BlockSide) -> BlockRecord {
        let target = local + side.offset();
        if self.dimensions.contains(target.x, target.y, target.z) {
            return self.get_block(target);
        }
        self.neighbor_block_from(&self.neighbors(), target, side)
    }

    /// Whether the `side` face of the block at `local` must be meshed.
    pub fn is_face_visible(
        &self,
        local: Point3<i32>,
        side: BlockSide,
        registry: &BlockRegistry,
    ) -> bool {
        let block = self.get_block(local);
        if block.is_air() {
            return false;
        }
        visibility::is_face_visible(block, self.get_neighbor_block(local, side), registry)
    }

    /// Calls `visit` for every visible face of every solid block.
    ///
    /// Works on a snapshot of the storage so no lock is held while neighbors are read.
    /// Edits racing with this walk mark the chunk dirty and are picked up by the next
    /// mesh build.
    pub fn for_each_visible_face(
        &self,
        registry: &BlockRegistry,
        mut visit: impl FnMut(Point3<i32>, BlockSide, BlockRecord),
    ) {
        let snapshot = self.snapshot();
        let links = self.neighbors();
        for (local, block) in snapshot.solid_blocks() {
            for side in BlockSide::all() {
                let target = local + side.offset();
                let neighbor = if self.dimensions.contains(target.x, target.y, target.z) {
                    snapshot.get(target.x, target.y, target.z)
                } else {
                    self.neighbor_block_from(&links, target, side)
                };
                if visibility::is_face_visible(block, neighbor, registry) {
                    visit(local, side, block);
                }
            }
        }
    }

    /// Stores a freshly built mesh and returns the chunk to Ready.
    ///
    /// If the chunk left the Meshing state while the mesh was built (it was unloaded),
    /// the mesh is released immediately instead.
    ///
    /// # Returns
    /// `true` if the mesh was stored.
    pub fn store_mesh(&self, mesh: Box<dyn MeshHandle>) -> bool {
        let mut slot = self.lock_mesh();
        if self.transition(ChunkState::Meshing, ChunkState::Ready) {
            if let Some(previous) = slot.replace(mesh) {
                previous.release();
            }
            self.mesh_generated.store(true, Ordering::Release);
            true
        } else {
            drop(slot);
            mesh.release();
            false
        }
    }

    /// Runs `f` with the current mesh, if any.
    pub fn with_mesh<R>(&self, f: impl FnOnce(Option<&dyn MeshHandle>) -> R) -> R {
        let slot = self.lock_mesh();
        f(slot.as_deref())
    }

    /// Releases the mesh handle, if one is held.
    pub fn release_mesh(&self) {
        let mesh = self.lock_mesh().take();
        self.mesh_generated.store(false, Ordering::Release);
        if let Some(mesh) = mesh {
            mesh.release();
        }
    }

    /// Marks the chunk Unloaded and releases its mesh. Storage stays allocated.
    pub fn unload(&self) {
        self.set_state(ChunkState::Unloaded);
        self.release_mesh();
        *self.neighbors.write().unwrap_or_else(PoisonError::into_inner) =
            Arc::new(NeighborLinks::new());
    }

    /// Clears the chunk for reuse: storage refilled with Air, flags cleared, mesh released.
    pub fn reset(&self) {
        self.unload();
        self.write_voxels().fill(BlockRecord::AIR);
        self.dirty.store(false, Ordering::Release);
        self.mesh_queued.store(false, Ordering::Release);
        self.clear_failures();
    }

    /// Takes the storage buffer out of the chunk, consuming it.
    pub fn into_storage(mut self) -> VoxelStorage {
        let voxels = self.voxels.get_mut().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(voxels, VoxelStorage::empty())
    }
}

impl Drop for Chunk {
    fn drop(&mut self) {
        let mesh = self.mesh.get_mut().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(mesh) = mesh {
            mesh.release();
        }
    }
}

impl fmt::Debug for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chunk")
            .field("position", &self.position)
            .field("state", &self.state())
            .field("dirty", &self.is_dirty())
            .field("mesh_generated", &self.is_mesh_generated())
            .finish()
    }
}
