//! # Voxel Storage Module
//!
//! Dense block storage for a single chunk, plus a free-list of reusable buffers.
//!
//! ## Memory Layout
//!
//! Every chunk owns one fully allocated grid of [`BlockRecord`]s laid out X first,
//! then Z, then Y (see [`ChunkDimensions::index`]). There is no sparse or run-length
//! encoding: a 16×16×16 chunk always costs 8 KiB, and every access is O(1).
//!
//! Access is clamped rather than checked. Reads outside the grid return Air and writes
//! outside the grid are ignored, which keeps neighbor probing and meshing loops free of
//! error plumbing.

use std::collections::HashMap;

use cgmath::Point3;

use crate::{config::ChunkDimensions, engine_state::voxels::block::BlockRecord};

/// A dense 3D grid of blocks for one chunk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VoxelStorage {
    dimensions: ChunkDimensions,
    blocks: Vec<BlockRecord>,
}

impl VoxelStorage {
    /// Allocates a grid of the given dimensions filled with Air.
    pub fn new(dimensions: ChunkDimensions) -> Self {
        VoxelStorage {
            dimensions,
            blocks: vec![BlockRecord::AIR; dimensions.volume()],
        }
    }

    /// A zero-sized placeholder, used when a chunk's buffer has been moved out.
    pub fn empty() -> Self {
        VoxelStorage {
            dimensions: ChunkDimensions::new(0, 0),
            blocks: Vec::new(),
        }
    }

    /// Dimensions of this grid.
    pub fn dimensions(&self) -> ChunkDimensions {
        self.dimensions
    }

    #[inline]
    fn slot(&self, x: i32, y: i32, z: i32) -> Option<usize> {
        if self.dimensions.contains(x, y, z) {
            Some(self.dimensions.index(x as usize, y as usize, z as usize))
        } else {
            None
        }
    }

    /// Reads a block, returning Air outside the grid.
    #[inline]
    pub fn get(&self, x: i32, y: i32, z: i32) -> BlockRecord {
        self.slot(x, y, z)
            .map_or(BlockRecord::AIR, |index| self.blocks[index])
    }

    /// Writes a block. Writes outside the grid are ignored.
    #[inline]
    pub fn set(&mut self, x: i32, y: i32, z: i32, record: BlockRecord) {
        self.replace(x, y, z, record);
    }

    /// Writes a block and returns the value it replaced.
    ///
    /// # Returns
    /// `None` if the coordinate lies outside the grid, in which case nothing is written.
    pub fn replace(&mut self, x: i32, y: i32, z: i32, record: BlockRecord) -> Option<BlockRecord> {
        let index = self.slot(x, y, z)?;
        Some(std::mem::replace(&mut self.blocks[index], record))
    }

    /// Sets every cell to `record`.
    pub fn fill(&mut self, record: BlockRecord) {
        self.blocks.fill(record);
    }

    /// Number of cells that are not Air.
    pub fn count_non_air(&self) -> usize {
        self.blocks.iter().filter(|block| !block.is_air()).count()
    }

    /// Whether any cell in the horizontal or vertical slab at the given face is not Air.
    ///
    /// `axis` is 0 for X, 1 for Y and 2 for Z; `layer` is the coordinate along that axis.
    pub fn slab_has_blocks(&self, axis: usize, layer: i32) -> bool {
        let edge = self.dimensions.edge as i32;
        let height = self.dimensions.height as i32;
        match axis {
            0 => (0..height).any(|y| (0..edge).any(|z| !self.get(layer, y, z).is_air())),
            1 => (0..edge).any(|z| (0..edge).any(|x| !self.get(x, layer, z).is_air())),
            _ => (0..height).any(|y| (0..edge).any(|x| !self.get(x, y, layer).is_air())),
        }
    }

    /// The raw blocks in storage order.
    pub fn as_slice(&self) -> &[BlockRecord] {
        &self.blocks
    }

    /// The raw blocks viewed as bytes, for handing to an external mesher or renderer.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.blocks)
    }

    /// Converts a storage index back into local coordinates.
    pub fn position_of(&self, index: usize) -> Point3<i32> {
        let edge = self.dimensions.edge;
        let layer = self.dimensions.layer_size();
        Point3::new(
            (index % edge) as i32,
            (index / layer) as i32,
            ((index % layer) / edge) as i32,
        )
    }
}

/// A bounded free-list of voxel buffers keyed by dimensions.
///
/// Unloaded chunks hand their storage back here and newly loaded chunks draw from it.
#[derive(Debug)]
pub struct StoragePool {
    capacity: usize,
    free: HashMap<ChunkDimensions, Vec<VoxelStorage>>,
    pooled: usize,
}

impl StoragePool {
    /// Creates an empty pool that keeps at most `capacity` idle buffers.
    pub fn new(capacity: usize) -> Self {
        StoragePool {
            capacity,
            free: HashMap::new(),
            pooled: 0,
        }
    }

    /// Takes a buffer of the requested dimensions, filled with Air.
    pub fn acquire(&mut self, dimensions: ChunkDimensions) -> VoxelStorage {
        match self.free.get_mut(&dimensions).and_then(Vec::pop) {
            Some(mut storage) => {
                self.pooled -= 1;
                storage.fill(BlockRecord::AIR);
                storage
            }
            None => VoxelStorage::new(dimensions),
        }
    }

    /// Returns a buffer to the pool.
    ///
    /// # Returns
    /// `true` if the buffer was kept, `false` if the pool was full or the buffer empty.
    pub fn release(&mut self, storage: VoxelStorage) -> bool {
        if self.pooled >= self.capacity || storage.dimensions().volume() == 0 {
            return false;
        }
        self.free
            .entry(storage.dimensions())
            .or_default()
            .push(storage);
        self.pooled += 1;
        true
    }

    /// Number of idle buffers held.
    pub fn len(&self) -> usize {
        self.pooled
    }

    /// Whether the pool holds no idle buffers.
    pub fn is_empty(&self) -> bool {
        self.pooled == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stone() -> BlockRecord {
        BlockRecord::from_type(1).unwrap()
    }

    #[test]
    fn out_of_range_reads_are_air_and_writes_are_ignored() {
        let dims = ChunkDimensions::new(4, 6);
        let mut storage = VoxelStorage::new(dims);
        storage.fill(stone());
        let before = storage.clone();

        for (x, y, z) in [(-1, 0, 0), (4, 0, 0), (0, 6, 0), (0, 0, 4), (0, -1, 0), (i32::MAX, 0, i32::MIN)] {
            assert_eq!(storage.get(x, y, z), BlockRecord::AIR);
            storage.set(x, y, z, BlockRecord::AIR);
            assert_eq!(storage.replace(x, y, z, BlockRecord::AIR), None);
        }
        assert_eq!(storage, before);
    }

    #[test]
    fn in_range_access_round_trips() {
        let mut storage = VoxelStorage::new(ChunkDimensions::new(4, 6));
        storage.set(3, 5, 2, stone());
        assert_eq!(storage.get(3, 5, 2), stone());
        assert_eq!(storage.replace(3, 5, 2, BlockRecord::AIR), Some(stone()));
        assert_eq!(storage.count_non_air(), 0);
    }

    #[test]
    fn position_of_inverts_index() {
        let dims = ChunkDimensions::new(4, 6);
        let storage = VoxelStorage::new(dims);
        let index = dims.index(1, 5, 3);
        assert_eq!(storage.position_of(index), Point3::new(1, 5, 3));
    }

    #[test]
    fn slab_detection_sees_only_its_layer() {
        let mut storage = VoxelStorage::new(ChunkDimensions::new(4, 4));
        storage.set(0, 2, 1, stone());
        assert!(storage.slab_has_blocks(0, 0));
        assert!(!storage.slab_has_blocks(0, 3));
        assert!(storage.slab_has_blocks(1, 2));
        assert!(!storage.slab_has_blocks(2, 0));
    }

    #[test]
    fn pool_reuses_cleared_buffers_up_to_capacity() {
        let dims = ChunkDimensions::new(4, 4);
        let mut pool = StoragePool::new(1);

        let mut storage = pool.acquire(dims);
        storage.fill(stone());
        assert!(pool.release(storage));
        assert!(!pool.release(VoxelStorage::new(dims)));
        assert_eq!(pool.len(), 1);

        let reused = pool.acquire(dims);
        assert_eq!(reused.count_non_air(), 0);
        assert!(pool.is_empty());

        let other = pool.acquire(ChunkDimensions::new(8, 8));
        assert_eq!(other.dimensions(), ChunkDimensions::new(8, 8));
    }
}
