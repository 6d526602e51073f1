//! # Chunk Iteration Module
//!
//! This module provides an iterator over the solid (non-air) blocks of a chunk's
//! storage, in storage order. Meshers use it to skip the empty majority of a typical
//! chunk without re-deriving coordinates from linear indices themselves.

use cgmath::Point3;

use crate::engine_state::voxels::block::BlockRecord;

use super::storage::VoxelStorage;

/// An iterator over all non-air blocks in a [`VoxelStorage`].
///
/// Yields each solid block together with its local coordinates. Coordinates advance
/// X first, then Z, then Y, matching the storage layout.
pub struct ChunkBlockIterator<'a> {
    /// The storage being walked
    storage: &'a VoxelStorage,
    /// Current position in the block slice
    offset: usize,
    /// Current X position within the chunk
    local_x: i32,
    /// Current Y position within the chunk
    local_y: i32,
    /// Current Z position within the chunk
    local_z: i32,
}

impl<'a> ChunkBlockIterator<'a> {
    /// Creates a new iterator positioned before the first block.
    ///
    /// # Arguments
    /// * `storage` - The storage to iterate over
    pub fn new(storage: &'a VoxelStorage) -> Self {
        ChunkBlockIterator {
            storage,
            offset: 0,
            local_x: 0,
            local_y: 0,
            local_z: 0,
        }
    }

    /// Moves the cursor one cell forward, wrapping rows and layers.
    fn advance(&mut self) {
        let dims = self.storage.dimensions();
        self.offset += 1;
        self.local_x += 1;

        // End of a row
        if self.local_x == dims.edge as i32 {
            self.local_x = 0;
            self.local_z += 1;

            // End of a layer
            if self.local_z == dims.edge as i32 {
                self.local_z = 0;
                self.local_y += 1;
            }
        }
    }
}

impl Iterator for ChunkBlockIterator<'_> {
    type Item = (Point3<i32>, BlockRecord);

    fn next(&mut self) -> Option<Self::Item> {
        let blocks = self.storage.as_slice();
        while self.offset < blocks.len() {
            let block = blocks[self.offset];
            let position = Point3::new(self.local_x, self.local_y, self.local_z);
            self.advance();
            if !block.is_air() {
                return Some((position, block));
            }
        }
        None
    }
}

impl VoxelStorage {
    /// Iterates over the non-air blocks of this storage.
    pub fn solid_blocks(&self) -> ChunkBlockIterator<'_> {
        ChunkBlockIterator::new(self)
    }
}
