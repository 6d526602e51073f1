//! # Block Module
//!
//! This module provides the core block-related functionality for the voxel world.
//! It includes the packed block record stored in chunks, block face handling, the
//! declarative block registry and the face visibility rule that drives meshing.

use std::fmt;

use thiserror::Error;

pub mod block_registry;
pub mod block_side;
pub mod visibility;

/// The underlying integer type used to represent a packed block in memory.
pub type BlockTypeSize = u16;

/// Number of bits reserved for the block type code.
pub const TYPE_CODE_BITS: u32 = 12;
/// Number of bits reserved for per-block metadata.
pub const METADATA_BITS: u32 = 4;
/// Largest type code that fits in a [`BlockRecord`].
pub const MAX_TYPE_CODE: BlockTypeSize = (1 << TYPE_CODE_BITS) - 1;
/// Largest metadata value that fits in a [`BlockRecord`].
pub const MAX_METADATA: u8 = (1 << METADATA_BITS) - 1;

const TYPE_CODE_MASK: BlockTypeSize = MAX_TYPE_CODE;

/// Raised when a type code or metadata value does not fit its bit field.
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum BlockRecordError {
    /// The type code needs more than [`TYPE_CODE_BITS`] bits.
    #[error("block type code {0} exceeds the maximum of {MAX_TYPE_CODE}")]
    TypeCodeOverflow(u32),
    /// The metadata needs more than [`METADATA_BITS`] bits.
    #[error("block metadata {0} exceeds the maximum of {MAX_METADATA}")]
    MetadataOverflow(u8),
}

/// Represents a single voxel block in the world.
///
/// A block is packed into 16 bits: the low 12 bits hold the type code and the high
/// 4 bits hold a metadata nibble. The all-zero value is Air, the absence of a solid
/// block. Block properties (transparency, colour) are looked up from the type code
/// through the [`BlockRegistry`](block_registry::BlockRegistry).
///
/// # Memory Layout
/// `#[repr(transparent)]` over a `u16`, so a chunk's storage can be viewed as raw
/// bytes with `bytemuck` when it is handed to an external mesher or renderer.
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, Hash, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BlockRecord(BlockTypeSize);

impl BlockRecord {
    /// The empty block.
    pub const AIR: BlockRecord = BlockRecord(0);

    /// Packs a type code and metadata nibble into a block.
    ///
    /// # Arguments
    /// * `type_code` - The block type, at most [`MAX_TYPE_CODE`]
    /// * `metadata` - Per-block metadata, at most [`MAX_METADATA`]
    ///
    /// # Returns
    /// The packed block, or an error naming the field that overflowed. Values are never
    /// truncated.
    pub fn new(type_code: u32, metadata: u8) -> Result<Self, BlockRecordError> {
        if type_code > MAX_TYPE_CODE as u32 {
            return Err(BlockRecordError::TypeCodeOverflow(type_code));
        }
        if metadata > MAX_METADATA {
            return Err(BlockRecordError::MetadataOverflow(metadata));
        }
        Ok(BlockRecord(
            type_code as BlockTypeSize | (metadata as BlockTypeSize) << TYPE_CODE_BITS,
        ))
    }

    /// Packs a type code with zero metadata.
    pub fn from_type(type_code: u32) -> Result<Self, BlockRecordError> {
        Self::new(type_code, 0)
    }

    /// Reinterprets a raw packed value. Every `u16` is a valid record.
    pub const fn from_raw(raw: BlockTypeSize) -> Self {
        BlockRecord(raw)
    }

    /// The raw packed value.
    pub const fn raw(self) -> BlockTypeSize {
        self.0
    }

    /// The block type code.
    pub const fn type_code(self) -> BlockTypeSize {
        self.0 & TYPE_CODE_MASK
    }

    /// The metadata nibble.
    pub const fn metadata(self) -> u8 {
        (self.0 >> TYPE_CODE_BITS) as u8
    }

    /// Whether this block is Air.
    ///
    /// Air is identified by its type code alone; metadata on an air block is ignored.
    pub const fn is_air(self) -> bool {
        self.type_code() == 0
    }
}

impl fmt::Debug for BlockRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockRecord")
            .field("type_code", &self.type_code())
            .field("metadata", &self.metadata())
            .finish()
    }
}
