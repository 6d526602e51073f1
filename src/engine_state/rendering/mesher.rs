//! Mesher boundary.
//!
//! Geometry construction belongs to the renderer. The streaming core only decides *when*
//! a chunk is meshed and owns the resulting handle until the chunk is unloaded or reset,
//! at which point the handle's [`MeshHandle::release`] is called exactly once.
//!
//! [`FaceCountMesher`] is a minimal mesher that records which faces are visible,
//! bucketed by block side. It backs the demo and the tests; a real renderer plugs in
//! its own [`ChunkMesher`].

use std::{any::Any, sync::Arc};

use bitvec::prelude::BitVec;
use cgmath::Point3;
use thiserror::Error;

use crate::engine_state::voxels::{
    block::{block_registry::BlockRegistry, block_side::BlockSide},
    chunk::Chunk,
};

/// Errors raised while building a mesh for one chunk.
#[derive(Debug, Error)]
pub enum MeshingError {
    /// The mesher reported a failure.
    #[error("mesher failed: {0}")]
    Mesher(String),
    /// The mesher panicked.
    #[error("mesher panicked: {0}")]
    Panicked(String),
}

/// An opaque, renderer-owned mesh.
pub trait MeshHandle: Send + Sync {
    /// Frees the external resources behind this handle.
    fn release(self: Box<Self>) {}

    /// Downcasting hook for the renderer that created the handle.
    fn as_any(&self) -> &dyn Any;
}

/// Builds a mesh for a Ready, dirty chunk.
pub trait ChunkMesher: Send + Sync {
    /// Builds a mesh from the chunk's current contents.
    fn build(&self, chunk: &Chunk) -> Result<Box<dyn MeshHandle>, MeshingError>;
}

/// Visible faces of one chunk, bucketed by side.
#[derive(Clone, Debug)]
pub struct FaceCountMesh {
    edge: usize,
    layer: usize,
    /// One bit per `(block, side)`, indexed `block_index * 6 + side`.
    faces: BitVec,
    per_side: [usize; 6],
    total: usize,
}

impl FaceCountMesh {
    /// Number of visible faces.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Number of visible faces pointing along `side`.
    pub fn count(&self, side: BlockSide) -> usize {
        self.per_side[side as usize]
    }

    /// Whether the given face was meshed.
    pub fn is_visible(&self, local: Point3<i32>, side: BlockSide) -> bool {
        if local.x < 0 || local.y < 0 || local.z < 0 {
            return false;
        }
        let (x, y, z) = (local.x as usize, local.y as usize, local.z as usize);
        if x >= self.edge || z >= self.edge {
            return false;
        }
        let bit = (x + z * self.edge + y * self.layer) * 6 + side as usize;
        self.faces.get(bit).is_some_and(|visible| *visible)
    }
}

impl MeshHandle for FaceCountMesh {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Mesher that records visible faces without producing geometry.
#[derive(Clone, Debug)]
pub struct FaceCountMesher {
    registry: Arc<BlockRegistry>,
}

impl FaceCountMesher {
    /// Creates a mesher using `registry` for transparency.
    pub fn new(registry: Arc<BlockRegistry>) -> Self {
        FaceCountMesher { registry }
    }
}

impl ChunkMesher for FaceCountMesher {
    fn build(&self, chunk: &Chunk) -> Result<Box<dyn MeshHandle>, MeshingError> {
        let dims = chunk.dimensions();
        let mut mesh = FaceCountMesh {
            edge: dims.edge,
            layer: dims.layer_size(),
            faces: BitVec::repeat(false, dims.volume() * 6),
            per_side: [0; 6],
            total: 0,
        };

        chunk.for_each_visible_face(&self.registry, |local, side, _| {
            let index = dims.index(local.x as usize, local.y as usize, local.z as usize);
            mesh.faces.set(index * 6 + side as usize, true);
            mesh.per_side[side as usize] += 1;
            mesh.total += 1;
        });

        Ok(Box::new(mesh))
    }
}
