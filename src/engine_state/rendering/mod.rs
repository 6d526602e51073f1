//! Rendering boundary of the streaming pipeline.
//!
//! The pipeline never produces geometry itself. It decides when a chunk needs a mesh,
//! calls the external [`mesher::ChunkMesher`] on a meshing worker and keeps the returned
//! handle. Visibility queries go through the external [`culling::FrustumCuller`].

pub mod culling;
pub mod mesher;
pub mod tasks;
