//! Background tasks for the rendering side of the pipeline.
//!
//! # Available Tasks
//! - `ChunkMeshGenerationTask`: Builds the mesh of a chunk on a meshing worker

pub mod chunk_mesh_generation_task;
