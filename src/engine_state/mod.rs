//! # Engine State Module
//!
//! The subsystems of the chunk streaming engine.
//!
//! ## Key Components
//!
//! * `rendering` - Mesher and frustum boundaries, and the meshing task
//! * `task_management` - Worker pools and bounded task queues
//! * `voxels` - Blocks, chunks, terrain generation and the chunk manager
//!
//! ## Architecture
//!
//! The `ChunkManager` in `voxels::world` is the central coordinator. It owns the chunk
//! table and two worker pools from `task_management`, one running generation tasks from
//! `voxels::tasks` and one running meshing tasks from `rendering::tasks`. Everything a
//! task needs travels with it as `Arc`s, so workers never reach back into the manager.

pub mod rendering;
pub mod task_management;
pub mod voxels;
