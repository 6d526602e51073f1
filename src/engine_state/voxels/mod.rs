//! # Voxel Streaming Core
//!
//! This module contains the data model and the pipeline that keeps chunks streamed in
//! around an observer.
//!
//! ## Architecture
//!
//! * **Block**: packed block records, block sides, the registry and face visibility
//! * **Chunk**: fixed-size 3D arrays of blocks with lifecycle state and neighbor links
//! * **Terrain**: the generator boundary and the supplied generators
//! * **Pipeline**: contexts and counters shared between the manager and its workers
//! * **World**: the `ChunkManager` that loads, unloads, links and schedules chunks
//! * **Tasks**: the generation task run by the generation pool
//!
//! ## Data Flow
//!
//! 1. The manager creates chunks within the load radius and queues them for generation
//! 2. A generation worker fills the chunk and queues it for meshing
//! 3. A meshing worker builds the mesh through the external mesher
//! 4. Edits mark chunks dirty; the manager requeues them for meshing on its next tick
//!
//! ## Thread Safety
//!
//! Only the manager mutates the chunk table. Chunks themselves are shared as
//! `Arc<Chunk>` and synchronise internally; see the chunk module for the lock rules.

pub mod block;
pub mod chunk;
pub mod pipeline;
pub mod tasks;
pub mod terrain;
pub mod world;
