#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![warn(rustdoc::invalid_rust_codeblocks)]

//! # Voxel Streaming
//!
//! A chunk streaming core for voxel worlds: it keeps the chunks around an observer
//! loaded, generates their terrain and meshes them on background workers, and tears
//! them down again as the observer moves away.
//!
//! ## Key Modules
//!
//! * `config` - World configuration and chunk dimensions
//! * `core` - Shared-state primitives used throughout the pipeline
//! * `engine_state` - Blocks, chunks, terrain, the chunk manager and its worker pools
//!
//! ## Architecture
//!
//! The crate stops at two boundaries:
//! * Terrain comes from a [`TerrainGenerator`] that fills a grid of block type codes
//! * Geometry comes from a [`ChunkMesher`] that turns a chunk into an opaque [`MeshHandle`]
//!
//! Everything between them (the chunk table, neighbor links, dirty tracking, the
//! generation and meshing queues) is owned by the [`ChunkManager`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! fn main() {
//!     voxel_streaming::run();
//! }
//! ```

use std::{fs, io, sync::Arc, thread, time::Duration};

use cgmath::Point3;
use log::{error, info, LevelFilter};
use thiserror::Error;

pub mod config;
pub mod core;
pub mod engine_state;

pub use config::{ChunkDimensions, ConfigError, WorldConfig};
pub use engine_state::{
    rendering::{
        culling::{BoxCuller, FrustumCuller, NoCulling},
        mesher::{ChunkMesher, FaceCountMesh, FaceCountMesher, MeshHandle, MeshingError},
    },
    voxels::{
        block::{
            block_registry::{BlockDefinition, BlockProperties, BlockRegistry, RegistryError},
            block_side::BlockSide,
            BlockRecord, BlockRecordError,
        },
        chunk::{
            position::{BoundingBox, ChunkPosition},
            storage::VoxelStorage,
            Chunk, ChunkState,
        },
        pipeline::PipelineStats,
        terrain::{
            EmptyTerrain, FlatTerrain, GenerationError, NoiseTerrain, TerrainGenerator,
            TerrainGrid, TerrainRequest,
        },
        world::{ChunkManager, ManagerError},
    },
};

/// Number of observer steps the demo runs.
pub const DEMO_TICKS: usize = 48;

/// Blocks the demo observer moves per tick.
const DEMO_STEP: f32 = 4.0;

/// Initialises `env_logger` on stdout at `info`, overridable through `RUST_LOG`.
///
/// Calling it more than once is harmless.
pub fn init_logger() {
    let mut log_builder = env_logger::Builder::new();
    let _ = log_builder
        .target(env_logger::Target::Stdout)
        .filter_level(LevelFilter::Info)
        .parse_env("RUST_LOG")
        .try_init();
}

/// Errors that stop the demo.
#[derive(Debug, Error)]
pub enum RunError {
    /// The configuration file could not be read.
    #[error("failed to read {path}: {source}")]
    ReadConfig {
        /// Path given on the command line.
        path: String,
        /// The OS error.
        source: io::Error,
    },
    /// The configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The block registry lacks a block the terrain needs.
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// The manager failed to start.
    #[error(transparent)]
    Manager(#[from] ManagerError),
}

/// Runs the headless demo.
///
/// An optional JSON configuration path is read from the first command line argument.
pub fn run() {
    init_logger();
    info!("Logger initialized");

    let config = match std::env::args().nth(1) {
        Some(path) => load_config(&path),
        None => Ok(WorldConfig::default()),
    };
    match config.and_then(|config| walk(config, DEMO_TICKS)) {
        Ok(stats) => info!("Demo finished after {} ticks: {:?}", DEMO_TICKS, stats),
        Err(error) => error!("Demo failed: {}", error),
    }
}

fn load_config(path: &str) -> Result<WorldConfig, RunError> {
    let json = fs::read_to_string(path).map_err(|source| RunError::ReadConfig {
        path: path.to_string(),
        source,
    })?;
    Ok(WorldConfig::from_json_str(&json)?)
}

/// Walks an observer along +X for `ticks` ticks over noise terrain, placing a few
/// random blocks on the way, then shuts the manager down.
///
/// # Returns
/// The pipeline statistics taken just before shutdown.
pub fn walk(config: WorldConfig, ticks: usize) -> Result<PipelineStats, RunError> {
    let registry = Arc::new(BlockRegistry::default());
    let terrain = NoiseTerrain::new(&registry)?;
    let glowstone = registry.require("glowstone")?;
    let mut manager = ChunkManager::new(
        config,
        terrain,
        FaceCountMesher::new(registry.clone()),
        registry,
    )?;

    let mut rng = fastrand::Rng::with_seed(u64::from(manager.config().seed));
    let mut observer = Point3::new(0.0, 20.0, 0.0);
    for tick in 0..ticks {
        manager.update(observer);

        if tick % 8 == 7 {
            let target = Point3::new(
                observer.x as i32 + rng.i32(-8..8),
                rng.i32(0..24),
                observer.z as i32 + rng.i32(-8..8),
            );
            manager.set_block(target, BlockRecord::from_raw(glowstone));
        }

        if tick % 16 == 15 {
            match serde_json::to_string(&manager.stats()) {
                Ok(json) => info!("Tick {}: {}", tick, json),
                Err(error) => error!("Failed to serialise stats: {}", error),
            }
        }

        observer.x += DEMO_STEP;
        thread::sleep(Duration::from_millis(16));
    }

    manager.wait_until_idle(Duration::from_secs(5));
    let edge = manager.config().chunk_edge as f32 * 2.0;
    let view = BoxCuller::new(
        Point3::new(observer.x - edge, observer.y - edge, observer.z - edge),
        Point3::new(observer.x + edge, observer.y + edge, observer.z + edge),
    );
    info!(
        "{} chunks visible around the observer",
        manager.get_visible_chunks(&view).len()
    );

    let stats = manager.stats();
    manager.shutdown();
    Ok(stats)
}
