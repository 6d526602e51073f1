//! # World Configuration
//!
//! Settings consumed by the [`ChunkManager`](crate::ChunkManager) when a world is created.
//! Every field has a default, so a configuration file only needs to name the values it
//! overrides:
//!
//! ```
//! use voxel_streaming::WorldConfig;
//!
//! let config = WorldConfig::from_json_str(r#"{ "load_radius": 2, "unload_radius": 4 }"#).unwrap();
//! assert_eq!(config.generation_workers, 4);
//! assert_eq!(config.dimensions().edge, 16);
//! ```
//!
//! Chunk dimensions are fixed at world creation. Changing them on a live manager is not
//! supported.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default horizontal edge length of a chunk, in blocks.
pub const DEFAULT_CHUNK_EDGE: usize = 16;
/// Default vertical extent of a chunk, in blocks.
pub const DEFAULT_CHUNK_HEIGHT: usize = 16;

/// Errors raised while loading or validating a [`WorldConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The unload radius must be strictly larger than the load radius.
    #[error("unload radius {unload} must be greater than load radius {load}")]
    RadiusOrder {
        /// Configured load radius.
        load: i32,
        /// Configured unload radius.
        unload: i32,
    },
    /// Load radius must not be negative.
    #[error("load radius {0} must not be negative")]
    NegativeRadius(i32),
    /// A worker pool was configured with no workers.
    #[error("{0} worker count must be at least 1")]
    NoWorkers(&'static str),
    /// A chunk dimension was zero.
    #[error("chunk {0} must be at least 1")]
    EmptyDimension(&'static str),
    /// A queue or pool capacity was zero.
    #[error("{0} capacity must be at least 1")]
    ZeroCapacity(&'static str),
    /// The configuration text was not valid JSON for this schema.
    #[error("invalid configuration JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Size of a chunk in blocks.
///
/// Chunks are `edge` blocks wide along X and Z and `height` blocks tall along Y.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkDimensions {
    /// Width and depth of a chunk.
    pub edge: usize,
    /// Height of a chunk.
    pub height: usize,
}

impl ChunkDimensions {
    /// Creates a new set of dimensions.
    pub const fn new(edge: usize, height: usize) -> Self {
        ChunkDimensions { edge, height }
    }

    /// Number of blocks in a single horizontal layer.
    pub const fn layer_size(&self) -> usize {
        self.edge * self.edge
    }

    /// Total number of blocks in a chunk.
    pub const fn volume(&self) -> usize {
        self.layer_size() * self.height
    }

    /// Whether the local coordinate lies inside a chunk of these dimensions.
    pub fn contains(&self, x: i32, y: i32, z: i32) -> bool {
        x >= 0
            && y >= 0
            && z >= 0
            && (x as usize) < self.edge
            && (y as usize) < self.height
            && (z as usize) < self.edge
    }

    /// Linear index of an in-bounds local coordinate.
    ///
    /// Blocks are laid out X first, then Z, then Y, so that a horizontal layer is contiguous.
    pub fn index(&self, x: usize, y: usize, z: usize) -> usize {
        x + z * self.edge + y * self.layer_size()
    }
}

impl Default for ChunkDimensions {
    fn default() -> Self {
        ChunkDimensions::new(DEFAULT_CHUNK_EDGE, DEFAULT_CHUNK_HEIGHT)
    }
}

/// Configuration surface of the chunk streaming pipeline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Euclidean distance, in chunks, within which missing chunks are generated.
    pub load_radius: i32,
    /// Euclidean distance, in chunks, beyond which tracked chunks are unloaded.
    pub unload_radius: i32,
    /// Number of terrain generation worker threads.
    pub generation_workers: usize,
    /// Number of meshing worker threads.
    pub meshing_workers: usize,
    /// World seed handed to the terrain generator.
    pub seed: u32,
    /// Horizontal chunk edge length, in blocks.
    pub chunk_edge: usize,
    /// Vertical chunk extent, in blocks.
    pub chunk_height: usize,
    /// Maximum number of chunks waiting for generation.
    pub generation_queue_capacity: usize,
    /// Maximum number of chunks waiting for meshing.
    pub meshing_queue_capacity: usize,
    /// Maximum number of idle voxel buffers kept for reuse.
    pub storage_pool_capacity: usize,
    /// How long shutdown waits for in-flight work, in milliseconds.
    pub shutdown_timeout_ms: u64,
}

impl Default for WorldConfig {
    fn default() -> Self {
        WorldConfig {
            load_radius: 4,
            unload_radius: 6,
            generation_workers: 4,
            meshing_workers: 2,
            seed: 0,
            chunk_edge: DEFAULT_CHUNK_EDGE,
            chunk_height: DEFAULT_CHUNK_HEIGHT,
            generation_queue_capacity: 4096,
            meshing_queue_capacity: 4096,
            storage_pool_capacity: 256,
            shutdown_timeout_ms: 2000,
        }
    }
}

impl WorldConfig {
    /// Parses a configuration from JSON and validates it.
    ///
    /// # Arguments
    /// * `json` - A JSON object; missing fields take their default values
    ///
    /// # Returns
    /// The validated configuration, or the first problem found.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: WorldConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants the manager relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.load_radius < 0 {
            return Err(ConfigError::NegativeRadius(self.load_radius));
        }
        if self.unload_radius <= self.load_radius {
            return Err(ConfigError::RadiusOrder {
                load: self.load_radius,
                unload: self.unload_radius,
            });
        }
        if self.generation_workers == 0 {
            return Err(ConfigError::NoWorkers("generation"));
        }
        if self.meshing_workers == 0 {
            return Err(ConfigError::NoWorkers("meshing"));
        }
        if self.chunk_edge == 0 {
            return Err(ConfigError::EmptyDimension("edge"));
        }
        if self.chunk_height == 0 {
            return Err(ConfigError::EmptyDimension("height"));
        }
        if self.generation_queue_capacity == 0 {
            return Err(ConfigError::ZeroCapacity("generation queue"));
        }
        if self.meshing_queue_capacity == 0 {
            return Err(ConfigError::ZeroCapacity("meshing queue"));
        }
        if self.storage_pool_capacity == 0 {
            return Err(ConfigError::ZeroCapacity("storage pool"));
        }
        Ok(())
    }

    /// The chunk dimensions this configuration describes.
    pub fn dimensions(&self) -> ChunkDimensions {
        ChunkDimensions::new(self.chunk_edge, self.chunk_height)
    }
}
