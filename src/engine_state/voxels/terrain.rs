//! # Terrain Module
//!
//! The boundary between chunks and whatever produces their content. A generator is
//! handed a [`TerrainRequest`] naming the chunk and its size and returns a dense
//! [`TerrainGrid`] of raw type codes; the chunk validates and packs them.
//!
//! Generators must be deterministic per `(seed, position)`. The pipeline never retries
//! a chunk with a different seed.
//!
//! ## Supplied Generators
//!
//! - [`NoiseTerrain`]: Perlin heightmap with water, beaches, snow caps, caves and trees
//! - [`FlatTerrain`]: a single material below a fixed height
//! - [`EmptyTerrain`]: all Air
//!
//! Any `Fn(&TerrainRequest) -> Result<TerrainGrid, GenerationError>` is a generator too.

use noise::{NoiseFn, Perlin};
use thiserror::Error;

use crate::{
    config::ChunkDimensions,
    engine_state::voxels::{
        block::{
            block_registry::{BlockRegistry, RegistryError},
            BlockRecordError, BlockTypeSize,
        },
        chunk::position::ChunkPosition,
    },
};

/// Errors raised while producing terrain for one chunk.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// The generator reported a failure.
    #[error("terrain generator failed: {0}")]
    Generator(String),
    /// The generator returned a grid of the wrong size.
    #[error("terrain grid is {found:?}, chunk expects {expected:?}")]
    GridMismatch {
        /// Dimensions of the chunk.
        expected: ChunkDimensions,
        /// Dimensions of the returned grid.
        found: ChunkDimensions,
    },
    /// The generator produced a type code that does not fit a block record.
    #[error("terrain grid holds an invalid block: {0}")]
    InvalidBlock(#[from] BlockRecordError),
    /// The generator panicked.
    #[error("terrain generator panicked: {0}")]
    Panicked(String),
}

/// What a generator is asked to produce.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TerrainRequest {
    /// Grid position of the chunk. X and Z are the horizontal inputs.
    pub position: ChunkPosition,
    /// Horizontal edge length, in blocks.
    pub edge: usize,
    /// Vertical extent, in blocks.
    pub height: usize,
    /// World seed.
    pub seed: u32,
}

impl TerrainRequest {
    /// Dimensions of the grid to return.
    pub fn dimensions(&self) -> ChunkDimensions {
        ChunkDimensions::new(self.edge, self.height)
    }

    /// World block coordinate of local `(x, y, z)` in the requested chunk.
    pub fn world_block(&self, x: usize, y: usize, z: usize) -> (i32, i32, i32) {
        let origin = self.position.origin_block(self.dimensions());
        (
            origin.x.saturating_add(x as i32),
            origin.y.saturating_add(y as i32),
            origin.z.saturating_add(z as i32),
        )
    }
}

/// A dense grid of raw type codes, laid out like chunk storage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TerrainGrid {
    dimensions: ChunkDimensions,
    codes: Vec<BlockTypeSize>,
}

impl TerrainGrid {
    /// A grid of the given size filled with Air (code 0).
    pub fn new(dimensions: ChunkDimensions) -> Self {
        TerrainGrid {
            dimensions,
            codes: vec![0; dimensions.volume()],
        }
    }

    /// Builds a grid by evaluating `f` at every local coordinate.
    pub fn from_fn(
        dimensions: ChunkDimensions,
        mut f: impl FnMut(usize, usize, usize) -> BlockTypeSize,
    ) -> Self {
        let mut grid = Self::new(dimensions);
        for y in 0..dimensions.height {
            for z in 0..dimensions.edge {
                for x in 0..dimensions.edge {
                    let index = dimensions.index(x, y, z);
                    grid.codes[index] = f(x, y, z);
                }
            }
        }
        grid
    }

    /// Dimensions of the grid.
    pub fn dimensions(&self) -> ChunkDimensions {
        self.dimensions
    }

    /// The codes in storage order.
    pub fn codes(&self) -> &[BlockTypeSize] {
        &self.codes
    }

    /// Reads a code. Out-of-range reads return Air.
    pub fn get(&self, x: usize, y: usize, z: usize) -> BlockTypeSize {
        if x < self.dimensions.edge && y < self.dimensions.height && z < self.dimensions.edge {
            self.codes[self.dimensions.index(x, y, z)]
        } else {
            0
        }
    }

    /// Writes a code. Out-of-range writes are ignored.
    pub fn set(&mut self, x: usize, y: usize, z: usize, code: BlockTypeSize) {
        if x < self.dimensions.edge && y < self.dimensions.height && z < self.dimensions.edge {
            let index = self.dimensions.index(x, y, z);
            self.codes[index] = code;
        }
    }
}

/// Produces block type codes for a chunk.
pub trait TerrainGenerator: Send + Sync {
    /// Generates the grid for one chunk.
    fn generate(&self, request: &TerrainRequest) -> Result<TerrainGrid, GenerationError>;
}

impl<F> TerrainGenerator for F
where
    F: Fn(&TerrainRequest) -> Result<TerrainGrid, GenerationError> + Send + Sync,
{
    fn generate(&self, request: &TerrainRequest) -> Result<TerrainGrid, GenerationError> {
        self(request)
    }
}

/// All Air.
#[derive(Copy, Clone, Debug, Default)]
pub struct EmptyTerrain;

impl TerrainGenerator for EmptyTerrain {
    fn generate(&self, request: &TerrainRequest) -> Result<TerrainGrid, GenerationError> {
        Ok(TerrainGrid::new(request.dimensions()))
    }
}

/// One material everywhere below a fixed world height.
#[derive(Copy, Clone, Debug)]
pub struct FlatTerrain {
    /// World Y at which the ground stops (exclusive).
    pub ground_height: i32,
    /// Type code of the ground.
    pub fill: BlockTypeSize,
}

impl FlatTerrain {
    /// Creates a flat world with `fill` below `ground_height`.
    pub fn new(ground_height: i32, fill: BlockTypeSize) -> Self {
        FlatTerrain {
            ground_height,
            fill,
        }
    }
}

impl TerrainGenerator for FlatTerrain {
    fn generate(&self, request: &TerrainRequest) -> Result<TerrainGrid, GenerationError> {
        Ok(TerrainGrid::from_fn(request.dimensions(), |x, y, z| {
            let (_, world_y, _) = request.world_block(x, y, z);
            if world_y < self.ground_height {
                self.fill
            } else {
                0
            }
        }))
    }
}

/// Scaling factor applied to world coordinates when sampling the heightmap.
pub const HEIGHT_SCALE_FACTOR: f64 = 0.015;
/// Scaling factor applied to world coordinates when sampling cave noise.
pub const CAVE_SCALE_FACTOR: f64 = 0.06;
/// Cave noise above this value carves the block out.
pub const CAVE_THRESHOLD: f64 = 0.45;
/// Chance, in percent, that a grass column grows a tree.
pub const TREE_CHANCE_PERCENT: u32 = 2;
/// Height of a tree trunk, in blocks.
pub const TRUNK_HEIGHT: i32 = 3;

#[derive(Copy, Clone, Debug)]
struct TerrainPalette {
    stone: BlockTypeSize,
    dirt: BlockTypeSize,
    grass: BlockTypeSize,
    sand: BlockTypeSize,
    water: BlockTypeSize,
    snow: BlockTypeSize,
    wood: BlockTypeSize,
    leaves: BlockTypeSize,
}

/// Perlin-noise terrain with a water table.
///
/// The surface height of each column comes from two octaves of 2D Perlin noise.
/// Columns below `sea_level` are flooded, the surface near the waterline is sand, high
/// ground is capped with snow and everything else is grass over three layers of dirt
/// over stone. 3D noise carves caves well below the surface, and a few grass columns
/// grow a trunk topped with leaves. Column decisions depend only on the world seed and
/// the world position, so neighboring chunks agree at their borders.
#[derive(Clone, Debug)]
pub struct NoiseTerrain {
    palette: TerrainPalette,
    /// World Y of the water surface.
    pub sea_level: i32,
    /// Mean surface height.
    pub base_height: i32,
    /// Peak deviation from `base_height`.
    pub amplitude: f64,
    /// World Y above which surfaces are snow.
    pub snow_line: i32,
}

impl NoiseTerrain {
    /// Creates a generator, resolving its materials by name in `registry`.
    ///
    /// # Returns
    /// An error if the registry lacks any of stone, dirt, grass, sand, water, snow,
    /// wood or leaves.
    pub fn new(registry: &BlockRegistry) -> Result<Self, RegistryError> {
        Ok(NoiseTerrain {
            palette: TerrainPalette {
                stone: registry.require("stone")?,
                dirt: registry.require("dirt")?,
                grass: registry.require("grass")?,
                sand: registry.require("sand")?,
                water: registry.require("water")?,
                snow: registry.require("snow")?,
                wood: registry.require("wood")?,
                leaves: registry.require("leaves")?,
            },
            sea_level: 4,
            base_height: 8,
            amplitude: 14.0,
            snow_line: 18,
        })
    }

    fn surface_height(&self, perlin: &Perlin, x: i32, z: i32) -> i32 {
        let nx = x as f64 * HEIGHT_SCALE_FACTOR;
        let nz = z as f64 * HEIGHT_SCALE_FACTOR;
        let sample = perlin.get([nx, nz]) + 0.5 * perlin.get([nx * 2.0, nz * 2.0]);
        self.base_height + (sample * self.amplitude / 1.5).round() as i32
    }

    fn has_tree(seed: u32, x: i32, z: i32) -> bool {
        let column = ((x as u32 as u64) << 32 | z as u32 as u64) ^ ((seed as u64) << 17);
        fastrand::Rng::with_seed(column).u32(..100) < TREE_CHANCE_PERCENT
    }

    fn block_at(&self, perlin: &Perlin, seed: u32, surface: i32, x: i32, y: i32, z: i32) -> BlockTypeSize {
        let palette = &self.palette;
        if y > surface {
            if y <= self.sea_level {
                return palette.water;
            }
            let grows_tree = surface > self.sea_level + 1
                && surface < self.snow_line
                && Self::has_tree(seed, x, z);
            if grows_tree {
                let above = y - surface;
                if above <= TRUNK_HEIGHT {
                    return palette.wood;
                }
                if above == TRUNK_HEIGHT + 1 {
                    return palette.leaves;
                }
            }
            return 0;
        }

        if y < surface - 4 {
            let cave = perlin.get([
                x as f64 * CAVE_SCALE_FACTOR,
                y as f64 * CAVE_SCALE_FACTOR,
                z as f64 * CAVE_SCALE_FACTOR,
            ]);
            return if cave > CAVE_THRESHOLD { 0 } else { palette.stone };
        }

        let beach = surface <= self.sea_level + 1;
        if y == surface {
            if beach {
                palette.sand
            } else if surface >= self.snow_line {
                palette.snow
            } else {
                palette.grass
            }
        } else if y >= surface - 3 {
            if beach {
                palette.sand
            } else {
                palette.dirt
            }
        } else {
            palette.stone
        }
    }
}

impl TerrainGenerator for NoiseTerrain {
    fn generate(&self, request: &TerrainRequest) -> Result<TerrainGrid, GenerationError> {
        let perlin = Perlin::new(request.seed);
        let dims = request.dimensions();
        let mut grid = TerrainGrid::new(dims);

        for z in 0..dims.edge {
            for x in 0..dims.edge {
                let (world_x, _, world_z) = request.world_block(x, 0, z);
                let surface = self.surface_height(&perlin, world_x, world_z);
                for y in 0..dims.height {
                    let (_, world_y, _) = request.world_block(x, y, z);
                    let code = self.block_at(&perlin, request.seed, surface, world_x, world_y, world_z);
                    grid.set(x, y, z, code);
                }
            }
        }
        Ok(grid)
    }
}
