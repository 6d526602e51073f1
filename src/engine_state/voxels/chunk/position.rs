//! # Chunk Position Module
//!
//! Chunk-grid coordinates and the world-space bounding volumes derived from them.
//!
//! World space is measured in blocks: a chunk at grid position `(cx, cy, cz)` covers
//! `[cx * edge, (cx + 1) * edge) × [cy * height, (cy + 1) * height) × [cz * edge, (cz + 1) * edge)`.
//! Negative coordinates round towards negative infinity, so the block at world `x = -1`
//! belongs to chunk `-1`, not chunk `0`.
//!
//! Grid and block arithmetic saturates at the `i32` range, so observers at the far edge
//! of `f32` world space pin to the outermost chunks instead of wrapping around.

use std::fmt;

use cgmath::{Point3, Vector3};

use crate::config::ChunkDimensions;

/// Identifies a chunk in chunk-grid space.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ChunkPosition {
    /// Grid X.
    pub x: i32,
    /// Grid Y.
    pub y: i32,
    /// Grid Z.
    pub z: i32,
}

impl ChunkPosition {
    /// Creates a chunk position from grid coordinates.
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        ChunkPosition { x, y, z }
    }

    /// The chunk containing a world-space point.
    ///
    /// Points beyond the `i32` grid range saturate to the outermost chunk; NaN maps to 0.
    ///
    /// # Arguments
    /// * `point` - A position in world units (blocks)
    /// * `dims` - Chunk dimensions of the world
    pub fn from_world(point: Point3<f32>, dims: ChunkDimensions) -> Self {
        let edge = dims.edge as f32;
        let height = dims.height as f32;
        ChunkPosition {
            x: (point.x / edge).floor() as i32,
            y: (point.y / height).floor() as i32,
            z: (point.z / edge).floor() as i32,
        }
    }

    /// The chunk containing an integer block position.
    pub fn from_block(block: Point3<i32>, dims: ChunkDimensions) -> Self {
        let edge = dims.edge as i32;
        let height = dims.height as i32;
        ChunkPosition {
            x: block.x.div_euclid(edge),
            y: block.y.div_euclid(height),
            z: block.z.div_euclid(edge),
        }
    }

    /// World-space origin corner (minimum x, y and z) of this chunk.
    pub fn to_world(self, dims: ChunkDimensions) -> Point3<f32> {
        let origin = self.origin_block(dims);
        Point3::new(origin.x as f32, origin.y as f32, origin.z as f32)
    }

    /// Integer block coordinates of this chunk's origin corner.
    pub fn origin_block(self, dims: ChunkDimensions) -> Point3<i32> {
        Point3::new(
            self.x.saturating_mul(dims.edge as i32),
            self.y.saturating_mul(dims.height as i32),
            self.z.saturating_mul(dims.edge as i32),
        )
    }

    /// Converts a world block position into local coordinates of the chunk owning it.
    pub fn local_of(block: Point3<i32>, dims: ChunkDimensions) -> Point3<i32> {
        let edge = dims.edge as i32;
        let height = dims.height as i32;
        Point3::new(
            block.x.rem_euclid(edge),
            block.y.rem_euclid(height),
            block.z.rem_euclid(edge),
        )
    }

    /// The neighboring chunk position displaced by `offset` grid cells.
    pub fn offset(self, offset: Vector3<i32>) -> Self {
        ChunkPosition::new(
            self.x.saturating_add(offset.x),
            self.y.saturating_add(offset.y),
            self.z.saturating_add(offset.z),
        )
    }

    /// Squared Euclidean distance in chunk units.
    pub fn distance_squared(self, other: ChunkPosition) -> i64 {
        let dx = self.x as i64 - other.x as i64;
        let dy = self.y as i64 - other.y as i64;
        let dz = self.z as i64 - other.z as i64;
        dx.saturating_mul(dx)
            .saturating_add(dy.saturating_mul(dy))
            .saturating_add(dz.saturating_mul(dz))
    }

    /// Euclidean distance in chunk units.
    pub fn distance_to(self, other: ChunkPosition) -> f32 {
        (self.distance_squared(other) as f32).sqrt()
    }

    /// Whether `other` lies within `radius` chunks, inclusive.
    pub fn within_radius(self, other: ChunkPosition, radius: i32) -> bool {
        let radius = radius as i64;
        self.distance_squared(other) <= radius * radius
    }

    /// The world-space box covered by this chunk.
    pub fn bounds(self, dims: ChunkDimensions) -> BoundingBox {
        let min = self.to_world(dims);
        BoundingBox {
            min,
            max: Point3::new(
                min.x + dims.edge as f32,
                min.y + dims.height as f32,
                min.z + dims.edge as f32,
            ),
        }
    }
}

impl From<Point3<i32>> for ChunkPosition {
    fn from(point: Point3<i32>) -> Self {
        ChunkPosition::new(point.x, point.y, point.z)
    }
}

impl fmt::Display for ChunkPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// An axis-aligned box in world units.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BoundingBox {
    /// Minimum corner.
    pub min: Point3<f32>,
    /// Maximum corner.
    pub max: Point3<f32>,
}

impl BoundingBox {
    /// Creates a box from its two corners.
    pub fn new(min: Point3<f32>, max: Point3<f32>) -> Self {
        BoundingBox { min, max }
    }

    /// Whether the two boxes overlap. Touching faces do not count as overlap.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min.x < other.max.x
            && self.max.x > other.min.x
            && self.min.y < other.max.y
            && self.max.y > other.min.y
            && self.min.z < other.max.z
            && self.max.z > other.min.z
    }

    /// Whether a point lies inside the half-open box `[min, max)`.
    pub fn contains_point(&self, point: Point3<f32>) -> bool {
        (self.min.x..self.max.x).contains(&point.x)
            && (self.min.y..self.max.y).contains(&point.y)
            && (self.min.z..self.max.z).contains(&point.z)
    }

    /// Centre of the box.
    pub fn center(&self) -> Point3<f32> {
        Point3::new(
            (self.min.x + self.max.x) * 0.5,
            (self.min.y + self.max.y) * 0.5,
            (self.min.z + self.max.z) * 0.5,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIMS: ChunkDimensions = ChunkDimensions::new(16, 32);

    #[test]
    fn world_round_trip_lands_on_origin() {
        for point in [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(15.99, 31.5, 0.5),
            Point3::new(16.0, 32.0, 16.0),
            Point3::new(-0.01, -1.0, -16.0),
            Point3::new(-16.5, 64.0, 47.9),
        ] {
            let chunk = ChunkPosition::from_world(point, DIMS);
            let bounds = chunk.bounds(DIMS);
            assert_eq!(bounds.min, chunk.to_world(DIMS));
            assert!(bounds.contains_point(point), "{point:?} not in {bounds:?}");
        }
    }

    #[test]
    fn exact_multiples_start_a_new_chunk() {
        assert_eq!(
            ChunkPosition::from_world(Point3::new(16.0, 32.0, -16.0), DIMS),
            ChunkPosition::new(1, 1, -1)
        );
        assert_eq!(
            ChunkPosition::from_block(Point3::new(-1, -1, 16), DIMS),
            ChunkPosition::new(-1, -1, 1)
        );
        assert_eq!(
            ChunkPosition::local_of(Point3::new(-1, -1, 16), DIMS),
            Point3::new(15, 31, 0)
        );
    }

    #[test]
    fn far_positions_saturate() {
        let far = ChunkPosition::from_world(Point3::new(4.0e10, -4.0e10, f32::NAN), DIMS);
        assert_eq!(far, ChunkPosition::new(i32::MAX, i32::MIN, 0));
        assert_eq!(far.origin_block(DIMS), Point3::new(i32::MAX, i32::MIN, 0));
        assert_eq!(far.offset(Vector3::new(1, -1, 0)), far);
        assert_eq!(
            far.distance_squared(ChunkPosition::new(i32::MIN, i32::MIN, 0)),
            i64::MAX
        );
        assert!(!far.within_radius(ChunkPosition::default(), i32::MAX));
    }

    #[test]
    fn radius_is_euclidean() {
        let origin = ChunkPosition::default();
        assert!(origin.within_radius(ChunkPosition::new(2, 0, 0), 2));
        assert!(origin.within_radius(ChunkPosition::new(1, 1, 1), 2));
        assert!(!origin.within_radius(ChunkPosition::new(2, 2, 0), 2));
        assert!((origin.distance_to(ChunkPosition::new(3, 4, 0)) - 5.0).abs() < f32::EPSILON);
    }

    #[test]
    fn touching_boxes_do_not_intersect() {
        let a = ChunkPosition::new(0, 0, 0).bounds(DIMS);
        let b = ChunkPosition::new(1, 0, 0).bounds(DIMS);
        assert!(!a.intersects(&b));
        let straddling = BoundingBox::new(Point3::new(15.0, 0.0, 0.0), Point3::new(17.0, 1.0, 1.0));
        assert!(a.intersects(&straddling));
        assert!(b.intersects(&straddling));
    }
}
