//! Frustum culling boundary.

use cgmath::Point3;

use crate::engine_state::voxels::chunk::position::BoundingBox;

/// Decides whether a bounding box intersects the current view volume.
pub trait FrustumCuller {
    /// Whether `bounds` is at least partly visible.
    fn is_visible(&self, bounds: &BoundingBox) -> bool;
}

impl<F> FrustumCuller for F
where
    F: Fn(&BoundingBox) -> bool,
{
    fn is_visible(&self, bounds: &BoundingBox) -> bool {
        self(bounds)
    }
}

/// Accepts everything.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoCulling;

impl FrustumCuller for NoCulling {
    fn is_visible(&self, _bounds: &BoundingBox) -> bool {
        true
    }
}

/// Accepts boxes intersecting a fixed axis-aligned region.
///
/// A coarse stand-in for a camera frustum, useful for tools and tests.
#[derive(Copy, Clone, Debug)]
pub struct BoxCuller {
    /// The visible region.
    pub region: BoundingBox,
}

impl BoxCuller {
    /// Creates a culler for the region between two corners.
    pub fn new(min: Point3<f32>, max: Point3<f32>) -> Self {
        BoxCuller {
            region: BoundingBox::new(min, max),
        }
    }
}

impl FrustumCuller for BoxCuller {
    fn is_visible(&self, bounds: &BoundingBox) -> bool {
        self.region.intersects(bounds)
    }
}
