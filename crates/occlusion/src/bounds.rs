//! Bounding volumes and planes used by the occlusion tests.

use glam::Vec3;

/// Primitives without a near plane are only queried below this radius.
pub const HALF_WORLD_MAX: f32 = 262_144.0;

const OCCLUSION_BOUNDS_OFFSET: f32 = 1.0;
const OCCLUSION_BOUNDS_SCALE: f32 = 1.1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxSphereBounds {
    pub origin: Vec3,
    pub box_extent: Vec3,
    pub sphere_radius: f32,
}

impl BoxSphereBounds {
    pub fn new(origin: Vec3, box_extent: Vec3, sphere_radius: f32) -> Self {
        Self {
            origin,
            box_extent,
            sphere_radius,
        }
    }

    pub fn from_box(origin: Vec3, box_extent: Vec3) -> Self {
        Self::new(origin, box_extent, box_extent.length())
    }

    /// Enlarges the bounds so the primitive cannot occlude its own query box.
    pub fn occlusion_bounds(&self) -> Self {
        let scaled_offset = OCCLUSION_BOUNDS_OFFSET * OCCLUSION_BOUNDS_SCALE;
        Self {
            origin: self.origin,
            box_extent: self.box_extent * OCCLUSION_BOUNDS_SCALE + Vec3::splat(scaled_offset),
            sphere_radius: self.sphere_radius * OCCLUSION_BOUNDS_SCALE + scaled_offset,
        }
    }

    pub fn translated(&self, offset: Vec3) -> Self {
        Self {
            origin: self.origin + offset,
            ..*self
        }
    }

    pub fn min(&self) -> Vec3 {
        self.origin - self.box_extent
    }

    pub fn max(&self) -> Vec3 {
        self.origin + self.box_extent
    }

    /// Strict containment, points on the faces are outside.
    pub fn contains_point(&self, point: Vec3) -> bool {
        point.cmpgt(self.min()).all() && point.cmplt(self.max()).all()
    }

    pub fn to_box(&self) -> OcclusionBox {
        OcclusionBox {
            origin: self.origin,
            extent: self.box_extent,
        }
    }
}

/// Plane `normal . p = w`. Points with a negative signed distance are behind it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub normal: Vec3,
    pub w: f32,
}

impl Plane {
    pub fn new(normal: Vec3, w: f32) -> Self {
        Self { normal, w }
    }

    pub fn from_point_normal(point: Vec3, normal: Vec3) -> Self {
        Self {
            normal,
            w: normal.dot(point),
        }
    }

    pub fn signed_distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) - self.w
    }

    /// How far a box with `extent` reaches from its center along the normal.
    pub fn box_push_out(&self, extent: Vec3) -> f32 {
        (self.normal * extent).abs().element_sum()
    }
}

/// Axis-aligned box drawn under an occlusion query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OcclusionBox {
    pub origin: Vec3,
    pub extent: Vec3,
}

impl OcclusionBox {
    pub fn min(&self) -> Vec3 {
        self.origin - self.extent
    }

    pub fn max(&self) -> Vec3 {
        self.origin + self.extent
    }
}
