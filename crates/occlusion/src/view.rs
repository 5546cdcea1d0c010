use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::bounds::{BoxSphereBounds, Plane};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PrimitiveId(pub u64);

/// Per-frame view parameters consumed by the occlusion update.
#[derive(Debug, Clone, PartialEq)]
pub struct OcclusionView {
    pub origin: Vec3,
    /// Points in front of the camera have a negative signed distance.
    pub near_clipping_plane: Option<Plane>,
    pub near_clipping_distance: f32,
    /// Offset from world space to the translated space used for drawing.
    pub pre_view_translation: Vec3,
    pub size_x: u32,
    pub size_y: u32,
    pub ignore_existing_queries: bool,
    pub disable_query_submissions: bool,
    pub wireframe: bool,
}

impl OcclusionView {
    pub fn perspective(
        origin: Vec3,
        forward: Vec3,
        near_clipping_distance: f32,
        size_x: u32,
        size_y: u32,
    ) -> Self {
        let forward = forward.normalize_or_zero();
        Self {
            origin,
            near_clipping_plane: Some(Plane::from_point_normal(
                origin + forward * near_clipping_distance,
                -forward,
            )),
            near_clipping_distance,
            pre_view_translation: -origin,
            size_x,
            size_y,
            ignore_existing_queries: false,
            disable_query_submissions: false,
            wireframe: false,
        }
    }

    pub fn pixel_area(&self) -> f32 {
        (self.size_x as f32 * self.size_y as f32).max(1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrimitiveOcclusionInput {
    pub id: PrimitiveId,
    pub bounds: BoxSphereBounds,
    /// Non-occludable primitives are always definitely unoccluded.
    pub occludable: bool,
    /// Allows grouped and probabilistic queries instead of a query every frame.
    pub allow_approximate_occlusion: bool,
    pub ignore_near_plane_intersection: bool,
    pub first_frame_occlusion: bool,
}

impl PrimitiveOcclusionInput {
    pub fn new(id: PrimitiveId, bounds: BoxSphereBounds) -> Self {
        Self {
            id,
            bounds,
            occludable: true,
            allow_approximate_occlusion: true,
            ignore_near_plane_intersection: false,
            first_frame_occlusion: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueryKind {
    Individual,
    Grouped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OcclusionDecision {
    pub occluded: bool,
    pub definitely_unoccluded: bool,
    pub scheduled_query: Option<QueryKind>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OcclusionHistoryState {
    NoHistory,
    Unqueried,
    QueryPending,
    ResultKnown,
}
