//! Occlusion culling driven by hardware occlusion queries.
//!
//! Each view keeps a history record per primitive. A frame reads last frame's
//! query results (`ViewOcclusionState::update_primitive_occlusion`) and batches
//! new query boxes, which are drawn at `ViewOcclusionState::begin_occlusion_tests`.
//! Query objects come from a pool and are shared between a batch and the
//! records it covers, so a query is recycled only after its last holder lets go.

mod batcher;
mod bounds;
mod config;
mod device;
mod query_pool;
mod shadow;
mod view;
mod view_state;

#[cfg(test)]
mod test_device;

pub use batcher::{QueryBatch, QueryBatcher};
pub use bounds::{BoxSphereBounds, HALF_WORLD_MAX, OcclusionBox, Plane};
pub use config::{OcclusionConfig, OcclusionConfigError};
pub use device::{OcclusionDevice, QueryCreateError, QueryUnavailable};
pub use glam::Vec3;
pub use query_pool::{OcclusionQueryHandle, OcclusionQueryPool, OcclusionQueryPoolStats};
pub use shadow::{LightId, ShadowKey, ShadowOcclusionCandidate, ShadowOcclusionQueries};
pub use view::{
    OcclusionDecision, OcclusionHistoryState, OcclusionView, PrimitiveId, PrimitiveOcclusionInput,
    QueryKind,
};
pub use view_state::{OcclusionTestReport, PrimitiveOcclusionRecord, ViewOcclusionState};
