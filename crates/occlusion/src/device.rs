use thiserror::Error;

use crate::bounds::OcclusionBox;

/// A query result that the device cannot provide. Callers treat the
/// primitive as visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("occlusion query result is unavailable")]
pub struct QueryUnavailable;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to create occlusion query: {reason}")]
pub struct QueryCreateError {
    pub reason: String,
}

/// Graphics device operations needed to run occlusion queries.
pub trait OcclusionDevice {
    type Query: Send + Sync + 'static;

    fn create_query(&mut self) -> Result<Self::Query, QueryCreateError>;

    /// Tells the device the pending result of `query` is no longer needed.
    fn reset_query(&mut self, query: &Self::Query);

    fn begin_query(&mut self, query: &Self::Query);

    fn end_query(&mut self, query: &Self::Query);

    /// Number of samples that passed the depth test while `query` was active.
    fn query_result(&mut self, query: &Self::Query, wait: bool) -> Result<u64, QueryUnavailable>;

    fn draw_bounding_boxes(&mut self, boxes: &[OcclusionBox]);
}
