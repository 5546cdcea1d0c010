use std::sync::Arc;

use occlusion::{OcclusionTestReport, PrimitiveId, ShadowKey};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PrimitiveVisibility {
    pub id: PrimitiveId,
    pub occluded: bool,
    pub definitely_unoccluded: bool,
    pub coverage_fraction: f32,
}

/// Visibility published by the render thread after one occlusion frame.
/// Entries are sorted by primitive id.
#[derive(Debug, Clone, PartialEq)]
pub struct VisibilitySnapshot {
    pub frame: u64,
    pub time: f64,
    pub primitives: Arc<[PrimitiveVisibility]>,
    pub occluded_shadows: Arc<[ShadowKey]>,
    pub report: OcclusionTestReport,
}

impl VisibilitySnapshot {
    pub(crate) fn new(
        frame: u64,
        time: f64,
        mut primitives: Vec<PrimitiveVisibility>,
        mut occluded_shadows: Vec<ShadowKey>,
        report: OcclusionTestReport,
    ) -> Self {
        primitives.sort_unstable_by_key(|entry| entry.id);
        occluded_shadows.sort_unstable();
        Self {
            frame,
            time,
            primitives: primitives.into(),
            occluded_shadows: occluded_shadows.into(),
            report,
        }
    }

    pub fn primitive(&self, id: PrimitiveId) -> Option<&PrimitiveVisibility> {
        self.primitives
            .binary_search_by_key(&id, |entry| entry.id)
            .ok()
            .map(|index| &self.primitives[index])
    }

    /// Primitives missing from the snapshot count as visible.
    pub fn is_occluded(&self, id: PrimitiveId) -> bool {
        self.primitive(id).is_some_and(|entry| entry.occluded)
    }

    pub fn is_shadow_occluded(&self, key: ShadowKey) -> bool {
        self.occluded_shadows.binary_search(&key).is_ok()
    }

    pub fn occluded_count(&self) -> usize {
        self.primitives.iter().filter(|entry| entry.occluded).count()
    }

    pub fn visible_count(&self) -> usize {
        self.primitives.len() - self.occluded_count()
    }
}
