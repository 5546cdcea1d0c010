use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::bounds::OcclusionBox;
use crate::device::OcclusionDevice;
use crate::query_pool::{OcclusionQueryHandle, OcclusionQueryPool};
use crate::view::{OcclusionView, PrimitiveId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LightId(pub u64);

/// A projected shadow, identified by the casting primitive and the light.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShadowKey {
    pub primitive: PrimitiveId,
    pub light: LightId,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowOcclusionCandidate {
    pub key: ShadowKey,
    /// World-space box enclosing the shadow volume.
    pub shadow_bounds: OcclusionBox,
    pub subjects_visible: bool,
    pub preshadow: bool,
}

pub struct ShadowOcclusionQueries<Q> {
    queries: HashMap<ShadowKey, OcclusionQueryHandle<Q>>,
}

impl<Q> Default for ShadowOcclusionQueries<Q> {
    fn default() -> Self {
        Self {
            queries: HashMap::new(),
        }
    }
}

impl<Q> ShadowOcclusionQueries<Q> {
    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    /// Reads last frame's query for `key`. Unqueried or unreadable shadows
    /// are not occluded.
    pub fn is_shadow_occluded<D>(&self, device: &mut D, key: ShadowKey) -> bool
    where
        D: OcclusionDevice<Query = Q>,
    {
        match self.queries.get(&key) {
            Some(handle) => matches!(device.query_result(handle.query(), true), Ok(0)),
            None => false,
        }
    }

    pub(crate) fn release_all<D>(&mut self, device: &mut D, pool: &mut OcclusionQueryPool<Q>)
    where
        D: OcclusionDevice<Query = Q>,
    {
        for (_, handle) in self.queries.drain() {
            pool.release(device, handle);
        }
    }

    /// Returns last frame's queries to the pool and issues this frame's.
    pub(crate) fn issue<D>(
        &mut self,
        device: &mut D,
        pool: &mut OcclusionQueryPool<Q>,
        view: &OcclusionView,
        candidates: &[ShadowOcclusionCandidate],
    ) -> usize
    where
        D: OcclusionDevice<Query = Q>,
    {
        self.release_all(device, pool);

        for candidate in candidates {
            // Preshadows are culled with their subject, and a visible subject
            // makes the shadow visible anyway.
            if candidate.subjects_visible || candidate.preshadow {
                continue;
            }
            if shadow_reaches_near_plane(view, &candidate.shadow_bounds) {
                continue;
            }
            let handle = match pool.allocate(device) {
                Ok(handle) => handle,
                Err(error) => {
                    log::warn!("skipping shadow occlusion query {:?}: {error}", candidate.key);
                    continue;
                }
            };
            let translated = OcclusionBox {
                origin: candidate.shadow_bounds.origin + view.pre_view_translation,
                extent: candidate.shadow_bounds.extent,
            };
            device.begin_query(handle.query());
            device.draw_bounding_boxes(std::slice::from_ref(&translated));
            device.end_query(handle.query());
            if let Some(replaced) = self.queries.insert(candidate.key, handle) {
                pool.release(device, replaced);
            }
        }
        self.queries.len()
    }
}

fn shadow_reaches_near_plane(view: &OcclusionView, shadow_bounds: &OcclusionBox) -> bool {
    let radius = view.near_clipping_distance * 3.0_f32.sqrt();
    let closest = view.origin.clamp(shadow_bounds.min(), shadow_bounds.max());
    closest.distance_squared(view.origin) <= radius * radius
}
