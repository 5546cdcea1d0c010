//! Per-view occlusion history and query scheduling.

use std::collections::HashMap;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::batcher::{QueryBatch, QueryBatcher};
use crate::bounds::{BoxSphereBounds, HALF_WORLD_MAX};
use crate::config::{OcclusionConfig, OcclusionConfigError};
use crate::device::OcclusionDevice;
use crate::query_pool::{OcclusionQueryHandle, OcclusionQueryPool, OcclusionQueryPoolStats};
use crate::shadow::{ShadowKey, ShadowOcclusionCandidate, ShadowOcclusionQueries};
use crate::view::{
    OcclusionDecision, OcclusionHistoryState, OcclusionView, PrimitiveId, PrimitiveOcclusionInput,
    QueryKind,
};

pub struct PrimitiveOcclusionRecord<Q> {
    pending_query: Option<OcclusionQueryHandle<Q>>,
    last_visible_time: f64,
    last_considered_time: f64,
    last_coverage_fraction: f32,
    is_grouped_query: bool,
    result_known: bool,
    occluded: bool,
    definitely_unoccluded: bool,
}

impl<Q> PrimitiveOcclusionRecord<Q> {
    fn new() -> Self {
        Self {
            pending_query: None,
            last_visible_time: 0.0,
            last_considered_time: 0.0,
            last_coverage_fraction: 0.0,
            is_grouped_query: false,
            result_known: false,
            occluded: false,
            definitely_unoccluded: false,
        }
    }

    pub fn pending_query(&self) -> Option<&OcclusionQueryHandle<Q>> {
        self.pending_query.as_ref()
    }

    pub fn last_visible_time(&self) -> f64 {
        self.last_visible_time
    }

    pub fn last_considered_time(&self) -> f64 {
        self.last_considered_time
    }

    pub fn last_coverage_fraction(&self) -> f32 {
        self.last_coverage_fraction
    }

    pub fn is_grouped_query(&self) -> bool {
        self.is_grouped_query
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OcclusionTestReport {
    pub evicted_records: usize,
    pub individual_queries: usize,
    pub grouped_queries: usize,
    pub shadow_queries: usize,
}

/// Occlusion state owned by one view. Lives on the render thread.
pub struct ViewOcclusionState<Q> {
    config: OcclusionConfig,
    records: HashMap<PrimitiveId, PrimitiveOcclusionRecord<Q>>,
    pool: OcclusionQueryPool<Q>,
    individual_queries: QueryBatcher<Q>,
    grouped_queries: QueryBatcher<Q>,
    shadow_queries: ShadowOcclusionQueries<Q>,
    requery_random: ChaCha8Rng,
}

impl<Q> ViewOcclusionState<Q> {
    pub fn new(config: OcclusionConfig) -> Result<Self, OcclusionConfigError> {
        config.validate()?;
        Ok(Self {
            records: HashMap::new(),
            pool: OcclusionQueryPool::new(),
            individual_queries: QueryBatcher::new(config.individual_batch_size),
            grouped_queries: QueryBatcher::new(config.grouped_batch_size),
            shadow_queries: ShadowOcclusionQueries::default(),
            requery_random: ChaCha8Rng::seed_from_u64(config.random_seed),
            config,
        })
    }

    pub fn config(&self) -> &OcclusionConfig {
        &self.config
    }

    /// Decides whether `input` is occluded this frame from last frame's
    /// query result or its history, then schedules the next query.
    pub fn update_primitive_occlusion<D>(
        &mut self,
        device: &mut D,
        view: &OcclusionView,
        input: &PrimitiveOcclusionInput,
        now: f64,
    ) -> OcclusionDecision
    where
        D: OcclusionDevice<Query = Q>,
    {
        let Self {
            config,
            records,
            pool,
            individual_queries,
            grouped_queries,
            requery_random,
            ..
        } = self;
        let occludable = input.occludable;
        let mut is_new_record = false;
        let record = records.entry(input.id).or_insert_with(|| {
            is_new_record = true;
            PrimitiveOcclusionRecord::new()
        });

        let mut occluded = false;
        let mut definite = false;
        if is_new_record {
            // Unknown primitives render this frame so they can occlude others
            // and get a real result.
            definite = !occludable;
        } else {
            if view.ignore_existing_queries {
                definite = view.disable_query_submissions;
            } else if occludable {
                if let Some(pending_query) = &record.pending_query {
                    match device.query_result(pending_query.query(), true) {
                        Ok(visible_samples) => {
                            occluded = visible_samples == 0;
                            record.last_coverage_fraction =
                                visible_samples as f32 / view.pixel_area();
                            definite = !record.is_grouped_query;
                            record.result_known = true;
                        }
                        Err(error) => {
                            log::warn!("{error} for primitive {:?}, assuming visible", input.id);
                        }
                    }
                } else {
                    occluded = record.last_visible_time + config.primitive_probably_visible_time
                        < now;
                    record.last_coverage_fraction = if occluded || input.first_frame_occlusion {
                        0.0
                    } else {
                        config.max_occlusion_pixels_fraction
                    };
                    // No query was scheduled, so last frame's state was definite.
                    definite = true;
                }
            } else {
                definite = true;
            }
            pool.release_slot(device, &mut record.pending_query);
        }
        record.last_considered_time = now;

        let mut scheduled_query = None;
        if !view.disable_query_submissions && occludable {
            let occlusion_bounds = input.bounds.occlusion_bounds();
            if query_allowed(view, input, &occlusion_bounds) {
                let query_kind = if !input.allow_approximate_occlusion {
                    Some(QueryKind::Individual)
                } else if occluded {
                    Some(QueryKind::Grouped)
                } else if definite {
                    let max_fraction = config.max_occlusion_pixels_fraction;
                    let fraction_multiplier =
                        (record.last_coverage_fraction / max_fraction).max(1.0);
                    let draw: f32 = requery_random.gen_range(0.0..1.0);
                    (fraction_multiplier * draw < max_fraction).then_some(QueryKind::Individual)
                } else {
                    Some(QueryKind::Individual)
                };
                record.is_grouped_query = query_kind == Some(QueryKind::Grouped);

                if let Some(query_kind) = query_kind {
                    if !view.wireframe {
                        let translated_bounds =
                            occlusion_bounds.translated(view.pre_view_translation);
                        let batcher = match query_kind {
                            QueryKind::Individual => &mut *individual_queries,
                            QueryKind::Grouped => &mut *grouped_queries,
                        };
                        match batcher.batch_primitive(device, pool, &translated_bounds) {
                            Ok(handle) => {
                                record.pending_query = Some(handle);
                                scheduled_query = Some(query_kind);
                            }
                            Err(error) => {
                                log::warn!(
                                    "no occlusion query for primitive {:?}: {error}",
                                    input.id
                                );
                            }
                        }
                    }
                }
            } else {
                occluded = false;
                definite = true;
            }
        }

        let definitely_unoccluded = definite && !occluded;
        if definitely_unoccluded {
            record.last_visible_time = now;
        }
        record.occluded = occluded;
        record.definitely_unoccluded = definitely_unoccluded;

        OcclusionDecision {
            occluded,
            definitely_unoccluded,
            scheduled_query,
        }
    }

    /// Releases queries of records not considered since `min_query_time` and
    /// evicts records not considered since `min_history_time`.
    pub fn trim_history<D>(
        &mut self,
        device: &mut D,
        min_history_time: f64,
        min_query_time: f64,
    ) -> usize
    where
        D: OcclusionDevice<Query = Q>,
    {
        let pool = &mut self.pool;
        let records_before = self.records.len();
        self.records.retain(|_, record| {
            let evict = record.last_considered_time < min_history_time;
            if evict || record.last_considered_time < min_query_time {
                pool.release_slot(device, &mut record.pending_query);
            }
            !evict
        });
        let evicted = records_before - self.records.len();
        if evicted > 0 {
            log::debug!("evicted {evicted} stale occlusion records");
        }
        evicted
    }

    /// Trims history, reissues shadow queries and flushes this frame's batches.
    pub fn begin_occlusion_tests<D>(
        &mut self,
        device: &mut D,
        view: &OcclusionView,
        now: f64,
        shadow_candidates: &[ShadowOcclusionCandidate],
    ) -> OcclusionTestReport
    where
        D: OcclusionDevice<Query = Q>,
    {
        if view.disable_query_submissions {
            return OcclusionTestReport::default();
        }

        let evicted_records = self.trim_history(
            device,
            now - self.config.primitive_probably_visible_time,
            now,
        );
        let shadow_queries = self
            .shadow_queries
            .issue(device, &mut self.pool, view, shadow_candidates);
        let individual_queries = self.individual_queries.flush(device, &mut self.pool);
        let grouped_queries = self.grouped_queries.flush(device, &mut self.pool);

        let report = OcclusionTestReport {
            evicted_records,
            individual_queries,
            grouped_queries,
            shadow_queries,
        };
        log::debug!("occlusion tests at {now:.3}s: {report:?}");
        report
    }

    pub fn is_shadow_occluded<D>(&self, device: &mut D, key: ShadowKey) -> bool
    where
        D: OcclusionDevice<Query = Q>,
    {
        self.shadow_queries.is_shadow_occluded(device, key)
    }

    pub fn is_occluded(&self, id: PrimitiveId) -> bool {
        self.records.get(&id).is_some_and(|record| record.occluded)
    }

    pub fn is_definitely_unoccluded(&self, id: PrimitiveId) -> bool {
        self.records
            .get(&id)
            .is_some_and(|record| record.definitely_unoccluded)
    }

    pub fn last_coverage_fraction(&self, id: PrimitiveId) -> Option<f32> {
        self.records
            .get(&id)
            .map(|record| record.last_coverage_fraction)
    }

    pub fn history_state(&self, id: PrimitiveId) -> OcclusionHistoryState {
        match self.records.get(&id) {
            None => OcclusionHistoryState::NoHistory,
            Some(record) if record.pending_query.is_some() => OcclusionHistoryState::QueryPending,
            Some(record) if record.result_known => OcclusionHistoryState::ResultKnown,
            Some(_) => OcclusionHistoryState::Unqueried,
        }
    }

    pub fn record(&self, id: PrimitiveId) -> Option<&PrimitiveOcclusionRecord<Q>> {
        self.records.get(&id)
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn pool_stats(&self) -> OcclusionQueryPoolStats {
        self.pool.stats()
    }

    pub fn individual_batches(&self) -> &[QueryBatch<Q>] {
        self.individual_queries.sealed_batches()
    }

    pub fn grouped_batches(&self) -> &[QueryBatch<Q>] {
        self.grouped_queries.sealed_batches()
    }

    /// Returns every query to the pool and forgets all history.
    pub fn release_all<D>(&mut self, device: &mut D)
    where
        D: OcclusionDevice<Query = Q>,
    {
        self.individual_queries.flush(device, &mut self.pool);
        self.grouped_queries.flush(device, &mut self.pool);
        self.shadow_queries.release_all(device, &mut self.pool);
        for (_, mut record) in self.records.drain() {
            self.pool.release_slot(device, &mut record.pending_query);
        }
    }
}

fn query_allowed(
    view: &OcclusionView,
    input: &PrimitiveOcclusionInput,
    occlusion_bounds: &BoxSphereBounds,
) -> bool {
    match view.near_clipping_plane {
        Some(near_plane) => {
            if input.ignore_near_plane_intersection {
                // Queries are single-sided, so a camera inside the box would see nothing.
                !occlusion_bounds.contains_point(view.origin)
            } else {
                near_plane.signed_distance(occlusion_bounds.origin)
                    < -near_plane.box_push_out(occlusion_bounds.box_extent)
            }
        }
        None => occlusion_bounds.sphere_radius < HALF_WORLD_MAX,
    }
}
