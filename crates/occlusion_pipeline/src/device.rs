//! Software occlusion device that ray-casts query boxes against occluder walls.

use glam::Vec3;
use occlusion::{
    OcclusionBox, OcclusionDevice, OcclusionView, QueryCreateError, QueryUnavailable,
};
use slotmap::SlotMap;

slotmap::new_key_type! {
    pub struct HeadlessQuery;
}

/// Device owned by the render thread for the lifetime of a pipeline.
pub trait SceneDevice: OcclusionDevice + Send + 'static {
    /// Called before a view's primitives are updated for a frame.
    fn begin_view(&mut self, _view: &OcclusionView) {}
}

/// World-space axis-aligned box that blocks visibility.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Occluder {
    pub min: Vec3,
    pub max: Vec3,
}

impl Occluder {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self {
            min: min.min(max),
            max: min.max(max),
        }
    }

    /// Whether the segment from `start` to `end` passes through the box.
    pub fn blocks_segment(&self, start: Vec3, end: Vec3) -> bool {
        let direction = end - start;
        let mut enter = 0.0_f32;
        let mut exit = 1.0_f32;
        for axis in 0..3 {
            let origin = start[axis];
            let delta = direction[axis];
            if delta.abs() <= f32::EPSILON {
                if origin < self.min[axis] || origin > self.max[axis] {
                    return false;
                }
                continue;
            }
            let t0 = (self.min[axis] - origin) / delta;
            let t1 = (self.max[axis] - origin) / delta;
            enter = enter.max(t0.min(t1));
            exit = exit.min(t0.max(t1));
            if enter > exit {
                return false;
            }
        }
        // Points on the far face are behind the wall, not inside it.
        enter < 1.0
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct QuerySlot {
    samples: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeadlessDeviceStats {
    pub queries_created: usize,
    pub queries_begun: u64,
    pub boxes_drawn: u64,
    pub views_begun: u64,
}

pub struct HeadlessOcclusionDevice {
    occluders: Vec<Occluder>,
    queries: SlotMap<HeadlessQuery, QuerySlot>,
    active_query: Option<(HeadlessQuery, u64)>,
    camera_origin: Vec3,
    pre_view_translation: Vec3,
    samples_per_point: u64,
    stats: HeadlessDeviceStats,
}

impl HeadlessOcclusionDevice {
    pub fn new(occluders: Vec<Occluder>) -> Self {
        Self {
            occluders,
            queries: SlotMap::with_key(),
            active_query: None,
            camera_origin: Vec3::ZERO,
            pre_view_translation: Vec3::ZERO,
            samples_per_point: 16,
            stats: HeadlessDeviceStats::default(),
        }
    }

    pub fn occluders(&self) -> &[Occluder] {
        &self.occluders
    }

    pub fn stats(&self) -> HeadlessDeviceStats {
        HeadlessDeviceStats {
            queries_created: self.queries.len(),
            ..self.stats
        }
    }

    /// Samples that pass for `occlusion_box`, given in translated view space.
    /// The center and the eight corners are tested individually.
    pub fn visible_samples(&self, occlusion_box: &OcclusionBox) -> u64 {
        let world_center = occlusion_box.origin - self.pre_view_translation;
        let extent = occlusion_box.extent;
        let mut points = [world_center; 9];
        for (corner, point) in points.iter_mut().skip(1).enumerate() {
            let signs = Vec3::new(
                if corner & 1 == 0 { -1.0 } else { 1.0 },
                if corner & 2 == 0 { -1.0 } else { 1.0 },
                if corner & 4 == 0 { -1.0 } else { 1.0 },
            );
            *point = world_center + extent * signs;
        }
        let visible_points = points
            .iter()
            .filter(|point| {
                !self
                    .occluders
                    .iter()
                    .any(|occluder| occluder.blocks_segment(self.camera_origin, **point))
            })
            .count() as u64;
        visible_points * self.samples_per_point
    }
}

impl OcclusionDevice for HeadlessOcclusionDevice {
    type Query = HeadlessQuery;

    fn create_query(&mut self) -> Result<HeadlessQuery, QueryCreateError> {
        Ok(self.queries.insert(QuerySlot::default()))
    }

    fn reset_query(&mut self, query: &HeadlessQuery) {
        if let Some(slot) = self.queries.get_mut(*query) {
            slot.samples = None;
        }
    }

    fn begin_query(&mut self, query: &HeadlessQuery) {
        if let Some((previous, _)) = self.active_query {
            log::warn!("query {previous:?} was still active when {query:?} began");
        }
        self.active_query = Some((*query, 0));
        self.stats.queries_begun += 1;
    }

    fn end_query(&mut self, query: &HeadlessQuery) {
        match self.active_query.take() {
            Some((active, samples)) if active == *query => {
                if let Some(slot) = self.queries.get_mut(active) {
                    slot.samples = Some(samples);
                }
            }
            other => {
                log::warn!("ending query {query:?} while {other:?} was active");
            }
        }
    }

    fn query_result(
        &mut self,
        query: &HeadlessQuery,
        _wait: bool,
    ) -> Result<u64, QueryUnavailable> {
        self.queries
            .get(*query)
            .and_then(|slot| slot.samples)
            .ok_or(QueryUnavailable)
    }

    fn draw_bounding_boxes(&mut self, boxes: &[OcclusionBox]) {
        self.stats.boxes_drawn += boxes.len() as u64;
        let samples: u64 = boxes.iter().map(|drawn| self.visible_samples(drawn)).sum();
        if let Some((_, active_samples)) = self.active_query.as_mut() {
            *active_samples += samples;
        }
    }
}

impl SceneDevice for HeadlessOcclusionDevice {
    fn begin_view(&mut self, view: &OcclusionView) {
        self.camera_origin = view.origin;
        self.pre_view_translation = view.pre_view_translation;
        self.stats.views_begun += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wall() -> Occluder {
        Occluder::new(Vec3::new(-10.0, -10.0, 9.0), Vec3::new(10.0, 10.0, 10.0))
    }

    fn device_at_origin() -> HeadlessOcclusionDevice {
        let mut device = HeadlessOcclusionDevice::new(vec![wall()]);
        device.begin_view(&OcclusionView::perspective(Vec3::ZERO, Vec3::Z, 0.5, 64, 64));
        device
    }

    #[test]
    fn wall_blocks_segments_that_cross_it() {
        let wall = wall();
        assert!(wall.blocks_segment(Vec3::ZERO, Vec3::new(0.0, 0.0, 20.0)));
        assert!(!wall.blocks_segment(Vec3::ZERO, Vec3::new(0.0, 0.0, 5.0)));
        assert!(!wall.blocks_segment(Vec3::ZERO, Vec3::new(40.0, 0.0, 20.0)));
        assert!(!wall.blocks_segment(Vec3::new(0.0, 20.0, 0.0), Vec3::new(0.0, 20.0, 30.0)));
    }

    #[test]
    fn box_behind_wall_passes_no_samples() {
        let device = device_at_origin();
        let hidden = OcclusionBox {
            origin: Vec3::new(0.0, 0.0, 20.0),
            extent: Vec3::ONE,
        };
        let beside = OcclusionBox {
            origin: Vec3::new(40.0, 0.0, 20.0),
            extent: Vec3::ONE,
        };
        assert_eq!(device.visible_samples(&hidden), 0);
        assert_eq!(device.visible_samples(&beside), 9 * 16);
    }

    #[test]
    fn query_result_follows_begin_end_and_reset() {
        let mut device = device_at_origin();
        let query = device.create_query().expect("create query");
        assert_eq!(device.query_result(&query, true), Err(QueryUnavailable));

        device.begin_query(&query);
        device.draw_bounding_boxes(&[OcclusionBox {
            origin: Vec3::new(0.0, 0.0, 5.0),
            extent: Vec3::splat(0.5),
        }]);
        device.end_query(&query);
        assert_eq!(device.query_result(&query, true), Ok(9 * 16));

        device.reset_query(&query);
        assert_eq!(device.query_result(&query, false), Err(QueryUnavailable));
        assert_eq!(device.stats().queries_created, 1);
        assert_eq!(device.stats().boxes_drawn, 1);
    }
}
