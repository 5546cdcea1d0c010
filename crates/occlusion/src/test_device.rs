//! Scriptable device for unit tests.

use std::collections::HashMap;

use crate::bounds::OcclusionBox;
use crate::device::{OcclusionDevice, QueryCreateError, QueryUnavailable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FakeQuery {
    pub id: u32,
}

pub struct FakeOcclusionDevice {
    next_query_id: u32,
    pub created_queries: usize,
    pub reset_queries: Vec<u32>,
    pub fail_query_creation: bool,
    pub unavailable_results: bool,
    pub draws: Vec<(u32, Vec<OcclusionBox>)>,
    active_query: Option<(u32, u64)>,
    results: HashMap<u32, u64>,
    visibility: Box<dyn Fn(&OcclusionBox) -> u64>,
}

impl FakeOcclusionDevice {
    /// Every drawn box passes 100 samples.
    pub fn new() -> Self {
        Self::with_visibility(|_| 100)
    }

    pub fn with_visibility(visibility: impl Fn(&OcclusionBox) -> u64 + 'static) -> Self {
        Self {
            next_query_id: 0,
            created_queries: 0,
            reset_queries: Vec::new(),
            fail_query_creation: false,
            unavailable_results: false,
            draws: Vec::new(),
            active_query: None,
            results: HashMap::new(),
            visibility: Box::new(visibility),
        }
    }

    pub fn set_visibility(&mut self, visibility: impl Fn(&OcclusionBox) -> u64 + 'static) {
        self.visibility = Box::new(visibility);
    }
}

impl OcclusionDevice for FakeOcclusionDevice {
    type Query = FakeQuery;

    fn create_query(&mut self) -> Result<FakeQuery, QueryCreateError> {
        if self.fail_query_creation {
            return Err(QueryCreateError {
                reason: "query heap exhausted".to_owned(),
            });
        }
        self.next_query_id += 1;
        self.created_queries += 1;
        Ok(FakeQuery {
            id: self.next_query_id,
        })
    }

    fn reset_query(&mut self, query: &FakeQuery) {
        self.reset_queries.push(query.id);
        self.results.remove(&query.id);
    }

    fn begin_query(&mut self, query: &FakeQuery) {
        assert!(self.active_query.is_none(), "nested occlusion query");
        self.active_query = Some((query.id, 0));
    }

    fn end_query(&mut self, query: &FakeQuery) {
        let (active_id, samples) = self.active_query.take().expect("query was begun");
        assert_eq!(active_id, query.id);
        self.results.insert(query.id, samples);
    }

    fn query_result(&mut self, query: &FakeQuery, _wait: bool) -> Result<u64, QueryUnavailable> {
        if self.unavailable_results {
            return Err(QueryUnavailable);
        }
        self.results.get(&query.id).copied().ok_or(QueryUnavailable)
    }

    fn draw_bounding_boxes(&mut self, boxes: &[OcclusionBox]) {
        let samples: u64 = boxes.iter().map(|drawn| (self.visibility)(drawn)).sum();
        if let Some((query_id, active_samples)) = self.active_query.as_mut() {
            *active_samples += samples;
            self.draws.push((*query_id, boxes.to_vec()));
        }
    }
}
