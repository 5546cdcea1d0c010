use smallvec::SmallVec;

use crate::bounds::{BoxSphereBounds, OcclusionBox};
use crate::device::{OcclusionDevice, QueryCreateError};
use crate::query_pool::{OcclusionQueryHandle, OcclusionQueryPool};

/// Boxes drawn together under one occlusion query.
pub struct QueryBatch<Q> {
    query: OcclusionQueryHandle<Q>,
    boxes: SmallVec<[OcclusionBox; 8]>,
}

impl<Q> QueryBatch<Q> {
    pub fn query(&self) -> &OcclusionQueryHandle<Q> {
        &self.query
    }

    pub fn boxes(&self) -> &[OcclusionBox] {
        &self.boxes
    }
}

/// Packs primitive bounds into batches of at most `max_batched_primitives`.
pub struct QueryBatcher<Q> {
    batches: Vec<QueryBatch<Q>>,
    max_batched_primitives: usize,
}

impl<Q> QueryBatcher<Q> {
    pub fn new(max_batched_primitives: usize) -> Self {
        Self {
            batches: Vec::new(),
            max_batched_primitives: max_batched_primitives.max(1),
        }
    }

    pub fn max_batched_primitives(&self) -> usize {
        self.max_batched_primitives
    }

    /// Adds `bounds` to the open batch, opening a new one with a fresh query
    /// when there is none or it is full. Returns the batch's query.
    pub fn batch_primitive<D>(
        &mut self,
        device: &mut D,
        pool: &mut OcclusionQueryPool<Q>,
        bounds: &BoxSphereBounds,
    ) -> Result<OcclusionQueryHandle<Q>, QueryCreateError>
    where
        D: OcclusionDevice<Query = Q>,
    {
        let occlusion_box = bounds.to_box();
        match self.batches.last_mut() {
            Some(batch) if batch.boxes.len() < self.max_batched_primitives => {
                batch.boxes.push(occlusion_box);
                Ok(batch.query.clone())
            }
            _ => {
                let query = pool.allocate(device)?;
                let mut boxes = SmallVec::new();
                boxes.push(occlusion_box);
                self.batches.push(QueryBatch {
                    query: query.clone(),
                    boxes,
                });
                Ok(query)
            }
        }
    }

    pub fn sealed_batches(&self) -> &[QueryBatch<Q>] {
        &self.batches
    }

    pub fn primitive_count(&self) -> usize {
        self.batches.iter().map(|batch| batch.boxes.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Draws every batch under its own query and empties the batcher.
    /// Returns the number of queries issued.
    pub fn flush<D>(&mut self, device: &mut D, pool: &mut OcclusionQueryPool<Q>) -> usize
    where
        D: OcclusionDevice<Query = Q>,
    {
        let batch_count = self.batches.len();
        for batch in self.batches.drain(..) {
            device.begin_query(batch.query.query());
            device.draw_bounding_boxes(&batch.boxes);
            device.end_query(batch.query.query());
            pool.release(device, batch.query);
        }
        if batch_count > 0 {
            log::trace!("flushed {batch_count} occlusion query batches");
        }
        batch_count
    }
}
