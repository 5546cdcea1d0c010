use std::fmt;
use std::sync::Arc;

use crate::device::{OcclusionDevice, QueryCreateError};

/// Shared reference to a device query. Sealed batches and the records batched
/// into them hold clones of the same handle.
pub struct OcclusionQueryHandle<Q> {
    query: Arc<Q>,
}

impl<Q> Clone for OcclusionQueryHandle<Q> {
    fn clone(&self) -> Self {
        Self {
            query: Arc::clone(&self.query),
        }
    }
}

impl<Q> fmt::Debug for OcclusionQueryHandle<Q> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("OcclusionQueryHandle")
            .field("address", &Arc::as_ptr(&self.query))
            .field("references", &Arc::strong_count(&self.query))
            .finish()
    }
}

impl<Q> OcclusionQueryHandle<Q> {
    pub fn query(&self) -> &Q {
        &self.query
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.query, &other.query)
    }

    pub fn reference_count(&self) -> usize {
        Arc::strong_count(&self.query)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OcclusionQueryPoolStats {
    pub created: usize,
    pub pooled: usize,
    pub outstanding: usize,
}

/// Per-view recycler of device queries.
pub struct OcclusionQueryPool<Q> {
    free_queries: Vec<Arc<Q>>,
    created: usize,
}

impl<Q> Default for OcclusionQueryPool<Q> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Q> OcclusionQueryPool<Q> {
    pub fn new() -> Self {
        Self {
            free_queries: Vec::new(),
            created: 0,
        }
    }

    pub fn allocate<D>(
        &mut self,
        device: &mut D,
    ) -> Result<OcclusionQueryHandle<Q>, QueryCreateError>
    where
        D: OcclusionDevice<Query = Q>,
    {
        if let Some(query) = self.free_queries.pop() {
            return Ok(OcclusionQueryHandle { query });
        }
        let query = device.create_query()?;
        self.created += 1;
        log::trace!("created occlusion query #{}", self.created);
        Ok(OcclusionQueryHandle {
            query: Arc::new(query),
        })
    }

    /// Returns the query to the free list when `handle` is its last reference,
    /// otherwise only drops this reference.
    pub fn release<D>(&mut self, device: &mut D, handle: OcclusionQueryHandle<Q>)
    where
        D: OcclusionDevice<Query = Q>,
    {
        if Arc::strong_count(&handle.query) == 1 {
            device.reset_query(&handle.query);
            self.free_queries.push(handle.query);
        }
    }

    pub fn release_slot<D>(&mut self, device: &mut D, slot: &mut Option<OcclusionQueryHandle<Q>>)
    where
        D: OcclusionDevice<Query = Q>,
    {
        if let Some(handle) = slot.take() {
            self.release(device, handle);
        }
    }

    pub fn stats(&self) -> OcclusionQueryPoolStats {
        OcclusionQueryPoolStats {
            created: self.created,
            pooled: self.free_queries.len(),
            outstanding: self.created.saturating_sub(self.free_queries.len()),
        }
    }
}
