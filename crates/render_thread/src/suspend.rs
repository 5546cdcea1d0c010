use std::sync::atomic::Ordering;

use crate::RenderThreadShared;
use crate::health::RenderThreadState;

/// Keeps the render thread parked until dropped or [`Self::resume`]d.
///
/// The resume command was already enqueued when this guard was created, so
/// it is the next command the worker runs after waking up.
pub struct SuspendedRendering<'a> {
    shared: &'a RenderThreadShared,
    resumed: bool,
}

impl<'a> SuspendedRendering<'a> {
    pub(crate) fn new(shared: &'a RenderThreadShared) -> Self {
        Self {
            shared,
            resumed: false,
        }
    }

    pub fn worker_state(&self) -> RenderThreadState {
        self.shared.health.state()
    }

    pub fn resume(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.resumed {
            return;
        }
        self.resumed = true;
        self.shared.suspend_requests.fetch_sub(1, Ordering::AcqRel);
        log::debug!("render thread resume requested");
    }
}

impl Drop for SuspendedRendering<'_> {
    fn drop(&mut self) {
        self.release();
    }
}
