use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use occlusion::{OcclusionDevice, ViewOcclusionState};
use render_thread::RenderThreadContext;

use crate::ViewId;
use crate::device::SceneDevice;
use crate::snapshot::VisibilitySnapshot;

pub(crate) struct SceneView<Q> {
    pub(crate) occlusion: ViewOcclusionState<Q>,
    pub(crate) publisher: Arc<ArcSwapOption<VisibilitySnapshot>>,
}

/// Everything the render thread owns: the device and per-view occlusion state.
pub struct SceneRenderContext<D: SceneDevice> {
    pub(crate) device: D,
    pub(crate) views: HashMap<ViewId, SceneView<<D as OcclusionDevice>::Query>>,
    pub(crate) frames_rendered: u64,
}

impl<D: SceneDevice> SceneRenderContext<D> {
    pub(crate) fn new(device: D) -> Self {
        Self {
            device,
            views: HashMap::new(),
            frames_rendered: 0,
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn view_count(&self) -> usize {
        self.views.len()
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    /// Releases every view's queries and hands the device back.
    pub fn into_device(mut self) -> D {
        for (_, mut view) in self.views.drain() {
            view.occlusion.release_all(&mut self.device);
            view.publisher.store(None);
        }
        self.device
    }
}

impl<D: SceneDevice> RenderThreadContext for SceneRenderContext<D> {
    fn on_suspend(&mut self) {
        log::debug!(
            "scene context suspended with {} views after {} frames",
            self.views.len(),
            self.frames_rendered
        );
    }

    fn on_resume(&mut self) {
        log::debug!("scene context resumed");
    }
}
