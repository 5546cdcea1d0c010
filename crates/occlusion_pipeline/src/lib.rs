//! Runs per-view occlusion culling on a dedicated render thread.
//!
//! The producer side (`OcclusionPipeline`) only enqueues commands. Each
//! submitted frame updates the view's occlusion history on the render thread,
//! which then publishes a `VisibilitySnapshot` the producer can read lock-free.

mod commands;
mod config;
mod context;
mod device;
mod snapshot;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use occlusion::{
    OcclusionConfig, OcclusionConfigError, OcclusionView, PrimitiveOcclusionInput,
    ShadowOcclusionCandidate,
};
use render_thread::{
    RenderThread, RenderThreadError, RenderThreadStartError, RenderThreadState,
    SuspendedRendering,
};
use slotmap::SlotMap;
use thiserror::Error;

use commands::{OcclusionFrame, RegisterView, RemoveView};

pub use config::{PipelineConfig, PipelineConfigError};
pub use context::SceneRenderContext;
pub use device::{
    HeadlessDeviceStats, HeadlessOcclusionDevice, HeadlessQuery, Occluder, SceneDevice,
};
pub use snapshot::{PrimitiveVisibility, VisibilitySnapshot};

slotmap::new_key_type! {
    pub struct ViewId;
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Start(#[from] RenderThreadStartError),
    #[error(transparent)]
    RenderThread(#[from] RenderThreadError),
    #[error(transparent)]
    Config(#[from] PipelineConfigError),
    #[error(transparent)]
    OcclusionConfig(#[from] OcclusionConfigError),
    #[error("unknown view {0:?}")]
    UnknownView(ViewId),
}

/// Everything the render thread needs for one frame of one view.
#[derive(Debug, Clone)]
pub struct FrameInput {
    pub time: f64,
    pub view: OcclusionView,
    pub primitives: Vec<PrimitiveOcclusionInput>,
    pub shadow_candidates: Vec<ShadowOcclusionCandidate>,
}

pub struct OcclusionPipeline<D: SceneDevice> {
    render_thread: RenderThread<SceneRenderContext<D>>,
    views: SlotMap<ViewId, Arc<ArcSwapOption<VisibilitySnapshot>>>,
    default_occlusion: OcclusionConfig,
    frames_submitted: u64,
}

impl<D: SceneDevice> OcclusionPipeline<D> {
    pub fn start(device: D, config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        let render_thread =
            RenderThread::start(SceneRenderContext::new(device), config.render_thread, Vec::new())?;
        log::info!("occlusion pipeline started on `{}`", render_thread.thread_name());
        Ok(Self {
            render_thread,
            views: SlotMap::with_key(),
            default_occlusion: config.occlusion,
            frames_submitted: 0,
        })
    }

    pub fn add_view(&mut self) -> Result<ViewId, PipelineError> {
        self.add_view_with_config(self.default_occlusion.clone())
    }

    pub fn add_view_with_config(
        &mut self,
        config: OcclusionConfig,
    ) -> Result<ViewId, PipelineError> {
        config.validate()?;
        let publisher = Arc::new(ArcSwapOption::empty());
        let view = self.views.insert(Arc::clone(&publisher));
        if let Err(error) = self.render_thread.enqueue(RegisterView {
            view,
            config,
            publisher,
        }) {
            self.views.remove(view);
            return Err(error.into());
        }
        Ok(view)
    }

    /// Forgets the view. Its queries are released on the render thread.
    pub fn remove_view(&mut self, view: ViewId) -> Result<(), PipelineError> {
        if self.views.remove(view).is_none() {
            return Err(PipelineError::UnknownView(view));
        }
        self.render_thread.enqueue(RemoveView { view })?;
        Ok(())
    }

    /// Enqueues one occlusion frame and returns its frame number. Results
    /// appear in [`Self::latest_visibility`] once the render thread runs it.
    pub fn submit_frame(&mut self, view: ViewId, input: FrameInput) -> Result<u64, PipelineError> {
        if !self.views.contains_key(view) {
            return Err(PipelineError::UnknownView(view));
        }
        let frame = self.frames_submitted + 1;
        self.render_thread.enqueue(OcclusionFrame {
            view,
            frame,
            time: input.time,
            occlusion_view: input.view,
            primitives: input.primitives,
            shadow_candidates: input.shadow_candidates,
        })?;
        self.frames_submitted = frame;
        Ok(frame)
    }

    /// Waits until every submitted frame has been published.
    pub fn flush(&mut self) -> Result<(), PipelineError> {
        self.render_thread.flush()?;
        Ok(())
    }

    pub fn latest_visibility(&self, view: ViewId) -> Option<Arc<VisibilitySnapshot>> {
        self.views.get(view).and_then(|publisher| publisher.load_full())
    }

    pub fn suspend(&mut self) -> Result<SuspendedRendering<'_>, PipelineError> {
        Ok(self.render_thread.request_suspend()?)
    }

    pub fn view_count(&self) -> usize {
        self.views.len()
    }

    pub fn frames_submitted(&self) -> u64 {
        self.frames_submitted
    }

    pub fn is_healthy(&self) -> bool {
        self.render_thread.is_healthy()
    }

    pub fn state(&self) -> RenderThreadState {
        self.render_thread.state()
    }

    /// Stops the render thread and returns the device with every query released.
    pub fn shutdown(self) -> Result<D, PipelineError> {
        let context = self.render_thread.stop()?;
        log::info!(
            "occlusion pipeline stopped after {} frames",
            context.frames_rendered()
        );
        Ok(context.into_device())
    }
}
