//! Commands the pipeline enqueues onto the render thread.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use occlusion::{
    OcclusionConfig, OcclusionView, PrimitiveOcclusionInput, ShadowOcclusionCandidate,
    ViewOcclusionState,
};
use render_command::{RenderCommand, RenderCommandError};

use crate::ViewId;
use crate::context::{SceneRenderContext, SceneView};
use crate::device::SceneDevice;
use crate::snapshot::{PrimitiveVisibility, VisibilitySnapshot};

pub(crate) struct RegisterView {
    pub(crate) view: ViewId,
    pub(crate) config: OcclusionConfig,
    pub(crate) publisher: Arc<ArcSwapOption<VisibilitySnapshot>>,
}

impl<D: SceneDevice> RenderCommand<SceneRenderContext<D>> for RegisterView {
    fn execute(
        self: Box<Self>,
        context: &mut SceneRenderContext<D>,
    ) -> Result<(), RenderCommandError> {
        let RegisterView {
            view,
            config,
            publisher,
        } = *self;
        let occlusion = ViewOcclusionState::new(config)
            .map_err(|error| RenderCommandError::new(format!("register view {view:?}: {error}")))?;
        context.views.insert(view, SceneView { occlusion, publisher });
        log::debug!("registered view {view:?}");
        Ok(())
    }

    fn label(&self) -> &'static str {
        "register_view"
    }
}

pub(crate) struct RemoveView {
    pub(crate) view: ViewId,
}

impl<D: SceneDevice> RenderCommand<SceneRenderContext<D>> for RemoveView {
    fn execute(
        self: Box<Self>,
        context: &mut SceneRenderContext<D>,
    ) -> Result<(), RenderCommandError> {
        if let Some(mut removed) = context.views.remove(&self.view) {
            removed.occlusion.release_all(&mut context.device);
            removed.publisher.store(None);
            log::debug!("removed view {:?}", self.view);
        }
        Ok(())
    }

    fn label(&self) -> &'static str {
        "remove_view"
    }
}

/// One frame of occlusion work for a view: read last frame's results for every
/// primitive, issue this frame's queries and publish the decisions.
pub(crate) struct OcclusionFrame {
    pub(crate) view: ViewId,
    pub(crate) frame: u64,
    pub(crate) time: f64,
    pub(crate) occlusion_view: OcclusionView,
    pub(crate) primitives: Vec<PrimitiveOcclusionInput>,
    pub(crate) shadow_candidates: Vec<ShadowOcclusionCandidate>,
}

impl<D: SceneDevice> RenderCommand<SceneRenderContext<D>> for OcclusionFrame {
    fn execute(
        self: Box<Self>,
        context: &mut SceneRenderContext<D>,
    ) -> Result<(), RenderCommandError> {
        let SceneRenderContext {
            device,
            views,
            frames_rendered,
        } = context;
        let Some(scene_view) = views.get_mut(&self.view) else {
            log::warn!("dropping frame {} for unknown view {:?}", self.frame, self.view);
            return Ok(());
        };

        device.begin_view(&self.occlusion_view);
        let primitives: Vec<_> = self
            .primitives
            .iter()
            .map(|input| {
                let decision = scene_view.occlusion.update_primitive_occlusion(
                    device,
                    &self.occlusion_view,
                    input,
                    self.time,
                );
                PrimitiveVisibility {
                    id: input.id,
                    occluded: decision.occluded,
                    definitely_unoccluded: decision.definitely_unoccluded,
                    coverage_fraction: scene_view
                        .occlusion
                        .last_coverage_fraction(input.id)
                        .unwrap_or(0.0),
                }
            })
            .collect();

        // Shadow results belong to last frame's queries, so read them first.
        let occluded_shadows: Vec<_> = self
            .shadow_candidates
            .iter()
            .map(|candidate| candidate.key)
            .filter(|key| scene_view.occlusion.is_shadow_occluded(device, *key))
            .collect();

        let report = scene_view.occlusion.begin_occlusion_tests(
            device,
            &self.occlusion_view,
            self.time,
            &self.shadow_candidates,
        );
        let snapshot = VisibilitySnapshot::new(
            self.frame,
            self.time,
            primitives,
            occluded_shadows,
            report,
        );
        log::trace!(
            "view {:?} frame {}: {} of {} primitives occluded",
            self.view,
            self.frame,
            snapshot.occluded_count(),
            snapshot.primitives.len()
        );
        scene_view.publisher.store(Some(Arc::new(snapshot)));
        *frames_rendered += 1;
        Ok(())
    }

    fn label(&self) -> &'static str {
        "occlusion_frame"
    }
}
