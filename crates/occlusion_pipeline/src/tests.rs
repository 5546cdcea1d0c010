use occlusion::{
    BoxSphereBounds, LightId, OcclusionBox, OcclusionConfig, OcclusionConfigError, OcclusionView,
    PrimitiveId, PrimitiveOcclusionInput, ShadowKey, ShadowOcclusionCandidate, Vec3,
};
use render_thread::{RenderThreadConfig, RenderThreadConfigError, RenderThreadState};

use crate::{
    FrameInput, HeadlessOcclusionDevice, OcclusionPipeline, Occluder, PipelineConfig,
    PipelineConfigError, PipelineError,
};

const HIDDEN: PrimitiveId = PrimitiveId(1);
const BESIDE_WALL: PrimitiveId = PrimitiveId(2);

fn wall_device() -> HeadlessOcclusionDevice {
    HeadlessOcclusionDevice::new(vec![Occluder::new(
        Vec3::new(-10.0, -10.0, 9.0),
        Vec3::new(10.0, 10.0, 10.0),
    )])
}

fn test_pipeline() -> OcclusionPipeline<HeadlessOcclusionDevice> {
    let config = PipelineConfig {
        render_thread: RenderThreadConfig {
            command_capacity: 16,
            idle_wait_millis: 2,
            thread_name: "occlusion_test".to_owned(),
            ..RenderThreadConfig::default()
        },
        occlusion: OcclusionConfig::default(),
    };
    OcclusionPipeline::start(wall_device(), config).expect("start pipeline")
}

fn frame(time: f64) -> FrameInput {
    let primitive = |id, x| {
        PrimitiveOcclusionInput::new(
            id,
            BoxSphereBounds::from_box(Vec3::new(x, 0.0, 20.0), Vec3::ONE),
        )
    };
    FrameInput {
        time,
        view: OcclusionView::perspective(Vec3::ZERO, Vec3::Z, 0.5, 64, 64),
        primitives: vec![primitive(HIDDEN, 0.0), primitive(BESIDE_WALL, 40.0)],
        shadow_candidates: Vec::new(),
    }
}

#[test]
fn primitive_behind_wall_is_occluded_from_the_second_frame() {
    let mut pipeline = test_pipeline();
    let view = pipeline.add_view().expect("add view");
    assert!(pipeline.latest_visibility(view).is_none());

    pipeline.submit_frame(view, frame(0.0)).expect("submit frame 1");
    pipeline.flush().expect("flush frame 1");
    let first = pipeline.latest_visibility(view).expect("first snapshot");
    assert_eq!(first.frame, 1);
    assert!(!first.is_occluded(HIDDEN));
    assert!(!first.is_occluded(BESIDE_WALL));
    assert_eq!(first.report.individual_queries, 2);

    pipeline.submit_frame(view, frame(1.0 / 60.0)).expect("submit frame 2");
    pipeline.flush().expect("flush frame 2");
    let second = pipeline.latest_visibility(view).expect("second snapshot");
    assert_eq!(second.frame, 2);
    assert!(second.is_occluded(HIDDEN));
    assert!(!second.is_occluded(BESIDE_WALL));
    assert!(
        second
            .primitive(BESIDE_WALL)
            .is_some_and(|entry| entry.definitely_unoccluded && entry.coverage_fraction > 0.0)
    );
    assert_eq!(second.report.grouped_queries, 1);
}

#[test]
fn views_keep_separate_histories() {
    let mut pipeline = test_pipeline();
    let first_view = pipeline.add_view().expect("add first view");
    let second_view = pipeline.add_view().expect("add second view");

    pipeline.submit_frame(first_view, frame(0.0)).expect("submit");
    pipeline.submit_frame(first_view, frame(0.1)).expect("submit");
    pipeline.submit_frame(second_view, frame(0.1)).expect("submit");
    pipeline.flush().expect("flush");

    let first = pipeline.latest_visibility(first_view).expect("first view snapshot");
    let second = pipeline.latest_visibility(second_view).expect("second view snapshot");
    assert!(first.is_occluded(HIDDEN));
    // The second view has no history yet, so everything renders.
    assert!(!second.is_occluded(HIDDEN));
    assert_eq!(pipeline.frames_submitted(), 3);
}

#[test]
fn removed_view_rejects_frames() {
    let mut pipeline = test_pipeline();
    let view = pipeline.add_view().expect("add view");
    pipeline.submit_frame(view, frame(0.0)).expect("submit");
    pipeline.remove_view(view).expect("remove view");
    pipeline.flush().expect("flush");

    assert!(pipeline.latest_visibility(view).is_none());
    assert!(matches!(
        pipeline.submit_frame(view, frame(0.1)),
        Err(PipelineError::UnknownView(unknown)) if unknown == view
    ));
    assert!(matches!(
        pipeline.remove_view(view),
        Err(PipelineError::UnknownView(_))
    ));
    assert_eq!(pipeline.view_count(), 0);
}

#[test]
fn shadow_behind_wall_is_reported_occluded() {
    let mut pipeline = test_pipeline();
    let view = pipeline.add_view().expect("add view");
    let key = ShadowKey {
        primitive: HIDDEN,
        light: LightId(1),
    };
    let with_shadow = |time| FrameInput {
        shadow_candidates: vec![ShadowOcclusionCandidate {
            key,
            shadow_bounds: OcclusionBox {
                origin: Vec3::new(0.0, -2.0, 22.0),
                extent: Vec3::splat(2.0),
            },
            subjects_visible: false,
            preshadow: false,
        }],
        ..frame(time)
    };

    pipeline.submit_frame(view, with_shadow(0.0)).expect("submit");
    pipeline.flush().expect("flush");
    let first = pipeline.latest_visibility(view).expect("snapshot");
    assert!(!first.is_shadow_occluded(key));
    assert_eq!(first.report.shadow_queries, 1);

    pipeline.submit_frame(view, with_shadow(0.1)).expect("submit");
    pipeline.flush().expect("flush");
    let second = pipeline.latest_visibility(view).expect("snapshot");
    assert!(second.is_shadow_occluded(key));
}

#[test]
fn suspended_pipeline_resumes_and_renders() {
    let mut pipeline = test_pipeline();
    let view = pipeline.add_view().expect("add view");
    {
        let suspended = pipeline.suspend().expect("suspend");
        assert_eq!(suspended.worker_state(), RenderThreadState::Suspended);
    }
    pipeline.submit_frame(view, frame(0.0)).expect("submit");
    pipeline.flush().expect("flush");
    assert!(pipeline.latest_visibility(view).is_some());
    assert!(pipeline.is_healthy());
}

#[test]
fn shutdown_returns_device_with_queries_released() {
    let mut pipeline = test_pipeline();
    let view = pipeline.add_view().expect("add view");
    for index in 0..3 {
        pipeline
            .submit_frame(view, frame(index as f64 * 0.1))
            .expect("submit");
    }

    let device = pipeline.shutdown().expect("shutdown");
    let stats = device.stats();
    assert_eq!(stats.views_begun, 3);
    assert!(stats.queries_created >= 2);
    assert!(stats.queries_begun >= 4);
}

#[test]
fn invalid_configs_are_rejected() {
    let config = PipelineConfig {
        render_thread: RenderThreadConfig {
            thread_name: String::new(),
            ..RenderThreadConfig::default()
        },
        ..PipelineConfig::default()
    };
    let result = OcclusionPipeline::start(wall_device(), config);
    assert!(matches!(
        result,
        Err(PipelineError::Config(PipelineConfigError::RenderThread(
            RenderThreadConfigError::ThreadNameEmpty
        )))
    ));

    let mut pipeline = test_pipeline();
    let result = pipeline.add_view_with_config(OcclusionConfig {
        max_occlusion_pixels_fraction: 0.0,
        ..OcclusionConfig::default()
    });
    assert!(matches!(
        result,
        Err(PipelineError::OcclusionConfig(
            OcclusionConfigError::MaxPixelsFractionInvalid
        ))
    ));
    assert_eq!(pipeline.view_count(), 0);
}
