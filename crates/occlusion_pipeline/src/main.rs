use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use occlusion::{BoxSphereBounds, OcclusionView, PrimitiveId, PrimitiveOcclusionInput, Vec3};
use occlusion_pipeline::{
    FrameInput, HeadlessOcclusionDevice, OcclusionPipeline, Occluder, PipelineConfig,
};
use serde::Serialize;

#[derive(Parser)]
#[command(author, version, about = "Headless occlusion culling demo")]
struct Arguments {
    /// Optional JSON pipeline config.
    #[arg(long, short = 'c', value_parser)]
    config: Option<PathBuf>,
    /// Frames to simulate.
    #[arg(long, default_value_t = 120)]
    frames: u64,
    /// Primitives per side of the grid behind the wall.
    #[arg(long, default_value_t = 16)]
    grid: u32,
    /// Simulated frames per second.
    #[arg(long, default_value_t = 60.0)]
    frame_rate: f64,
    /// Camera strafe speed in world units per second.
    #[arg(long, default_value_t = 12.0)]
    camera_speed: f32,
    /// Print the per-frame summary as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct FrameSummary {
    frame: u64,
    time: f64,
    visible: usize,
    occluded: usize,
    queries: usize,
}

const GRID_SPACING: f32 = 4.0;
const GRID_DEPTH: f32 = 40.0;
const WALL_DEPTH: f32 = 20.0;

fn grid_primitive_id(grid: u32, row: u32, column: u32) -> PrimitiveId {
    PrimitiveId(u64::from(row) * u64::from(grid) + u64::from(column))
}

fn validate_frame_rate(frame_rate: f64) -> Result<f64> {
    if frame_rate.is_finite() && frame_rate > 0.0 {
        Ok(frame_rate)
    } else {
        Err(anyhow::anyhow!("frame rate must be positive and finite, got {frame_rate}"))
    }
}

fn grid_primitives(grid: u32) -> Vec<PrimitiveOcclusionInput> {
    let half = grid as f32 * GRID_SPACING * 0.5;
    (0..grid)
        .flat_map(|row| (0..grid).map(move |column| (row, column)))
        .map(|(row, column)| {
            let origin = Vec3::new(
                column as f32 * GRID_SPACING - half,
                row as f32 * GRID_SPACING - half,
                GRID_DEPTH,
            );
            PrimitiveOcclusionInput::new(
                grid_primitive_id(grid, row, column),
                BoxSphereBounds::from_box(origin, Vec3::ONE),
            )
        })
        .collect()
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let arguments = Arguments::parse();

    let config = match &arguments.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("load pipeline config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    let frame_rate = validate_frame_rate(arguments.frame_rate)?;

    let wall_half_width = arguments.grid as f32 * GRID_SPACING * 0.25;
    let device = HeadlessOcclusionDevice::new(vec![Occluder::new(
        Vec3::new(-wall_half_width, -wall_half_width, WALL_DEPTH),
        Vec3::new(wall_half_width, wall_half_width, WALL_DEPTH + 1.0),
    )]);
    let mut pipeline =
        OcclusionPipeline::start(device, config).context("start occlusion pipeline")?;
    let view = pipeline.add_view().context("add camera view")?;
    let primitives = grid_primitives(arguments.grid);
    log::info!(
        "simulating {} frames over {} primitives",
        arguments.frames,
        primitives.len()
    );

    let mut summaries = Vec::new();
    for frame_index in 0..arguments.frames {
        let time = frame_index as f64 / frame_rate;
        let sway = (time as f32 * 0.5).sin() * arguments.camera_speed;
        let camera = Vec3::new(sway, 0.0, 0.0);
        let input = FrameInput {
            time,
            view: OcclusionView::perspective(camera, Vec3::Z, 0.5, 1280, 720),
            primitives: primitives.clone(),
            shadow_candidates: Vec::new(),
        };
        pipeline
            .submit_frame(view, input)
            .with_context(|| format!("submit frame {frame_index}"))?;
        pipeline
            .flush()
            .with_context(|| format!("flush frame {frame_index}"))?;

        let Some(snapshot) = pipeline.latest_visibility(view) else {
            continue;
        };
        let summary = FrameSummary {
            frame: snapshot.frame,
            time: snapshot.time,
            visible: snapshot.visible_count(),
            occluded: snapshot.occluded_count(),
            queries: snapshot.report.individual_queries + snapshot.report.grouped_queries,
        };
        log::debug!(
            "frame {}: {} visible, {} occluded, {} queries",
            summary.frame,
            summary.visible,
            summary.occluded,
            summary.queries
        );
        summaries.push(summary);
    }

    let device = pipeline.shutdown().context("shut down occlusion pipeline")?;
    let stats = device.stats();
    log::info!(
        "device created {} queries, began {}, drew {} boxes",
        stats.queries_created,
        stats.queries_begun,
        stats.boxes_drawn
    );

    if arguments.json {
        let text = serde_json::to_string_pretty(&summaries).context("serialize frame summaries")?;
        println!("{text}");
    } else if let Some(last) = summaries.last() {
        println!(
            "last frame {}: {} visible, {} occluded",
            last.frame, last.visible, last.occluded
        );
    }
    Ok(())
}
