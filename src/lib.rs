use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

pub mod aggregate;
pub mod config;
pub mod crop;
pub mod detect;
pub mod error;
pub mod geometry;
pub mod output;
pub mod pipeline;
mod system_info;
pub mod video;

pub use aggregate::{aggregate, bucket_key, Aggregator, TimeBuckets};
pub use config::Config;
pub use crop::{normalize, NormalizedFrame};
pub use detect::{Detection, DetectorConfig, OnnxDetector, PersonDetector};
pub use error::{ConfigError, Error, RoiProblem};
pub use geometry::{unproject, FrameSize, GeoCalibration, GeoPoint, Roi};
pub use output::{read_buckets, write_buckets, write_frames};
pub use pipeline::{
    FailurePolicy, FrameRecord, PersonRecord, Pipeline, PipelineConfig, RunReport, RunSummary,
};
pub use system_info::{build_info, version};
pub use video::{open_video, sample, ImageSequence, MemoryVideo, SampledFrame, VideoSource};

#[derive(Parser, Debug)]
#[command(
    name = "crowdmap",
    about = "Turn fixed-camera footage into time-bucketed heatmap points"
)]
pub struct Cli {
    /// Frame directory or glob; a video file needs the opencv feature.
    pub video: PathBuf,
    /// Bucketed heatmap output.
    #[arg(long, default_value = "detections.json")]
    pub output: PathBuf,
    /// Optional per-frame detection log.
    #[arg(long)]
    pub frames_output: Option<PathBuf>,
    /// Frame rate of image sequences.
    #[arg(long, default_value_t = 30.0)]
    pub fps: f64,
    /// Frames in detection at once; overrides CROWDMAP_WORKERS.
    #[arg(long)]
    pub workers: Option<usize>,
}

/// Where a run's artifacts go.
#[derive(Debug, Clone, Copy)]
pub struct Outputs<'a> {
    pub buckets: &'a Path,
    pub frames: Option<&'a Path>,
}

/// Run `pipeline` over `source` and persist the results.
///
/// Nothing is written unless the whole run succeeds.
pub async fn execute<S, D>(
    pipeline: &Pipeline,
    source: S,
    detector: Arc<D>,
    workers: usize,
    outputs: Outputs<'_>,
) -> error::Result<RunReport>
where
    S: VideoSource,
    D: PersonDetector + Send + Sync + 'static,
{
    let report = if workers <= 1 {
        pipeline.run(source, &*detector)?
    } else {
        pipeline.run_concurrent(source, detector, workers).await?
    };
    write_buckets(outputs.buckets, &report.buckets)?;
    if let Some(path) = outputs.frames {
        write_frames(path, &report.frames)?;
    }
    tracing::info!(path = %outputs.buckets.display(), "Heatmap data written.");
    Ok(report)
}

// ──────────────────────────────────────────────────────────────
// Main application setup
// ──────────────────────────────────────────────────────────────

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Load .env file if it exists (for local development)
    dotenvy::dotenv().ok();

    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    tracing::info!("Starting {}", build_info());

    let config = Config::from_env().context("loading configuration")?;
    let pipeline = Pipeline::new(config.pipeline)?;
    let workers = cli.workers.unwrap_or(config.workers).max(1);

    let source = open_video(&cli.video, cli.fps)?;
    let detector = Arc::new(
        OnnxDetector::new(&config.detector)
            .with_context(|| format!("loading detector {}", config.detector.model_path))?,
    );

    let outputs = Outputs {
        buckets: &cli.output,
        frames: cli.frames_output.as_deref(),
    };
    let report = execute(&pipeline, source, detector, workers, outputs).await?;
    tracing::info!(
        frames = report.summary.sampled_frames,
        skipped = report.summary.skipped_frames,
        people = report.summary.total_detections,
        buckets = report.summary.buckets,
        "Done."
    );
    Ok(())
}
