use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info, instrument, warn};

use crate::aggregate::{Aggregator, TimeBuckets};
use crate::crop::normalize;
use crate::detect::config::unit_interval;
use crate::detect::PersonDetector;
use crate::error::{ConfigError, Error, Result};
use crate::geometry::{to_full_frame, FrameSize, GeoCalibration, GeoPoint, Roi};
use crate::video::{sample, SampledFrame, Sampler, VideoSource};

/// What to do when the detector fails on a single frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Log, count the frame as skipped and carry on with zero detections.
    #[default]
    Skip,
    /// Stop the run with [`Error::DetectionFailed`].
    Abort,
}

impl FromStr for FailurePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "abort" => Ok(Self::Abort),
            _ => Err(ConfigError::UnknownPolicy(s.to_string())),
        }
    }
}

/// Everything a run needs besides the video and the detector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineConfig {
    pub roi: Roi,
    pub calibration: GeoCalibration,
    pub target_fps: f64,
    pub target_size: FrameSize,
    pub interval_seconds: f64,
    pub confidence: f32,
    pub on_detection_error: FailurePolicy,
}

impl PipelineConfig {
    pub fn new(roi: Roi, calibration: GeoCalibration) -> Self {
        Self {
            roi,
            calibration,
            target_fps: 2.0,
            target_size: FrameSize::new(1280, 720),
            interval_seconds: 1.0,
            confidence: 0.05,
            on_detection_error: FailurePolicy::Skip,
        }
    }
}

/// One detected person in the per-frame log.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PersonRecord {
    /// Full-frame pixel position.
    pub x: f64,
    pub y: f64,
    pub lat: f64,
    pub lon: f64,
}

impl PersonRecord {
    pub fn geo_point(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lon)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRecord {
    pub timestamp: f64,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub skipped: bool,
    pub people: Vec<PersonRecord>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub sampled_frames: usize,
    /// Frames dropped because the detector failed on them.
    pub skipped_frames: usize,
    pub total_detections: usize,
    pub buckets: usize,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub buckets: TimeBuckets,
    pub frames: Vec<FrameRecord>,
    pub summary: RunSummary,
}

struct RunState {
    policy: FailurePolicy,
    aggregator: Aggregator,
    frames: Vec<FrameRecord>,
    summary: RunSummary,
}

impl RunState {
    fn new(config: &PipelineConfig) -> Result<Self> {
        Ok(Self {
            policy: config.on_detection_error,
            aggregator: Aggregator::new(config.interval_seconds)?,
            frames: Vec::new(),
            summary: RunSummary::default(),
        })
    }

    fn is_fatal(&self, err: &Error) -> bool {
        match err {
            Error::DetectionFailed { .. } => self.policy == FailurePolicy::Abort,
            _ => true,
        }
    }

    fn absorb(&mut self, timestamp: f64, outcome: Result<Vec<PersonRecord>>) -> Result<()> {
        self.summary.sampled_frames += 1;
        match outcome {
            Ok(people) => {
                debug!(timestamp, detections = people.len(), "frame processed");
                self.summary.total_detections += people.len();
                self.aggregator
                    .add(timestamp, people.iter().map(PersonRecord::geo_point));
                self.frames.push(FrameRecord {
                    timestamp,
                    skipped: false,
                    people,
                });
                Ok(())
            }
            Err(err @ Error::DetectionFailed { .. }) if self.policy == FailurePolicy::Skip => {
                warn!(timestamp, error = %err, reason = "detection_failed", "skipping frame");
                self.summary.skipped_frames += 1;
                self.frames.push(FrameRecord {
                    timestamp,
                    skipped: true,
                    people: Vec::new(),
                });
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn finish(self) -> RunReport {
        let buckets = self.aggregator.finish();
        let mut summary = self.summary;
        summary.buckets = buckets.len();
        info!(
            sampled_frames = summary.sampled_frames,
            skipped_frames = summary.skipped_frames,
            total_detections = summary.total_detections,
            buckets = summary.buckets,
            "run finished"
        );
        RunReport {
            buckets,
            frames: self.frames,
            summary,
        }
    }
}

/// Crop, detect and unproject a single sampled frame.
///
/// Pure with respect to everything but the detector, so frames can be
/// processed in any order.
pub fn process_frame<D: PersonDetector + ?Sized>(
    config: &PipelineConfig,
    frame: &SampledFrame,
    detector: &D,
) -> Result<Vec<PersonRecord>> {
    let normalized = normalize(&frame.image, &config.roi, config.target_size)?;
    let size = normalized.size();
    let detections = detector
        .detect(&normalized, config.confidence)
        .map_err(|e| Error::DetectionFailed {
            timestamp: frame.timestamp,
            source: e.into(),
        })?;
    if let Some(bad) = detections
        .iter()
        .find(|d| !d.is_inside(size.width, size.height))
    {
        return Err(Error::DetectionFailed {
            timestamp: frame.timestamp,
            source: format!("centroid ({}, {}) outside {size} frame", bad.cx, bad.cy).into(),
        });
    }
    Ok(detections
        .iter()
        .map(|d| {
            let (x, y) = to_full_frame(d, &config.roi, size);
            let (lat, lon) = config.calibration.to_geo(x, y);
            PersonRecord { x, y, lat, lon }
        })
        .collect())
}

fn joined<T>(result: std::result::Result<T, JoinError>) -> T {
    match result {
        Ok(v) => v,
        Err(err) => std::panic::resume_unwind(err.into_panic()),
    }
}

type FrameOutcome = (usize, f64, Result<Vec<PersonRecord>>);

/// Video to time-bucketed geo-points.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Validate `config` up front, before any source is touched.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let roi = config.roi;
        Roi::new(roi.x_min, roi.y_min, roi.x_max, roi.y_max)?;
        let positive = |name: &'static str, value: f64| {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(ConfigError::NotPositive { name, value })
            }
        };
        positive("target_fps", config.target_fps)?;
        positive("interval_seconds", config.interval_seconds)?;
        unit_interval("confidence", config.confidence)?;
        if config.target_size.width == 0 || config.target_size.height == 0 {
            return Err(ConfigError::InvalidSize(config.target_size.to_string()).into());
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn prepare<S: VideoSource>(&self, source: S) -> Result<Sampler<S>> {
        if let Some(size) = source.frame_size() {
            self.config.roi.check_within(size)?;
            if size != self.config.calibration.frame_size() {
                warn!(
                    frame = %size,
                    calibration = %self.config.calibration.frame_size(),
                    "calibration frame size differs from the video"
                );
            }
        }
        info!(
            roi = %self.config.roi,
            target_fps = self.config.target_fps,
            target_size = %self.config.target_size,
            frames = source.frame_count(),
            "starting run"
        );
        sample(source, self.config.target_fps)
    }

    /// Process every sampled frame in order on the calling thread.
    #[instrument(level = "debug", skip_all)]
    pub fn run<S, D>(&self, source: S, detector: &D) -> Result<RunReport>
    where
        S: VideoSource,
        D: PersonDetector + ?Sized,
    {
        let sampler = self.prepare(source)?;
        let mut state = RunState::new(&self.config)?;
        for frame in sampler {
            let frame = frame?;
            let outcome = process_frame(&self.config, &frame, detector);
            state.absorb(frame.timestamp, outcome)?;
        }
        Ok(state.finish())
    }

    /// Like [`Pipeline::run`], with up to `workers` frames in detection at once.
    ///
    /// The source is still drained by this task alone. Outcomes are folded
    /// in frame order, so the report, or the error, equals the sequential one.
    /// After a fatal outcome no new frames are started, but frames already in
    /// flight are awaited so that the earliest failure is the one reported.
    #[instrument(level = "debug", skip(self, source, detector))]
    pub async fn run_concurrent<S, D>(
        &self,
        source: S,
        detector: Arc<D>,
        workers: usize,
    ) -> Result<RunReport>
    where
        S: VideoSource,
        D: PersonDetector + Send + Sync + 'static + ?Sized,
    {
        let workers = workers.max(1);
        let sampler = self.prepare(source)?;
        let mut state = RunState::new(&self.config)?;
        let mut tasks: JoinSet<FrameOutcome> = JoinSet::new();
        let mut done: Vec<FrameOutcome> = Vec::new();
        let mut read_error = None;
        let mut aborted = false;

        for frame in sampler {
            let frame = match frame {
                Ok(frame) => frame,
                Err(err) => {
                    read_error = Some(err);
                    break;
                }
            };
            while !aborted && tasks.len() >= workers {
                if let Some(result) = tasks.join_next().await {
                    let outcome = joined(result);
                    aborted = matches!(&outcome, (_, _, Err(err)) if state.is_fatal(err));
                    done.push(outcome);
                }
            }
            if aborted {
                debug!("fatal frame outcome, waiting for frames in flight");
                break;
            }
            let config = self.config;
            let detector = Arc::clone(&detector);
            tasks.spawn_blocking(move || {
                let outcome = process_frame(&config, &frame, &*detector);
                (frame.index, frame.timestamp, outcome)
            });
        }
        while let Some(result) = tasks.join_next().await {
            done.push(joined(result));
        }

        done.sort_by_key(|(index, ..)| *index);
        for (_, timestamp, outcome) in done {
            state.absorb(timestamp, outcome)?;
        }
        if let Some(err) = read_error {
            return Err(err);
        }
        Ok(state.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::util::{calibration, ScriptedDetector};
    use crate::video::MemoryVideo;

    fn config() -> PipelineConfig {
        let mut cfg = PipelineConfig::new(Roi::new(200, 300, 1720, 900).unwrap(), calibration());
        cfg.target_size = FrameSize::new(128, 72);
        cfg
    }

    #[test]
    fn policy_parses() {
        assert_eq!("skip".parse::<FailurePolicy>(), Ok(FailurePolicy::Skip));
        assert_eq!(" ABORT ".parse::<FailurePolicy>(), Ok(FailurePolicy::Abort));
        assert!("retry".parse::<FailurePolicy>().is_err());
    }

    #[test]
    fn new_rejects_bad_config() {
        let mut cfg = config();
        cfg.roi.x_max = cfg.roi.x_min;
        assert!(Pipeline::new(cfg).unwrap_err().is_invalid_roi());

        let mut cfg = config();
        cfg.target_fps = 0.0;
        assert!(matches!(Pipeline::new(cfg), Err(Error::Config(_))));

        let mut cfg = config();
        cfg.interval_seconds = -1.0;
        assert!(Pipeline::new(cfg).is_err());

        let mut cfg = config();
        cfg.confidence = f32::NAN;
        assert!(matches!(
            Pipeline::new(cfg),
            Err(Error::Config(ConfigError::OutOfRange { .. }))
        ));
    }

    #[test]
    fn roi_is_checked_before_reading() {
        let pipeline = Pipeline::new(config()).unwrap();
        // Reading frame 0 would fail, so an InvalidRoi proves the check ran first.
        let video = MemoryVideo::blank(30.0, 3, 640, 480).failing_at(0);
        let detector = ScriptedDetector::empty();
        let err = pipeline.run(video, &detector).unwrap_err();
        assert!(matches!(err, Error::InvalidRoi { .. }));
        assert_eq!(detector.calls(), 0);
    }

    #[test]
    fn centroids_outside_the_frame_are_malformed() {
        let mut cfg = config();
        cfg.on_detection_error = FailurePolicy::Abort;
        let pipeline = Pipeline::new(cfg).unwrap();
        let video = MemoryVideo::blank(2.0, 1, 1920, 1080);
        let detector = ScriptedDetector::repeating(vec![(128.0, 10.0)]);
        let err = pipeline.run(video, &detector).unwrap_err();
        assert!(matches!(err, Error::DetectionFailed { .. }));
    }

    #[test]
    fn frame_records_carry_full_frame_positions() {
        let pipeline = Pipeline::new(config()).unwrap();
        let video = MemoryVideo::blank(2.0, 1, 1920, 1080);
        let detector = ScriptedDetector::repeating(vec![(64.0, 36.0)]);
        let report = pipeline.run(video, &detector).unwrap();
        let person = report.frames[0].people[0];
        assert!((person.x - 960.0).abs() < 1e-9);
        assert!((person.y - 600.0).abs() < 1e-9);
    }
}
