use std::env;
use std::str::FromStr;

use crate::detect::DetectorConfig;
use crate::error::{ConfigError, Result};
use crate::geometry::{GeoCalibration, Roi};
use crate::pipeline::PipelineConfig;

fn var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(name: &'static str) -> std::result::Result<String, ConfigError> {
    var(name).ok_or(ConfigError::Missing(name))
}

/// Parse an optional numeric environment variable.
pub(crate) fn parse_env<T: FromStr>(name: &str) -> std::result::Result<Option<T>, ConfigError> {
    match var(name) {
        Some(v) => v.parse().map(Some).map_err(|_| ConfigError::InvalidNumber(v)),
        None => Ok(None),
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub pipeline: PipelineConfig,
    pub detector: DetectorConfig,
    pub workers: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let roi: Roi = required("CROWDMAP_ROI")?.parse()?;
        let calibration: GeoCalibration = required("CROWDMAP_CALIBRATION")?.parse()?;
        let detector = DetectorConfig::from_env()?;

        let mut pipeline = PipelineConfig::new(roi, calibration);
        if let Some(fps) = parse_env("CROWDMAP_TARGET_FPS")? {
            pipeline.target_fps = fps;
        }
        if let Some(size) = var("CROWDMAP_TARGET_SIZE") {
            pipeline.target_size = size.parse()?;
        }
        if let Some(interval) = parse_env("CROWDMAP_INTERVAL_SECONDS")? {
            pipeline.interval_seconds = interval;
        }
        if let Some(policy) = var("CROWDMAP_ON_DETECTION_ERROR") {
            pipeline.on_detection_error = policy.parse()?;
        }
        pipeline.confidence = detector.confidence;

        let workers = parse_env::<usize>("CROWDMAP_WORKERS")?.unwrap_or(1).max(1);
        Ok(Self {
            pipeline,
            detector,
            workers,
        })
    }
}
