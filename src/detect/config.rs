use std::env;

use crate::config::parse_env;
use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq)]
pub struct DetectorConfig {
    pub model_path: String,
    pub confidence: f32,
    pub input_size: u32,
    pub iou_threshold: f32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_path: "yolov8s.onnx".to_string(),
            confidence: 0.05,
            input_size: 640,
            iou_threshold: 0.7,
        }
    }
}

impl DetectorConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            model_path: env::var("YOLO_MODEL").unwrap_or(defaults.model_path),
            confidence: parse_env("YOLO_CONFIDENCE")?.unwrap_or(defaults.confidence),
            input_size: parse_env("YOLO_INPUT_SIZE")?.unwrap_or(defaults.input_size),
            iou_threshold: parse_env("YOLO_IOU_THRESHOLD")?.unwrap_or(defaults.iou_threshold),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject thresholds outside `[0, 1]` (NaN included) and an empty model input.
    pub fn validate(&self) -> Result<(), ConfigError> {
        unit_interval("YOLO_CONFIDENCE", self.confidence)?;
        unit_interval("YOLO_IOU_THRESHOLD", self.iou_threshold)?;
        if self.input_size == 0 {
            return Err(ConfigError::NotPositive {
                name: "YOLO_INPUT_SIZE",
                value: 0.0,
            });
        }
        Ok(())
    }
}

pub(crate) fn unit_interval(name: &'static str, value: f32) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            name,
            value: f64::from(value),
        })
    }
}
