use std::path::PathBuf;

use crate::geometry::{FrameSize, Roi};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("video source {path} unavailable: {reason}")]
    SourceUnavailable { path: PathBuf, reason: String },
    #[error("invalid region of interest {roi}: {problem}")]
    InvalidRoi { roi: Roi, problem: RoiProblem },
    #[error("failed to decode frame {frame_index}: {reason}")]
    Decode { frame_index: usize, reason: String },
    #[error("person detection failed at {timestamp:.3}s: {source}")]
    DetectionFailed {
        timestamp: f64,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
    #[error("failed to write {path}: {source}")]
    Serialization {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{0}")]
    Config(#[from] ConfigError),
}

/// Why a region of interest was rejected.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoiProblem {
    #[error("empty rectangle")]
    Empty,
    #[error("does not fit inside a {0} frame")]
    OutsideFrame(FrameSize),
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("expected {expected} comma separated values, got {got:?}")]
    WrongArity { expected: usize, got: String },
    #[error("invalid number {0:?}")]
    InvalidNumber(String),
    #[error("invalid frame size {0:?}, expected WIDTHxHEIGHT")]
    InvalidSize(String),
    #[error("{name} must be positive, got {value}")]
    NotPositive { name: &'static str, value: f64 },
    #[error("{name} must be between 0 and 1, got {value}")]
    OutOfRange { name: &'static str, value: f64 },
    #[error("unknown detection failure policy {0:?}, expected skip or abort")]
    UnknownPolicy(String),
}

impl Error {
    pub fn is_invalid_roi(&self) -> bool {
        matches!(self, Error::InvalidRoi { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
