// Person detection capability consumed by the pipeline

pub mod config;
pub mod onnx;

pub use config::DetectorConfig;
pub use onnx::OnnxDetector;

use crate::crop::NormalizedFrame;

/// A person centroid in normalized-frame pixel space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub cx: f32,
    pub cy: f32,
}

impl Detection {
    /// Whether the centroid is finite and inside `[0, w) x [0, h)`.
    pub fn is_inside(&self, width: u32, height: u32) -> bool {
        self.cx.is_finite()
            && self.cy.is_finite()
            && self.cx >= 0.0
            && self.cy >= 0.0
            && self.cx < width as f32
            && self.cy < height as f32
    }
}

/// Anything that can find people in a normalized frame.
///
/// Implementations own the model, category filtering and confidence
/// thresholding; the pipeline only consumes the centroids.
pub trait PersonDetector {
    fn detect(&self, frame: &NormalizedFrame, confidence: f32) -> anyhow::Result<Vec<Detection>>;
}

impl<D: PersonDetector + ?Sized> PersonDetector for &D {
    fn detect(&self, frame: &NormalizedFrame, confidence: f32) -> anyhow::Result<Vec<Detection>> {
        (**self).detect(frame, confidence)
    }
}

impl<D: PersonDetector + ?Sized> PersonDetector for std::sync::Arc<D> {
    fn detect(&self, frame: &NormalizedFrame, confidence: f32) -> anyhow::Result<Vec<Detection>> {
        (**self).detect(frame, confidence)
    }
}
