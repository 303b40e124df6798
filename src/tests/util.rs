use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use anyhow::{anyhow, Result};
use image::{Rgb, RgbImage};

use crate::crop::NormalizedFrame;
use crate::detect::{Detection, PersonDetector};
use crate::geometry::GeoCalibration;

pub use crate::video::MemoryVideo;

/// The downtown Austin calibration used throughout the tests.
pub fn calibration() -> GeoCalibration {
    GeoCalibration {
        lat_min: 30.268290,
        lon_min: -97.776875,
        lat_max: 30.265068,
        lon_max: -97.765652,
        frame_width: 1920,
        frame_height: 1080,
    }
}

/// One scripted detector response.
#[derive(Debug, Clone)]
pub enum Step {
    People(Vec<(f32, f32)>),
    Fail(&'static str),
}

/// Returns canned detections, one script step per call.
///
/// Once the script runs out every call returns `fallback`.
pub struct ScriptedDetector {
    script: Mutex<VecDeque<Step>>,
    fallback: Vec<Detection>,
    calls: AtomicUsize,
}

impl ScriptedDetector {
    pub fn new(script: Vec<Step>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: Vec::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn repeating(points: Vec<(f32, f32)>) -> Self {
        let mut det = Self::empty();
        det.fallback = to_detections(&points);
        det
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn to_detections(points: &[(f32, f32)]) -> Vec<Detection> {
    points
        .iter()
        .map(|&(cx, cy)| Detection { cx, cy })
        .collect()
}

impl PersonDetector for ScriptedDetector {
    fn detect(&self, _frame: &NormalizedFrame, _confidence: f32) -> Result<Vec<Detection>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match step {
            Some(Step::People(points)) => Ok(to_detections(&points)),
            Some(Step::Fail(reason)) => Err(anyhow!(reason)),
            None => Ok(self.fallback.clone()),
        }
    }
}

/// Reads the answer out of the frame itself, so results do not depend on
/// call order.
///
/// The red channel of the top-left pixel is the number of people, placed
/// on a diagonal; a green channel of 255 makes the call fail.
pub struct EncodedDetector;

impl PersonDetector for EncodedDetector {
    fn detect(&self, frame: &NormalizedFrame, _confidence: f32) -> Result<Vec<Detection>> {
        let px = frame.image().get_pixel(0, 0);
        if px[1] == 255 {
            return Err(anyhow!("encoded failure"));
        }
        Ok((0..px[0])
            .map(|i| Detection {
                cx: 2.0 + f32::from(i) * 4.0,
                cy: 1.0 + f32::from(i) * 2.0,
            })
            .collect())
    }
}

/// A uniform frame understood by [`EncodedDetector`].
pub fn encoded_frame(width: u32, height: u32, people: u8, fail: bool) -> RgbImage {
    RgbImage::from_pixel(width, height, Rgb([people, if fail { 255 } else { 0 }, 0]))
}
