use std::collections::VecDeque;

use image::{Rgb, RgbImage};

use super::VideoSource;
use crate::error::{Error, Result};
use crate::geometry::FrameSize;

/// Frames held in memory, mostly useful for tests and previews.
pub struct MemoryVideo {
    fps: f64,
    frame_count: usize,
    size: Option<FrameSize>,
    frames: VecDeque<RgbImage>,
    next: usize,
    fail_at: Option<usize>,
}

impl MemoryVideo {
    pub fn new(fps: f64, frames: Vec<RgbImage>) -> Self {
        let size = frames
            .first()
            .map(|f| FrameSize::new(f.width(), f.height()));
        Self {
            fps,
            frame_count: frames.len(),
            size,
            frames: frames.into(),
            next: 0,
            fail_at: None,
        }
    }

    /// `count` black frames of `width` x `height`.
    pub fn blank(fps: f64, count: usize, width: u32, height: u32) -> Self {
        let frames = (0..count)
            .map(|_| RgbImage::from_pixel(width, height, Rgb([0, 0, 0])))
            .collect();
        let mut video = Self::new(fps, frames);
        video.size = Some(FrameSize::new(width, height));
        video
    }

    /// Make reading the frame at `index` fail with a decode error.
    pub fn failing_at(mut self, index: usize) -> Self {
        self.fail_at = Some(index);
        self
    }
}

impl VideoSource for MemoryVideo {
    fn fps(&self) -> f64 {
        self.fps
    }

    fn frame_count(&self) -> usize {
        self.frame_count
    }

    fn frame_size(&self) -> Option<FrameSize> {
        self.size
    }

    fn read_frame(&mut self) -> Result<Option<RgbImage>> {
        if self.fail_at == Some(self.next) {
            return Err(Error::Decode {
                frame_index: self.next,
                reason: "simulated decode failure".to_string(),
            });
        }
        let frame = self.frames.pop_front();
        if frame.is_some() {
            self.next += 1;
        }
        Ok(frame)
    }
}
