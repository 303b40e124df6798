use std::path::{Path, PathBuf};

use image::RgbImage;
use opencv::{
    core::{AlgorithmHint, Mat},
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture},
};
use tracing::{debug, instrument};

use super::VideoSource;
use crate::error::{Error, Result};
use crate::geometry::FrameSize;

/// A video container decoded by OpenCV.
pub struct OpencvVideo {
    cap: VideoCapture,
    fps: f64,
    frame_count: usize,
    size: FrameSize,
    next: usize,
}

impl OpencvVideo {
    #[instrument(level = "debug", fields(path = %path.display()))]
    pub fn open(path: &Path) -> Result<Self> {
        let unavailable = |reason: String| Error::SourceUnavailable {
            path: PathBuf::from(path),
            reason,
        };
        let name = path
            .to_str()
            .ok_or_else(|| unavailable("path is not valid UTF-8".into()))?;
        let cap = VideoCapture::from_file(name, videoio::CAP_ANY)
            .map_err(|e| unavailable(e.to_string()))?;
        if !cap.is_opened().map_err(|e| unavailable(e.to_string()))? {
            return Err(unavailable("could not open video".into()));
        }

        let prop = |id: i32| cap.get(id).map_err(|e| unavailable(e.to_string()));
        let fps = prop(videoio::CAP_PROP_FPS)?;
        if !(fps.is_finite() && fps > 0.0) {
            return Err(unavailable(format!("container reports {fps} fps")));
        }
        let frame_count = prop(videoio::CAP_PROP_FRAME_COUNT)?.max(0.0) as usize;
        let size = FrameSize::new(
            prop(videoio::CAP_PROP_FRAME_WIDTH)? as u32,
            prop(videoio::CAP_PROP_FRAME_HEIGHT)? as u32,
        );
        debug!(fps, frame_count, %size, "opened video");
        Ok(Self {
            cap,
            fps,
            frame_count,
            size,
            next: 0,
        })
    }
}

impl VideoSource for OpencvVideo {
    fn fps(&self) -> f64 {
        self.fps
    }

    fn frame_count(&self) -> usize {
        self.frame_count
    }

    fn frame_size(&self) -> Option<FrameSize> {
        (self.size.width > 0 && self.size.height > 0).then_some(self.size)
    }

    fn read_frame(&mut self) -> Result<Option<RgbImage>> {
        let frame_index = self.next;
        let decode = |e: opencv::Error| Error::Decode {
            frame_index,
            reason: e.to_string(),
        };
        let mut bgr = Mat::default();
        if !self.cap.read(&mut bgr).map_err(decode)? || bgr.empty() {
            return Ok(None);
        }
        let mut rgb = Mat::default();
        imgproc::cvt_color(
            &bgr,
            &mut rgb,
            imgproc::COLOR_BGR2RGB,
            0,
            AlgorithmHint::ALGO_HINT_DEFAULT,
        )
        .map_err(decode)?;
        let (width, height) = (rgb.cols() as u32, rgb.rows() as u32);
        let data = rgb.data_bytes().map_err(decode)?.to_vec();
        let image = RgbImage::from_vec(width, height, data).ok_or_else(|| Error::Decode {
            frame_index,
            reason: "frame buffer size mismatch".into(),
        })?;
        self.next += 1;
        Ok(Some(image))
    }
}
