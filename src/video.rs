// Sequential video sources and the frame sampler

pub mod image_sequence;
pub mod memory;
#[cfg(feature = "opencv")]
pub mod capture;

use std::path::Path;

use image::RgbImage;
use tracing::{debug, instrument, trace};

use crate::error::{ConfigError, Error, Result};
use crate::geometry::FrameSize;

pub use image_sequence::ImageSequence;
pub use memory::MemoryVideo;

/// An opened, finite, sequentially readable sequence of frames.
///
/// A source is read by exactly one consumer and is released when dropped.
pub trait VideoSource {
    fn fps(&self) -> f64;
    fn frame_count(&self) -> usize;
    /// Size of every frame, or `None` when the source holds no frames.
    fn frame_size(&self) -> Option<FrameSize>;
    /// Read the next frame in order; `Ok(None)` once the source is drained.
    fn read_frame(&mut self) -> Result<Option<RgbImage>>;
}

impl<S: VideoSource + ?Sized> VideoSource for Box<S> {
    fn fps(&self) -> f64 {
        (**self).fps()
    }
    fn frame_count(&self) -> usize {
        (**self).frame_count()
    }
    fn frame_size(&self) -> Option<FrameSize> {
        (**self).frame_size()
    }
    fn read_frame(&mut self) -> Result<Option<RgbImage>> {
        (**self).read_frame()
    }
}

/// Open `path` as a video.
///
/// Directories and glob patterns are read as image sequences at `fps`.
/// With the `opencv` feature, any other file is decoded as a video
/// container and `fps` is ignored in favour of the container's rate.
pub fn open_video(path: &Path, fps: f64) -> Result<Box<dyn VideoSource + Send>> {
    if path.is_file() && !image_sequence::is_image_file(path) {
        return open_container(path);
    }
    Ok(Box::new(ImageSequence::open(path, fps)?))
}

#[cfg(feature = "opencv")]
fn open_container(path: &Path) -> Result<Box<dyn VideoSource + Send>> {
    Ok(Box::new(capture::OpencvVideo::open(path)?))
}

#[cfg(not(feature = "opencv"))]
fn open_container(path: &Path) -> Result<Box<dyn VideoSource + Send>> {
    Err(Error::SourceUnavailable {
        path: path.to_path_buf(),
        reason: "video containers need the opencv feature".into(),
    })
}

/// A frame selected by the sampler.
#[derive(Debug, Clone)]
pub struct SampledFrame {
    /// Zero-based index of the frame in the source.
    pub index: usize,
    /// Seconds since the start of the video, `index / fps`.
    pub timestamp: f64,
    pub image: RgbImage,
}

/// Number of source frames between two sampled frames.
pub fn stride(fps: f64, target_fps: f64) -> usize {
    let ratio = (fps / target_fps).round();
    if ratio >= 1.0 {
        ratio as usize
    } else {
        1
    }
}

/// Lazily yields every `stride`-th frame of a source.
///
/// Not restartable; the source is released when the sampler is dropped.
pub struct Sampler<S> {
    source: S,
    fps: f64,
    stride: usize,
    next_index: usize,
    done: bool,
}

impl<S: VideoSource> Sampler<S> {
    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}

/// Sample `source` at approximately `target_fps` frames per second.
#[instrument(level = "debug", skip(source))]
pub fn sample<S: VideoSource>(source: S, target_fps: f64) -> Result<Sampler<S>> {
    if !(target_fps.is_finite() && target_fps > 0.0) {
        return Err(ConfigError::NotPositive {
            name: "target_fps",
            value: target_fps,
        }
        .into());
    }
    let fps = source.fps();
    if !(fps.is_finite() && fps > 0.0) {
        return Err(Error::Config(ConfigError::NotPositive {
            name: "source fps",
            value: fps,
        }));
    }
    let stride = stride(fps, target_fps);
    debug!(fps, stride, frame_count = source.frame_count(), "sampling video");
    Ok(Sampler {
        source,
        fps,
        stride,
        next_index: 0,
        done: false,
    })
}

impl<S: VideoSource> Iterator for Sampler<S> {
    type Item = Result<SampledFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let index = self.next_index;
            match self.source.read_frame() {
                Ok(Some(image)) => {
                    self.next_index += 1;
                    if index % self.stride == 0 {
                        let timestamp = index as f64 / self.fps;
                        trace!(index, timestamp, "sampled frame");
                        return Some(Ok(SampledFrame {
                            index,
                            timestamp,
                            image,
                        }));
                    }
                }
                Ok(None) => self.done = true,
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            }
        }
        None
    }
}
