use image::imageops::{self, FilterType};
use image::RgbImage;
use tracing::{instrument, trace};

use crate::error::Result;
use crate::geometry::{FrameSize, Roi};

/// The ROI crop of a frame, resized to the detector's resolution.
///
/// Pixel coordinates in this image are neither ROI nor full-frame
/// coordinates; see [`crate::geometry::to_full_frame`].
#[derive(Debug, Clone)]
pub struct NormalizedFrame {
    image: RgbImage,
}

impl NormalizedFrame {
    pub fn new(image: RgbImage) -> Self {
        Self { image }
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn size(&self) -> FrameSize {
        FrameSize::new(self.image.width(), self.image.height())
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }
}

/// Crop `frame` to `roi` and bilinearly resize the crop to `target`.
///
/// The aspect ratio is not preserved.
#[instrument(level = "trace", skip(frame))]
pub fn normalize(frame: &RgbImage, roi: &Roi, target: FrameSize) -> Result<NormalizedFrame> {
    roi.check_within(FrameSize::new(frame.width(), frame.height()))?;
    let crop =
        imageops::crop_imm(frame, roi.x_min, roi.y_min, roi.width(), roi.height()).to_image();
    let resized = imageops::resize(&crop, target.width, target.height, FilterType::Triangle);
    trace!(crop = %FrameSize::new(roi.width(), roi.height()), %target, "normalized frame");
    Ok(NormalizedFrame::new(resized))
}
