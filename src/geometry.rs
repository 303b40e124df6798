use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::detect::Detection;
use crate::error::{ConfigError, Error, Result, RoiProblem};

/// Width and height of an image, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for FrameSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for FrameSize {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidSize(s.to_string());
        let (w, h) = s.trim().split_once(['x', 'X']).ok_or_else(invalid)?;
        let width: u32 = w.trim().parse().map_err(|_| invalid())?;
        let height: u32 = h.trim().parse().map_err(|_| invalid())?;
        if width == 0 || height == 0 {
            return Err(invalid());
        }
        Ok(Self { width, height })
    }
}

/// Rectangular region of a full frame, half-open on the max bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Roi {
    pub x_min: u32,
    pub y_min: u32,
    pub x_max: u32,
    pub y_max: u32,
}

impl Roi {
    /// Build a region, rejecting empty or inverted rectangles.
    pub fn new(x_min: u32, y_min: u32, x_max: u32, y_max: u32) -> Result<Self> {
        if x_min >= x_max || y_min >= y_max {
            return Err(Error::InvalidRoi {
                roi: Self {
                    x_min,
                    y_min,
                    x_max,
                    y_max,
                },
                problem: RoiProblem::Empty,
            });
        }
        Ok(Self {
            x_min,
            y_min,
            x_max,
            y_max,
        })
    }

    pub fn width(&self) -> u32 {
        self.x_max.saturating_sub(self.x_min)
    }

    pub fn height(&self) -> u32 {
        self.y_max.saturating_sub(self.y_min)
    }

    /// Check that the region is non-empty and lies fully inside `frame`.
    pub fn check_within(&self, frame: FrameSize) -> Result<()> {
        let fits = self.x_min < self.x_max
            && self.y_min < self.y_max
            && self.x_max <= frame.width
            && self.y_max <= frame.height;
        if fits {
            Ok(())
        } else {
            Err(Error::InvalidRoi {
                roi: *self,
                problem: RoiProblem::OutsideFrame(frame),
            })
        }
    }
}

impl fmt::Display for Roi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({},{})-({},{})",
            self.x_min, self.y_min, self.x_max, self.y_max
        )
    }
}

impl FromStr for Roi {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let values: Vec<u32> = parse_list(s, 4)?;
        Roi::new(values[0], values[1], values[2], values[3])
    }
}

/// Linear mapping from full-frame pixels to latitude/longitude.
///
/// Latitude follows the vertical pixel axis and longitude the horizontal
/// one. `lat_max` may be smaller than `lat_min` (and likewise for
/// longitude) when the camera looks "backwards" along an axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoCalibration {
    pub lat_min: f64,
    pub lon_min: f64,
    pub lat_max: f64,
    pub lon_max: f64,
    pub frame_width: u32,
    pub frame_height: u32,
}

impl GeoCalibration {
    pub fn frame_size(&self) -> FrameSize {
        FrameSize::new(self.frame_width, self.frame_height)
    }

    /// Map a full-frame pixel position to `(lat, lon)`.
    pub fn to_geo(&self, x_full: f64, y_full: f64) -> (f64, f64) {
        let lat = self.lat_min
            + (y_full / f64::from(self.frame_height)) * (self.lat_max - self.lat_min);
        let lon =
            self.lon_min + (x_full / f64::from(self.frame_width)) * (self.lon_max - self.lon_min);
        (lat, lon)
    }
}

impl FromStr for GeoCalibration {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 6 {
            return Err(ConfigError::WrongArity {
                expected: 6,
                got: s.to_string(),
            });
        }
        let float = |v: &str| {
            v.parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .ok_or_else(|| ConfigError::InvalidNumber(v.to_string()))
        };
        let pixels = |v: &str| {
            v.parse::<u32>()
                .ok()
                .filter(|&p| p > 0)
                .ok_or_else(|| ConfigError::InvalidNumber(v.to_string()))
        };
        Ok(Self {
            lat_min: float(parts[0])?,
            lon_min: float(parts[1])?,
            lat_max: float(parts[2])?,
            lon_max: float(parts[3])?,
            frame_width: pixels(parts[4])?,
            frame_height: pixels(parts[5])?,
        })
    }
}

fn parse_list<T: FromStr>(s: &str, expected: usize) -> std::result::Result<Vec<T>, ConfigError> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    if parts.len() != expected {
        return Err(ConfigError::WrongArity {
            expected,
            got: s.to_string(),
        });
    }
    parts
        .into_iter()
        .map(|p| {
            p.parse::<T>()
                .map_err(|_| ConfigError::InvalidNumber(p.to_string()))
        })
        .collect()
}

/// A weighted geographic observation, one per detected person.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
    pub weight: u32,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self {
            lat,
            lon,
            weight: 1,
        }
    }
}

/// Rescale a centroid from normalized-frame space into full-frame pixels.
pub fn to_full_frame(detection: &Detection, roi: &Roi, normalized: FrameSize) -> (f64, f64) {
    let sx = f64::from(roi.width()) / f64::from(normalized.width);
    let sy = f64::from(roi.height()) / f64::from(normalized.height);
    let x = f64::from(detection.cx) * sx + f64::from(roi.x_min);
    let y = f64::from(detection.cy) * sy + f64::from(roi.y_min);
    (x, y)
}

/// Map a detection in normalized-frame space to a geographic point.
pub fn unproject(
    detection: &Detection,
    roi: &Roi,
    normalized: FrameSize,
    calibration: &GeoCalibration,
) -> GeoPoint {
    let (x, y) = to_full_frame(detection, roi, normalized);
    let (lat, lon) = calibration.to_geo(x, y);
    trace!(x, y, lat, lon, "unprojected detection");
    GeoPoint::new(lat, lon)
}
