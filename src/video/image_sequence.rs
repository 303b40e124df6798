use std::path::{Path, PathBuf};

use image::RgbImage;
use tracing::{debug, instrument};

use super::VideoSource;
use crate::error::{ConfigError, Error, Result};
use crate::geometry::FrameSize;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

pub(crate) fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn has_glob_chars(path: &Path) -> bool {
    path.to_string_lossy().contains(['*', '?', '['])
}

/// A video stored as one image file per frame.
///
/// Frames are ordered by file name. An existing directory without any
/// images is a valid zero-frame video; a pattern matching nothing is not.
pub struct ImageSequence {
    paths: Vec<PathBuf>,
    fps: f64,
    size: Option<FrameSize>,
    next: usize,
}

impl ImageSequence {
    /// Open a directory of frames or a glob pattern such as `frames/*.png`.
    #[instrument(level = "debug", skip(path), fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>, fps: f64) -> Result<Self> {
        let path = path.as_ref();
        if !(fps.is_finite() && fps > 0.0) {
            return Err(ConfigError::NotPositive { name: "fps", value: fps }.into());
        }
        let unavailable = |reason: String| Error::SourceUnavailable {
            path: path.to_path_buf(),
            reason,
        };

        let mut paths = if path.is_dir() {
            std::fs::read_dir(path)
                .map_err(|e| unavailable(e.to_string()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && is_image_file(p))
                .collect::<Vec<_>>()
        } else if path.is_file() {
            if !is_image_file(path) {
                return Err(unavailable(
                    "not an image sequence; video containers need the opencv feature".into(),
                ));
            }
            vec![path.to_path_buf()]
        } else if has_glob_chars(path) {
            let pattern = path.to_string_lossy();
            let matches = glob::glob(&pattern)
                .map_err(|e| unavailable(e.to_string()))?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| unavailable(e.to_string()))?;
            if matches.is_empty() {
                return Err(unavailable("pattern matched no files".into()));
            }
            matches
        } else {
            return Err(unavailable("no such file or directory".into()));
        };
        paths.sort();

        let size = match paths.first() {
            Some(first) => {
                let (width, height) =
                    image::image_dimensions(first).map_err(|e| unavailable(e.to_string()))?;
                Some(FrameSize::new(width, height))
            }
            None => None,
        };
        debug!(frames = paths.len(), ?size, "opened image sequence");
        Ok(Self {
            paths,
            fps,
            size,
            next: 0,
        })
    }
}

impl VideoSource for ImageSequence {
    fn fps(&self) -> f64 {
        self.fps
    }

    fn frame_count(&self) -> usize {
        self.paths.len()
    }

    fn frame_size(&self) -> Option<FrameSize> {
        self.size
    }

    fn read_frame(&mut self) -> Result<Option<RgbImage>> {
        let Some(path) = self.paths.get(self.next) else {
            return Ok(None);
        };
        let frame_index = self.next;
        let image = image::open(path).map_err(|e| Error::Decode {
            frame_index,
            reason: format!("{}: {e}", path.display()),
        })?;
        self.next += 1;
        Ok(Some(image.to_rgb8()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn write_frames(dir: &Path, count: usize) {
        for i in 0..count {
            RgbImage::from_pixel(8, 6, Rgb([i as u8, 0, 0]))
                .save(dir.join(format!("frame_{i:04}.png")))
                .unwrap();
        }
    }

    #[test]
    fn directory_frames_are_sorted() {
        let dir = tempfile::tempdir().unwrap();
        write_frames(dir.path(), 3);
        std::fs::write(dir.path().join("notes.txt"), "skip me").unwrap();

        let mut seq = ImageSequence::open(dir.path(), 30.0).unwrap();
        assert_eq!(seq.frame_count(), 3);
        assert_eq!(seq.frame_size(), Some(FrameSize::new(8, 6)));
        for i in 0..3 {
            let frame = seq.read_frame().unwrap().unwrap();
            assert_eq!(frame.get_pixel(0, 0)[0], i as u8);
        }
        assert!(seq.read_frame().unwrap().is_none());
    }

    #[test]
    fn glob_pattern() {
        let dir = tempfile::tempdir().unwrap();
        write_frames(dir.path(), 4);
        let seq = ImageSequence::open(dir.path().join("frame_000[0-1].png"), 30.0).unwrap();
        assert_eq!(seq.frame_count(), 2);
    }

    #[test]
    fn empty_directory_is_an_empty_video() {
        let dir = tempfile::tempdir().unwrap();
        let seq = ImageSequence::open(dir.path(), 30.0).unwrap();
        assert_eq!(seq.frame_count(), 0);
        assert_eq!(seq.frame_size(), None);
    }

    #[test]
    fn missing_inputs_are_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let missing = ImageSequence::open(dir.path().join("nope"), 30.0);
        assert!(matches!(missing, Err(Error::SourceUnavailable { .. })));

        let no_match = ImageSequence::open(dir.path().join("*.png"), 30.0);
        assert!(matches!(no_match, Err(Error::SourceUnavailable { .. })));

        let movie = dir.path().join("clip.mov");
        std::fs::write(&movie, b"not really a movie").unwrap();
        assert!(matches!(
            ImageSequence::open(&movie, 30.0),
            Err(Error::SourceUnavailable { .. })
        ));
    }
}
