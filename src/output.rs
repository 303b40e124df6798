use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use tracing::{debug, instrument};

use crate::aggregate::TimeBuckets;
use crate::error::{Error, Result};
use crate::pipeline::FrameRecord;

/// Write `value` as pretty JSON, replacing `path` atomically.
///
/// The data goes to a temporary file next to `path` first, so a failure
/// never leaves a truncated artifact behind.
#[instrument(level = "debug", skip(value), fields(path = %path.display()))]
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let fail = |source: std::io::Error| Error::Serialization {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let tmp = tempfile::NamedTempFile::new_in(dir).map_err(fail)?;
    {
        let mut writer = BufWriter::new(tmp.as_file());
        serde_json::to_writer_pretty(&mut writer, value).map_err(|e| fail(e.into()))?;
        writer.write_all(b"\n").map_err(fail)?;
        writer.flush().map_err(fail)?;
    }
    tmp.persist(path).map_err(|e| fail(e.error))?;
    debug!("wrote artifact");
    Ok(())
}

/// Persist the bucketed heatmap data.
pub fn write_buckets(path: &Path, buckets: &TimeBuckets) -> Result<()> {
    write_json(path, buckets)
}

/// Persist the per-frame detection log.
pub fn write_frames(path: &Path, frames: &[FrameRecord]) -> Result<()> {
    write_json(path, frames)
}

/// Load a bucket artifact written by [`write_buckets`].
pub fn read_buckets(path: &Path) -> anyhow::Result<TimeBuckets> {
    let file = File::open(path)?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::GeoPoint;

    #[test]
    fn empty_mapping_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("detections.json");
        write_buckets(&path, &TimeBuckets::new()).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap().trim(), "{}");
        assert!(read_buckets(&path).unwrap().is_empty());
    }

    #[test]
    fn keys_are_written_in_numeric_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("detections.json");
        let mut buckets = TimeBuckets::new();
        buckets.push(10, GeoPoint::new(1.0, 2.0));
        buckets.push(9, GeoPoint::new(3.0, 4.0));
        buckets.push(2, GeoPoint::new(5.0, 6.0));
        write_buckets(&path, &buckets).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let first = text.find("\"2\"").unwrap();
        let second = text.find("\"9\"").unwrap();
        let third = text.find("\"10\"").unwrap();
        assert!(first < second && second < third);
        assert_eq!(read_buckets(&path).unwrap(), buckets);
    }

    #[test]
    fn unwritable_destination_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("detections.json");
        let err = write_buckets(&path, &TimeBuckets::new()).unwrap_err();
        match err {
            Error::Serialization { path: p, .. } => assert_eq!(p, path),
            other => panic!("unexpected error {other:?}"),
        }
        assert!(!path.exists());
    }
}
