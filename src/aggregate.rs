use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{ConfigError, Result};
use crate::geometry::GeoPoint;

/// Index of the `interval`-wide time bucket containing `timestamp`.
pub fn bucket_key(timestamp: f64, interval: f64) -> u64 {
    debug_assert!(timestamp >= 0.0);
    (timestamp / interval).floor() as u64
}

/// Geo-points grouped by time bucket, iterated in ascending key order.
///
/// Only buckets that received at least one point exist.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeBuckets(BTreeMap<u64, Vec<GeoPoint>>);

impl TimeBuckets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: u64, point: GeoPoint) {
        self.0.entry(key).or_default().push(point);
    }

    pub fn get(&self, key: u64) -> Option<&[GeoPoint]> {
        self.0.get(&key).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, &[GeoPoint])> {
        self.0.iter().map(|(k, v)| (*k, v.as_slice()))
    }

    pub fn keys(&self) -> impl Iterator<Item = u64> + '_ {
        self.0.keys().copied()
    }

    /// Number of non-empty buckets.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn total_points(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    /// Fold another partial mapping into this one.
    pub fn merge(&mut self, other: TimeBuckets) {
        for (key, mut points) in other.0 {
            self.0.entry(key).or_default().append(&mut points);
        }
    }
}

/// Accumulates timestamped points into fixed-width buckets.
#[derive(Debug, Clone)]
pub struct Aggregator {
    interval: f64,
    buckets: TimeBuckets,
}

impl Aggregator {
    pub fn new(interval: f64) -> Result<Self> {
        if !(interval.is_finite() && interval > 0.0) {
            return Err(ConfigError::NotPositive {
                name: "interval_seconds",
                value: interval,
            }
            .into());
        }
        Ok(Self {
            interval,
            buckets: TimeBuckets::new(),
        })
    }

    pub fn interval(&self) -> f64 {
        self.interval
    }

    pub fn add<I>(&mut self, timestamp: f64, points: I)
    where
        I: IntoIterator<Item = GeoPoint>,
    {
        let key = bucket_key(timestamp, self.interval);
        let mut added = 0usize;
        for point in points {
            self.buckets.push(key, point);
            added += 1;
        }
        trace!(timestamp, bucket = key, added, "aggregated points");
    }

    pub fn buckets(&self) -> &TimeBuckets {
        &self.buckets
    }

    pub fn finish(self) -> TimeBuckets {
        self.buckets
    }
}

/// Group timestamp-tagged points in a single pass.
pub fn aggregate<I>(points: I, interval: f64) -> Result<TimeBuckets>
where
    I: IntoIterator<Item = (f64, GeoPoint)>,
{
    let mut agg = Aggregator::new(interval)?;
    for (timestamp, point) in points {
        agg.add(timestamp, Some(point));
    }
    Ok(agg.finish())
}
