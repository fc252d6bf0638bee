//! Open-interval density reconstruction
//!
//! Each target's series is a prefix sum over signed per-bucket deltas
//! (alerts opened minus alerts closed), seeded with the alerts that were
//! already open when the window starts.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use super::window::TimeWindow;
use super::HistogramError;

/// Identifier of a monitored host or entity
pub type TargetId = String;

/// Sparse alert counts returned by the event store for one window
///
/// Bucket keys are bucket start timestamps in seconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SparseCounts {
    /// Alerts opened before the window start and still open at it
    #[serde(default)]
    pub init: HashMap<TargetId, i64>,
    /// Alerts opened inside each bucket
    #[serde(default)]
    pub begin: HashMap<TargetId, HashMap<i64, i64>>,
    /// Alerts recovered or closed inside each bucket
    #[serde(default)]
    pub end: HashMap<TargetId, HashMap<i64, i64>>,
}

impl SparseCounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_init(&mut self, target: &str, count: i64) {
        *self.init.entry(target.to_string()).or_insert(0) += count;
    }

    pub fn add_begin(&mut self, target: &str, bucket_ts: i64, count: i64) {
        *self
            .begin
            .entry(target.to_string())
            .or_default()
            .entry(bucket_ts)
            .or_insert(0) += count;
    }

    pub fn add_end(&mut self, target: &str, bucket_ts: i64, count: i64) {
        *self
            .end
            .entry(target.to_string())
            .or_default()
            .entry(bucket_ts)
            .or_insert(0) += count;
    }

    pub fn init_count(&self, target: &str) -> i64 {
        self.init.get(target).copied().unwrap_or(0)
    }

    pub fn begin_count(&self, target: &str, bucket_ts: i64) -> i64 {
        self.begin
            .get(target)
            .and_then(|buckets| buckets.get(&bucket_ts))
            .copied()
            .unwrap_or(0)
    }

    pub fn end_count(&self, target: &str, bucket_ts: i64) -> i64 {
        self.end
            .get(target)
            .and_then(|buckets| buckets.get(&bucket_ts))
            .copied()
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.init.is_empty() && self.begin.is_empty() && self.end.is_empty()
    }
}

/// One `[timestamp_ms, count]` chart point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesPoint(pub i64, pub i64);

impl SeriesPoint {
    pub fn timestamp_ms(&self) -> i64 {
        self.0
    }

    pub fn count(&self) -> i64 {
        self.1
    }
}

/// Ascending points, one per bucket
pub type Series = Vec<SeriesPoint>;

/// A bucket where a target's running count dropped below zero
///
/// This happens when the event store reports a close with no matching
/// open in range. The count is kept as is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataInconsistency {
    pub target: TargetId,
    pub timestamp_ms: i64,
    pub count: i64,
}

/// Reconstructed open-alert counts for every requested target
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DensityHistogram {
    /// Sum over all targets at each bucket
    pub aggregate: Series,
    pub per_target: BTreeMap<TargetId, Series>,
    /// First negative bucket of each inconsistent target
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inconsistencies: Vec<DataInconsistency>,
}

impl DensityHistogram {
    pub fn is_consistent(&self) -> bool {
        self.inconsistencies.is_empty()
    }
}

/// Rebuild open-alert series for `targets` over a requested window.
///
/// The window is aligned with [`TimeWindow::align`] first. An empty target
/// set returns an empty histogram without validating the window.
pub fn reconstruct(
    targets: &BTreeSet<TargetId>,
    start_time: i64,
    end_time: i64,
    interval: i64,
    counts: &SparseCounts,
) -> Result<DensityHistogram, HistogramError> {
    if targets.is_empty() {
        return Ok(DensityHistogram::default());
    }
    let window = TimeWindow::align(start_time, end_time, interval)?;
    Ok(reconstruct_aligned(targets, &window, counts))
}

/// Rebuild open-alert series over an already aligned window
pub fn reconstruct_aligned(
    targets: &BTreeSet<TargetId>,
    window: &TimeWindow,
    counts: &SparseCounts,
) -> DensityHistogram {
    if targets.is_empty() {
        return DensityHistogram::default();
    }

    let mut inconsistencies = Vec::new();
    let per_target: BTreeMap<TargetId, Series> = targets
        .iter()
        .map(|target| {
            let series = walk_target(target, window, counts);
            if let Some(point) = series.iter().find(|p| p.count() < 0) {
                tracing::warn!(
                    target_key = %target,
                    timestamp_ms = point.timestamp_ms(),
                    count = point.count(),
                    "Open alert count went negative, event store has a close without a matching open"
                );
                inconsistencies.push(DataInconsistency {
                    target: target.clone(),
                    timestamp_ms: point.timestamp_ms(),
                    count: point.count(),
                });
            }
            (target.clone(), series)
        })
        .collect();

    let aggregate = window
        .buckets()
        .enumerate()
        .map(|(idx, ts)| {
            let total = per_target.values().map(|series| series[idx].count()).sum();
            SeriesPoint(ts * 1000, total)
        })
        .collect();

    DensityHistogram {
        aggregate,
        per_target,
        inconsistencies,
    }
}

fn walk_target(target: &str, window: &TimeWindow, counts: &SparseCounts) -> Series {
    let mut running = counts.init_count(target);
    window
        .buckets()
        .map(|ts| {
            running += counts.begin_count(target, ts) - counts.end_count(target, ts);
            SeriesPoint(ts * 1000, running)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn targets(names: &[&str]) -> BTreeSet<TargetId> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn scenario_counts() -> SparseCounts {
        let mut counts = SparseCounts::new();
        counts.add_init("h1", 3);
        counts.add_begin("h1", 0, 2);
        counts.add_end("h1", 0, 1);
        counts
    }

    #[test]
    fn test_two_bucket_scenario() {
        let window = TimeWindow::aligned(0, 7200, 3600).unwrap();
        let histogram = reconstruct_aligned(&targets(&["h1"]), &window, &scenario_counts());

        assert_eq!(
            histogram.per_target["h1"],
            vec![SeriesPoint(0, 4), SeriesPoint(3_600_000, 4)]
        );
        assert_eq!(histogram.aggregate, histogram.per_target["h1"]);
        assert!(histogram.is_consistent());
    }

    #[test]
    fn test_reconstruct_aligns_requested_window() {
        let histogram =
            reconstruct(&targets(&["h1"]), 0, 7200, 3600, &scenario_counts()).unwrap();

        // The bucket holding the requested end is included
        assert_eq!(
            histogram.per_target["h1"],
            vec![
                SeriesPoint(0, 4),
                SeriesPoint(3_600_000, 4),
                SeriesPoint(7_200_000, 4)
            ]
        );
    }

    #[test]
    fn test_zero_alert_target_is_zero_filled() {
        let histogram =
            reconstruct(&targets(&["idle"]), 30, 3599, 600, &SparseCounts::new()).unwrap();

        let series = &histogram.per_target["idle"];
        assert_eq!(series.len(), 6);
        assert_eq!(series.first().unwrap().timestamp_ms(), 0);
        assert_eq!(series.last().unwrap().timestamp_ms(), 3_000_000);
        assert!(series.iter().all(|p| p.count() == 0));
    }

    #[test]
    fn test_empty_targets_short_circuit() {
        // Invalid interval is never looked at
        let histogram = reconstruct(&BTreeSet::new(), 0, 100, 0, &scenario_counts()).unwrap();
        assert!(histogram.aggregate.is_empty());
        assert!(histogram.per_target.is_empty());
    }

    #[test]
    fn test_conservation_between_adjacent_buckets() {
        let mut counts = SparseCounts::new();
        counts.add_init("a", 1);
        counts.add_begin("a", 60, 3);
        counts.add_end("a", 120, 2);
        counts.add_begin("a", 240, 1);
        counts.add_end("a", 240, 1);
        counts.add_end("a", 300, 2);

        let window = TimeWindow::aligned(0, 360, 60).unwrap();
        let histogram = reconstruct_aligned(&targets(&["a"]), &window, &counts);
        let series = &histogram.per_target["a"];
        let buckets: Vec<i64> = window.buckets().collect();

        for i in 0..series.len() - 1 {
            let ts = buckets[i + 1];
            assert_eq!(
                series[i + 1].count(),
                series[i].count() + counts.begin_count("a", ts) - counts.end_count("a", ts)
            );
        }
        assert_eq!(
            series.iter().map(|p| p.count()).collect::<Vec<_>>(),
            vec![1, 4, 2, 2, 2, 0]
        );
    }

    #[test]
    fn test_aggregate_sums_targets() {
        let mut counts = SparseCounts::new();
        counts.add_init("a", 2);
        counts.add_begin("b", 60, 5);
        counts.add_end("a", 120, 1);

        let histogram = reconstruct(&targets(&["a", "b", "c"]), 0, 150, 60, &counts).unwrap();
        assert_eq!(histogram.per_target.len(), 3);

        for (idx, point) in histogram.aggregate.iter().enumerate() {
            let expected: i64 = histogram
                .per_target
                .values()
                .map(|series| series[idx].count())
                .sum();
            assert_eq!(point.count(), expected);
            assert_eq!(point.timestamp_ms(), histogram.per_target["c"][idx].timestamp_ms());
        }
        assert_eq!(
            histogram.aggregate.iter().map(|p| p.count()).collect::<Vec<_>>(),
            vec![2, 7, 6]
        );
    }

    #[test]
    fn test_counts_for_unrequested_targets_are_ignored() {
        let mut counts = SparseCounts::new();
        counts.add_init("other", 9);

        let histogram = reconstruct(&targets(&["a"]), 0, 59, 60, &counts).unwrap();
        assert_eq!(histogram.per_target.keys().collect::<Vec<_>>(), vec!["a"]);
        assert_eq!(histogram.aggregate, vec![SeriesPoint(0, 0)]);
    }

    #[test]
    fn test_negative_count_is_kept_and_reported() {
        let mut counts = SparseCounts::new();
        counts.add_end("h1", 60, 2);
        counts.add_begin("h1", 120, 1);

        let window = TimeWindow::aligned(0, 180, 60).unwrap();
        let histogram = reconstruct_aligned(&targets(&["h1", "h2"]), &window, &counts);

        assert_eq!(
            histogram.per_target["h1"],
            vec![SeriesPoint(0, 0), SeriesPoint(60_000, -2), SeriesPoint(120_000, -1)]
        );
        assert!(!histogram.is_consistent());
        assert_eq!(
            histogram.inconsistencies,
            vec![DataInconsistency {
                target: "h1".to_string(),
                timestamp_ms: 60_000,
                count: -2,
            }]
        );
    }

    #[test]
    fn test_invalid_interval_rejected() {
        let err = reconstruct(&targets(&["h1"]), 0, 100, -1, &SparseCounts::new()).unwrap_err();
        assert_eq!(err, HistogramError::InvalidInterval(-1));
    }

    #[test]
    fn test_far_future_window_rejected() {
        let start = 10_000_000_000_000_000;
        let err = reconstruct(&targets(&["h1"]), start, start + 60, 60, &SparseCounts::new())
            .unwrap_err();
        assert!(matches!(err, HistogramError::InvalidWindow { .. }));
    }

    #[test]
    fn test_unbounded_window_rejected() {
        let err = reconstruct(&targets(&["h1"]), 0, i64::MAX - 1, 7, &SparseCounts::new())
            .unwrap_err();
        assert!(matches!(err, HistogramError::InvalidWindow { .. }));

        let year = 365 * 24 * 3600;
        let err = reconstruct(&targets(&["h1"]), 0, year, 60, &SparseCounts::new()).unwrap_err();
        assert!(matches!(err, HistogramError::WindowTooLarge { .. }));
    }

    #[test]
    fn test_histogram_serializes_points_as_pairs() {
        let window = TimeWindow::aligned(0, 60, 60).unwrap();
        let histogram = reconstruct_aligned(&targets(&["h1"]), &window, &scenario_counts());
        let json = serde_json::to_value(&histogram).unwrap();

        assert_eq!(json["aggregate"], serde_json::json!([[0, 4]]));
        assert_eq!(json["per_target"]["h1"], serde_json::json!([[0, 4]]));
        assert!(json.get("inconsistencies").is_none());
    }
}
