//! Alert density histograms
//!
//! Rebuilds the number of concurrently open alerts per target over a
//! fixed-interval window from sparse open/close counts.

pub mod reconstruct;
pub mod window;

pub use reconstruct::{
    reconstruct, reconstruct_aligned, DataInconsistency, DensityHistogram, Series, SeriesPoint,
    SparseCounts, TargetId,
};
pub use window::{resolve_interval, IntervalSpec, TimeWindow, MAX_BUCKETS, MAX_TIMESTAMP_SECS};

/// Histogram construction errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HistogramError {
    #[error("Invalid interval: {0} (must be positive)")]
    InvalidInterval(i64),

    #[error("Invalid window [{start}, {end})")]
    InvalidWindow { start: i64, end: i64 },

    #[error("Window spans {buckets} buckets, at most {max} allowed")]
    WindowTooLarge { buckets: i64, max: i64 },

    #[error("Window [{start}, {end}) is not aligned to {interval}s")]
    Misaligned { start: i64, end: i64, interval: i64 },

    #[error("Invalid interval spec: {0}")]
    InvalidIntervalSpec(String),
}
