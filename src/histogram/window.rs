//! Reporting window alignment and bucket interval resolution

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::HistogramError;

/// Bound on window timestamps in seconds, either side of the epoch.
///
/// Series carry millisecond timestamps, so every bound must survive `* 1000`.
pub const MAX_TIMESTAMP_SECS: i64 = i64::MAX / 1000;

/// Most buckets a single window may hold
pub const MAX_BUCKETS: i64 = 100_000;

/// An aligned `[start_time, end_time)` window split into `interval`-second buckets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    start_time: i64,
    end_time: i64,
    interval: i64,
}

impl TimeWindow {
    /// Align a requested window.
    ///
    /// The start rounds down to a bucket boundary. The end rounds down and is
    /// then extended by one interval, so the bucket holding `end_time` is
    /// always part of the window.
    pub fn align(start_time: i64, end_time: i64, interval: i64) -> Result<Self, HistogramError> {
        if interval <= 0 {
            return Err(HistogramError::InvalidInterval(interval));
        }
        let overflow = || HistogramError::InvalidWindow {
            start: start_time,
            end: end_time,
        };
        let start = start_time
            .div_euclid(interval)
            .checked_mul(interval)
            .ok_or_else(overflow)?;
        let end = end_time
            .div_euclid(interval)
            .checked_mul(interval)
            .and_then(|end| end.checked_add(interval))
            .ok_or_else(overflow)?;
        Self::aligned(start, end, interval)
    }

    /// Accept a window whose bounds are already bucket boundaries
    pub fn aligned(start_time: i64, end_time: i64, interval: i64) -> Result<Self, HistogramError> {
        if interval <= 0 {
            return Err(HistogramError::InvalidInterval(interval));
        }
        let in_range = |ts: i64| (-MAX_TIMESTAMP_SECS..=MAX_TIMESTAMP_SECS).contains(&ts);
        if !in_range(start_time) || !in_range(end_time) {
            return Err(HistogramError::InvalidWindow {
                start: start_time,
                end: end_time,
            });
        }
        if start_time.rem_euclid(interval) != 0 || end_time.rem_euclid(interval) != 0 {
            return Err(HistogramError::Misaligned {
                start: start_time,
                end: end_time,
                interval,
            });
        }
        if end_time <= start_time {
            return Err(HistogramError::InvalidWindow {
                start: start_time,
                end: end_time,
            });
        }
        let buckets = (end_time - start_time) / interval;
        if buckets > MAX_BUCKETS {
            return Err(HistogramError::WindowTooLarge {
                buckets,
                max: MAX_BUCKETS,
            });
        }
        Ok(Self {
            start_time,
            end_time,
            interval,
        })
    }

    pub fn start_time(&self) -> i64 {
        self.start_time
    }

    pub fn end_time(&self) -> i64 {
        self.end_time
    }

    pub fn interval(&self) -> i64 {
        self.interval
    }

    /// Number of buckets in the window
    pub fn bucket_count(&self) -> usize {
        ((self.end_time - self.start_time) / self.interval) as usize
    }

    /// Bucket start timestamps (seconds), ascending
    pub fn buckets(&self) -> impl Iterator<Item = i64> {
        let (start, interval) = (self.start_time, self.interval);
        (0..self.bucket_count() as i64).map(move |i| start + i * interval)
    }

    /// Start of the bucket that holds `ts`
    pub fn bucket_of(&self, ts: i64) -> i64 {
        ts.div_euclid(self.interval) * self.interval
    }

    /// Whether `ts` falls inside `[start_time, end_time)`
    pub fn contains(&self, ts: i64) -> bool {
        ts >= self.start_time && ts < self.end_time
    }
}

/// Bucket width requested by a caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalSpec {
    /// Pick a width from the window length
    Auto,
    /// Fixed width in seconds
    Seconds(i64),
}

impl Default for IntervalSpec {
    fn default() -> Self {
        IntervalSpec::Auto
    }
}

impl FromStr for IntervalSpec {
    type Err = HistogramError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("auto") {
            return Ok(IntervalSpec::Auto);
        }
        let secs: i64 = s
            .strip_suffix('s')
            .unwrap_or(s)
            .parse()
            .map_err(|_| HistogramError::InvalidIntervalSpec(s.to_string()))?;
        if secs <= 0 {
            return Err(HistogramError::InvalidInterval(secs));
        }
        Ok(IntervalSpec::Seconds(secs))
    }
}

/// Resolve a bucket width in seconds for the window `[start_time, end_time)`.
///
/// `Auto` steps up with the window length: one minute up to an hour, five
/// minutes up to six hours, one hour up to three days, one day beyond.
pub fn resolve_interval(
    spec: IntervalSpec,
    start_time: i64,
    end_time: i64,
) -> Result<i64, HistogramError> {
    match spec {
        IntervalSpec::Seconds(secs) if secs > 0 => Ok(secs),
        IntervalSpec::Seconds(secs) => Err(HistogramError::InvalidInterval(secs)),
        IntervalSpec::Auto => {
            let hours = end_time.saturating_sub(start_time).max(0) / 3600;
            Ok(match hours {
                0..=1 => 60,
                2..=6 => 5 * 60,
                7..=72 => 60 * 60,
                _ => 24 * 60 * 60,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_rounds_start_down_and_end_up() {
        let window = TimeWindow::align(100, 3500, 60).unwrap();
        assert_eq!(window.start_time(), 60);
        assert_eq!(window.end_time(), 3480 + 60);
        assert_eq!((window.end_time() - window.start_time()) % 60, 0);
    }

    #[test]
    fn test_align_is_idempotent_on_start() {
        let window = TimeWindow::align(7200, 10_000, 3600).unwrap();
        assert_eq!(window.start_time(), 7200);

        let again = TimeWindow::align(window.start_time(), window.end_time() - 1, 3600).unwrap();
        assert_eq!(again, window);
    }

    #[test]
    fn test_aligned_window_buckets() {
        let window = TimeWindow::aligned(0, 7200, 3600).unwrap();
        assert_eq!(window.bucket_count(), 2);
        assert_eq!(window.buckets().collect::<Vec<_>>(), vec![0, 3600]);
    }

    #[test]
    fn test_rejects_non_positive_interval() {
        assert_eq!(
            TimeWindow::align(0, 100, 0),
            Err(HistogramError::InvalidInterval(0))
        );
        assert_eq!(
            TimeWindow::aligned(0, 100, -5),
            Err(HistogramError::InvalidInterval(-5))
        );
    }

    #[test]
    fn test_rejects_inverted_window() {
        let err = TimeWindow::align(7200, 0, 3600).unwrap_err();
        assert_eq!(err, HistogramError::InvalidWindow { start: 7200, end: 3600 });

        assert!(matches!(
            TimeWindow::aligned(3600, 3600, 3600),
            Err(HistogramError::InvalidWindow { .. })
        ));
    }

    #[test]
    fn test_aligned_rejects_unaligned_bounds() {
        assert!(matches!(
            TimeWindow::aligned(10, 3600, 3600),
            Err(HistogramError::Misaligned { .. })
        ));
    }

    #[test]
    fn test_rejects_timestamps_past_millisecond_range() {
        let far = 10_000_000_000_000_000;
        assert!(matches!(
            TimeWindow::align(far, far + 60, 60),
            Err(HistogramError::InvalidWindow { .. })
        ));
        assert!(matches!(
            TimeWindow::align(0, i64::MAX - 1, 7),
            Err(HistogramError::InvalidWindow { .. })
        ));
        assert!(matches!(
            TimeWindow::align(i64::MIN, 0, 60),
            Err(HistogramError::InvalidWindow { .. })
        ));

        let edge = MAX_TIMESTAMP_SECS - MAX_TIMESTAMP_SECS.rem_euclid(60) - 60;
        let window = TimeWindow::aligned(edge - 60, edge, 60).unwrap();
        assert_eq!(window.bucket_count(), 1);
    }

    #[test]
    fn test_rejects_too_many_buckets() {
        assert_eq!(
            TimeWindow::aligned(0, 60 * (MAX_BUCKETS + 1), 60),
            Err(HistogramError::WindowTooLarge {
                buckets: MAX_BUCKETS + 1,
                max: MAX_BUCKETS,
            })
        );
        assert!(TimeWindow::aligned(0, 60 * MAX_BUCKETS, 60).is_ok());
    }

    #[test]
    fn test_resolve_auto_interval_saturates() {
        assert_eq!(
            resolve_interval(IntervalSpec::Auto, i64::MIN, i64::MAX).unwrap(),
            24 * 60 * 60
        );
    }

    #[test]
    fn test_bucket_of() {
        let window = TimeWindow::aligned(0, 600, 60).unwrap();
        assert_eq!(window.bucket_of(59), 0);
        assert_eq!(window.bucket_of(60), 60);
        assert_eq!(window.bucket_of(599), 540);
        assert!(window.contains(599));
        assert!(!window.contains(600));
    }

    #[test]
    fn test_interval_spec_parse() {
        assert_eq!("auto".parse::<IntervalSpec>().unwrap(), IntervalSpec::Auto);
        assert_eq!("300".parse::<IntervalSpec>().unwrap(), IntervalSpec::Seconds(300));
        assert_eq!("60s".parse::<IntervalSpec>().unwrap(), IntervalSpec::Seconds(60));
        assert!("0".parse::<IntervalSpec>().is_err());
        assert!("hourly".parse::<IntervalSpec>().is_err());
    }

    #[test]
    fn test_resolve_auto_interval() {
        assert_eq!(resolve_interval(IntervalSpec::Auto, 0, 3600).unwrap(), 60);
        assert_eq!(resolve_interval(IntervalSpec::Auto, 0, 6 * 3600).unwrap(), 300);
        assert_eq!(resolve_interval(IntervalSpec::Auto, 0, 24 * 3600).unwrap(), 3600);
        assert_eq!(resolve_interval(IntervalSpec::Auto, 0, 30 * 86400).unwrap(), 86400);
        assert_eq!(resolve_interval(IntervalSpec::Seconds(120), 0, 3600).unwrap(), 120);
        assert!(resolve_interval(IntervalSpec::Seconds(0), 0, 3600).is_err());
    }
}
