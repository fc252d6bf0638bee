//! In-memory alert event store
//!
//! Computes the same aggregations as the search backend directly from raw
//! events. Used in single-node dev mode and in tests.

use std::collections::BTreeSet;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::model::{AlertEvent, EventStatus};
use super::source::{AlertEventSource, AlertQuery, EventSourceError};
use crate::histogram::{Series, SeriesPoint, SparseCounts, TargetId, TimeWindow};

#[derive(Default)]
pub struct InMemoryEventSource {
    events: RwLock<Vec<AlertEvent>>,
}

impl InMemoryEventSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, event: AlertEvent) {
        self.events.write().push(event);
    }

    pub fn extend(&self, events: impl IntoIterator<Item = AlertEvent>) {
        self.events.write().extend(events);
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Aggregate counts without going through the async trait
    pub fn counts(
        &self,
        query: &AlertQuery,
        targets: &BTreeSet<TargetId>,
        window: &TimeWindow,
    ) -> SparseCounts {
        let (start, end) = (window.start_time(), window.end_time());
        let mut counts = SparseCounts::new();

        let events = self.events.read();
        for event in events.iter().filter(|e| {
            query.matches(e) && targets.contains(&e.target_key) && e.overlaps(start, end)
        }) {
            let target = event.target_key.as_str();

            if event.begin_time < start {
                counts.add_init(target, 1);
            } else {
                counts.add_begin(target, window.bucket_of(event.begin_time), 1);
            }

            if let Some(closed) = event.end_time {
                if closed <= end && event.status.is_closed() {
                    counts.add_end(target, window.bucket_of(closed), 1);
                }
            }
        }
        counts
    }
}

#[async_trait]
impl AlertEventSource for InMemoryEventSource {
    async fn target_counts(
        &self,
        query: &AlertQuery,
        targets: &BTreeSet<TargetId>,
        window: &TimeWindow,
    ) -> Result<SparseCounts, EventSourceError> {
        Ok(self.counts(query, targets, window))
    }

    async fn status_histogram(
        &self,
        query: &AlertQuery,
        status: EventStatus,
        window: &TimeWindow,
    ) -> Result<Series, EventSourceError> {
        let mut buckets: Vec<i64> = vec![0; window.bucket_count()];

        let events = self.events.read();
        for event in events
            .iter()
            .filter(|e| query.matches(e) && e.status == status && window.contains(e.begin_time))
        {
            let idx = ((window.bucket_of(event.begin_time) - window.start_time())
                / window.interval()) as usize;
            buckets[idx] += 1;
        }

        Ok(window
            .buckets()
            .zip(buckets)
            .map(|(ts, count)| SeriesPoint(ts * 1000, count))
            .collect())
    }
}
