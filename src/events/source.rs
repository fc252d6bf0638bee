//! Event aggregation collaborator interface

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::model::{AlertEvent, EventStatus};
use crate::histogram::{Series, SparseCounts, TargetId, TimeWindow};

/// Filter selecting the alerts of a set of strategies inside some businesses
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertQuery {
    pub bk_biz_ids: Vec<i64>,
    pub strategy_ids: Vec<i64>,
}

impl AlertQuery {
    pub fn new(bk_biz_id: i64, strategy_ids: Vec<i64>) -> Self {
        Self {
            bk_biz_ids: vec![bk_biz_id],
            strategy_ids,
        }
    }

    /// Query-string form understood by the search backend
    pub fn query_string(&self) -> String {
        self.strategy_ids
            .iter()
            .map(|sid| format!("strategy_id : {}", sid))
            .collect::<Vec<_>>()
            .join(" OR ")
    }

    /// A query without strategies selects nothing
    pub fn is_empty(&self) -> bool {
        self.strategy_ids.is_empty()
    }

    pub fn matches(&self, event: &AlertEvent) -> bool {
        self.bk_biz_ids.contains(&event.bk_biz_id) && self.strategy_ids.contains(&event.strategy_id)
    }
}

/// Source of alert aggregations over a window
#[async_trait]
pub trait AlertEventSource: Send + Sync {
    /// Per-target open, begin and end counts for alerts overlapping `window`.
    ///
    /// - `init`: alerts with `begin_time < start`
    /// - `begin`: alerts with `start <= begin_time <= end`, bucketed by `begin_time`
    /// - `end`: recovered or closed alerts with `end_time <= end`, bucketed by `end_time`
    async fn target_counts(
        &self,
        query: &AlertQuery,
        targets: &BTreeSet<TargetId>,
        window: &TimeWindow,
    ) -> Result<SparseCounts, EventSourceError>;

    /// Number of alerts in `status` opened in each bucket, zero filled
    async fn status_histogram(
        &self,
        query: &AlertQuery,
        status: EventStatus,
        window: &TimeWindow,
    ) -> Result<Series, EventSourceError>;
}

/// Event store failures
#[derive(Debug, thiserror::Error)]
pub enum EventSourceError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Search backend returned status {status}: {body}")]
    Remote { status: u16, body: String },

    #[error("Malformed aggregation: {0}")]
    Malformed(String),
}
