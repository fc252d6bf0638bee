//! Data-link health for collect configurations
//!
//! A collect configuration's data passes collecting, transfer and storage.
//! [`DataLinkService`] answers status queries for each stage and provisions
//! the default alert strategies that watch the collecting stage.

pub mod collect;
pub mod stage;
pub mod status;

pub use collect::{
    CollectConfig, CollectConfigStore, InMemoryCollectConfigStore, InstanceChild, InstanceGroup,
    InstanceStatus, MetricField, MetricTable, Plugin, PluginType, ResolvedMetricTable,
};
pub use stage::DataLinkStage;
pub use status::{
    AlertConfig, AlertStatus, DataLinkService, IntervalOption, LatestMessage, StorageStatus,
    StrategySummary,
};

use crate::events::EventSourceError;
use crate::histogram::HistogramError;
use crate::metrics::MetricsError;
use crate::strategy::StrategyError;

/// Data-link service errors
#[derive(Debug, thiserror::Error)]
pub enum DataLinkError {
    #[error("Collect config not found: {0}")]
    CollectConfigNotFound(i64),

    #[error("Unknown data-link stage: {0}")]
    UnknownStage(String),

    #[error("Unknown interval option: {0}")]
    UnknownIntervalOption(String),

    #[error(transparent)]
    Histogram(#[from] HistogramError),

    #[error("Alert event query failed: {0}")]
    Upstream(#[from] EventSourceError),

    #[error(transparent)]
    Strategy(#[from] StrategyError),

    #[error(transparent)]
    Metrics(#[from] MetricsError),

    #[error("Backend error: {0}")]
    Backend(String),
}
