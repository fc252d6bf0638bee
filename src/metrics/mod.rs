//! Metrics-query backend: unified queries and time-series group lookup

pub mod client;
pub mod query;

pub use client::{HttpMetricsBackend, MetricsBackend, MetricsError, StaticMetricsBackend};
pub use query::{
    MetricQuery, MetricSelector, PromQlQuery, QueryConfig, QuerySeries, UnifyQueryRequest,
    UnifyQueryResponse, WhereCondition,
};
