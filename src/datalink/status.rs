//! Per-stage data-link status
//!
//! Each operation loads the collect configuration, resolves what watches it
//! (strategies, metric tables) and asks the remote collaborators for the
//! current picture.

use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::Arc;

use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

use super::collect::{CollectConfig, CollectConfigStore, InstanceStatus, ResolvedMetricTable};
use super::stage::DataLinkStage;
use super::DataLinkError;
use crate::events::{AlertEventSource, AlertQuery, EventStatus};
use crate::histogram::{
    reconstruct_aligned, resolve_interval, DensityHistogram, IntervalSpec, Series, SparseCounts,
    TargetId, TimeWindow,
};
use crate::metrics::{
    MetricQuery, MetricsBackend, PromQlQuery, QuerySeries, UnifyQueryRequest, WhereCondition,
};
use crate::strategy::{
    datalink_strategy_ids, DefaultStrategyLoader, LoadReport, NoticeTemplate, StrategyApi,
};

/// Look-back of alert histograms, in seconds
pub const ALERT_TIME_RANGE: i64 = 3600;

/// Look-back of latest transfer messages, in seconds
pub const LATEST_MSG_TIME_RANGE: i64 = 600;

pub const MAX_LATEST_MESSAGES: usize = 10;

const COLLECT_CONFIG_DIMENSION: &str = "bk_collect_config_id";

// ============================================================================
// Response types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertStatus {
    /// Abnormal alerts opened in the latest bucket
    pub has_alert: i64,
    pub alert_histogram: Series,
    pub alert_config: AlertConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertConfig {
    pub user_group_list: Vec<JsonValue>,
    pub strategies: Vec<StrategySummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategySummary {
    pub name: String,
    pub description: String,
    pub id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatestMessage {
    pub message: String,
    /// Timestamp of the datapoint, in milliseconds
    pub time: i64,
}

/// Count-series resolution
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntervalOption {
    #[default]
    Minute,
    Day,
}

impl IntervalOption {
    /// Query interval as `(value, unit)`
    pub fn interval(&self) -> (i64, &'static str) {
        match self {
            IntervalOption::Minute => (1, "m"),
            IntervalOption::Day => (1440, "m"),
        }
    }
}

impl FromStr for IntervalOption {
    type Err = DataLinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "minute" => Ok(IntervalOption::Minute),
            "day" => Ok(IntervalOption::Day),
            other => Err(DataLinkError::UnknownIntervalOption(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageStatus {
    pub info: Vec<StorageInfo>,
    pub status: Vec<StatusTable>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageInfo {
    pub key: String,
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusTable {
    pub name: String,
    pub content: StatusContent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusContent {
    pub keys: Vec<StatusColumn>,
    pub values: Vec<JsonValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusColumn {
    pub key: String,
    pub name: String,
}

impl StorageStatus {
    /// Placeholder description until storage reports real index state
    fn placeholder() -> Self {
        let info = |key: &str, name: &str, value: &str| StorageInfo {
            key: key.to_string(),
            name: name.to_string(),
            value: value.to_string(),
        };
        let table = |name: &str, replica_label: &str| {
            let column = |key: &str, name: &str| StatusColumn {
                key: key.to_string(),
                name: name.to_string(),
            };
            let row = json!({ "index": "object/list", "running_status": "normal", "copy": 8, "v_copy": 8 });
            StatusTable {
                name: name.to_string(),
                content: StatusContent {
                    keys: vec![
                        column("index", "Index"),
                        column("running_status", "Running status"),
                        column("copy", "Primary shards"),
                        column("v_copy", replica_label),
                    ],
                    values: vec![row.clone(), row.clone(), row],
                },
            }
        };

        StorageStatus {
            info: vec![
                info("index", "Storage index", "trace_agg_scene"),
                info("cluster_name", "Storage cluster", "default"),
                info("expire_time", "Retention", "7 days"),
                info("copy", "Replicas", "1"),
            ],
            status: vec![
                table("Cluster status", "Replica shards"),
                table("Index status", "Replica shards"),
            ],
        }
    }
}

// ============================================================================
// Service
// ============================================================================

/// Data-link status and provisioning over the remote collaborators
pub struct DataLinkService {
    configs: Arc<dyn CollectConfigStore>,
    events: Arc<dyn AlertEventSource>,
    strategies: Arc<dyn StrategyApi>,
    metrics: Arc<dyn MetricsBackend>,
    notice_template: Vec<NoticeTemplate>,
    clock: fn() -> i64,
}

fn system_clock() -> i64 {
    chrono::Utc::now().timestamp()
}

impl DataLinkService {
    pub fn new(
        configs: Arc<dyn CollectConfigStore>,
        events: Arc<dyn AlertEventSource>,
        strategies: Arc<dyn StrategyApi>,
        metrics: Arc<dyn MetricsBackend>,
    ) -> Self {
        Self {
            configs,
            events,
            strategies,
            metrics,
            notice_template: Vec::new(),
            clock: system_clock,
        }
    }

    /// Notice template attached to provisioned strategies
    pub fn with_notice_template(mut self, template: Vec<NoticeTemplate>) -> Self {
        self.notice_template = template;
        self
    }

    /// Replace the wall clock (epoch seconds)
    pub fn with_clock(mut self, clock: fn() -> i64) -> Self {
        self.clock = clock;
        self
    }

    fn now(&self) -> i64 {
        (self.clock)()
    }

    /// Window of the last `time_range` seconds with an automatic bucket width
    fn recent_window(&self, time_range: i64) -> Result<TimeWindow, DataLinkError> {
        let end_time = self.now();
        let start_time = end_time - time_range;
        let interval = resolve_interval(IntervalSpec::Auto, start_time, end_time)?;
        Ok(TimeWindow::align(start_time, end_time, interval)?)
    }

    async fn alert_query(
        &self,
        config: &CollectConfig,
        stage: DataLinkStage,
    ) -> Result<AlertQuery, DataLinkError> {
        let ids =
            datalink_strategy_ids(self.strategies.as_ref(), config.bk_biz_id, config.id, stage)
                .await?;
        Ok(AlertQuery::new(config.bk_biz_id, ids))
    }

    /// Alert state of one stage over the last hour
    pub async fn alert_status(
        &self,
        collect_config_id: i64,
        stage: DataLinkStage,
    ) -> Result<AlertStatus, DataLinkError> {
        let config = self.configs.get(collect_config_id).await?;
        let query = self.alert_query(&config, stage).await?;

        let strategies = try_join_all(
            query
                .strategy_ids
                .iter()
                .map(|&id| self.strategies.get_strategy(config.bk_biz_id, id)),
        )
        .await?;

        let window = self.recent_window(ALERT_TIME_RANGE)?;
        let alert_histogram = if query.is_empty() {
            Vec::new()
        } else {
            self.events
                .status_histogram(&query, EventStatus::Abnormal, &window)
                .await?
        };

        let has_alert = alert_histogram.last().map(|p| p.count()).unwrap_or(0);
        let alert_config = AlertConfig {
            user_group_list: strategies
                .first()
                .map(|s| s.notice.user_group_list.clone())
                .unwrap_or_default(),
            strategies: strategies
                .iter()
                .map(|s| StrategySummary {
                    name: s.name.clone(),
                    description: s.name.clone(),
                    id: s.id,
                })
                .collect(),
        };

        tracing::debug!(
            collect_config_id,
            stage = %stage,
            strategies = alert_config.strategies.len(),
            has_alert,
            "Computed alert status"
        );

        Ok(AlertStatus {
            has_alert,
            alert_histogram,
            alert_config,
        })
    }

    /// Open-alert density of `targets` over the last `time_range` seconds
    pub async fn target_alert_histogram(
        &self,
        query: &AlertQuery,
        targets: &BTreeSet<TargetId>,
        time_range: i64,
    ) -> Result<DensityHistogram, DataLinkError> {
        if targets.is_empty() {
            return Ok(DensityHistogram::default());
        }

        let window = self.recent_window(time_range)?;
        let counts = if query.is_empty() {
            SparseCounts::default()
        } else {
            self.events.target_counts(query, targets, &window).await?
        };
        Ok(reconstruct_aligned(targets, &window, &counts))
    }

    /// Instance status of a collect configuration, each host with its alert density
    pub async fn collecting_target_status(
        &self,
        collect_config_id: i64,
    ) -> Result<InstanceStatus, DataLinkError> {
        let config = self.configs.get(collect_config_id).await?;
        let query = self.alert_query(&config, DataLinkStage::Collecting).await?;
        let mut status = self.configs.instance_status(collect_config_id).await?;

        let targets: BTreeSet<TargetId> = status.host_ids().into_iter().collect();
        let histogram = self
            .target_alert_histogram(&query, &targets, ALERT_TIME_RANGE)
            .await?;

        for child in status.contents.iter_mut().flat_map(|g| g.child.iter_mut()) {
            child.alert_histogram = histogram
                .per_target
                .get(&child.bk_host_id.to_string())
                .cloned();
        }

        tracing::debug!(
            collect_config_id,
            targets = targets.len(),
            inconsistent = histogram.inconsistencies.len(),
            "Computed collecting target status"
        );
        Ok(status)
    }

    /// Metric tables of a collect configuration with their result tables
    pub async fn metrics_tables(
        &self,
        config: &CollectConfig,
    ) -> Result<Vec<ResolvedMetricTable>, DataLinkError> {
        let split_tables = self
            .metrics
            .has_time_series_group(&config.plugin.time_series_group_name())
            .await?;
        Ok(config.resolve_metric_tables(split_tables))
    }

    /// Summed data-point count of every active metric
    pub async fn transfer_count_series(
        &self,
        collect_config_id: i64,
        start_time: i64,
        end_time: i64,
        interval_option: IntervalOption,
    ) -> Result<Vec<QuerySeries>, DataLinkError> {
        let config = self.configs.get(collect_config_id).await?;
        let (interval, unit) = interval_option.interval();

        let mut request = UnifyQueryRequest::new(config.bk_biz_id, start_time, end_time)
            .with_alias("result")
            .with_name("COUNT(ALL)");
        let mut aliases = Vec::new();

        for table in self.metrics_tables(&config).await? {
            for metric_name in &table.metric_names {
                let alias = format!("m{}", aliases.len() + 1);
                request = request.with_query(
                    MetricQuery::count(&table.table_id, metric_name, &alias)
                        .with_condition(WhereCondition::eq(COLLECT_CONFIG_DIMENSION, config.id))
                        .with_interval(interval, unit),
                );
                aliases.push(alias);
            }
        }

        if aliases.is_empty() {
            tracing::debug!(collect_config_id, "No active metrics to count");
            return Ok(Vec::new());
        }

        let expression = aliases
            .iter()
            .map(|alias| format!("({} or vector(0))", alias))
            .collect::<Vec<_>>()
            .join("+");
        let response = self
            .metrics
            .unify_query(&request.with_expression(expression))
            .await?;
        Ok(response.series)
    }

    /// Latest value of each series reporting in the last ten minutes, capped at [`MAX_LATEST_MESSAGES`]
    pub async fn transfer_latest_messages(
        &self,
        collect_config_id: i64,
    ) -> Result<Vec<LatestMessage>, DataLinkError> {
        let config = self.configs.get(collect_config_id).await?;
        let end_time = self.now();
        let start_time = end_time - LATEST_MSG_TIME_RANGE;

        let mut messages = Vec::new();
        for table in self.metrics_tables(&config).await? {
            for metric_name in &table.metric_names {
                let promql = format!(
                    "bkmonitor:{}:{}{{{}=\"{}\"}}[1m]",
                    table.table_id.replace('.', ":"),
                    metric_name,
                    COLLECT_CONFIG_DIMENSION,
                    config.id
                );
                let request = UnifyQueryRequest::new(config.bk_biz_id, start_time, end_time)
                    .with_query(PromQlQuery::new(promql, 60, "a"));
                let response = self.metrics.unify_query(&request).await?;

                messages.extend(response.series.iter().filter_map(|series| {
                    let (value, time) = series.last_point()?;
                    let value = value.map_or_else(|| "null".to_string(), |v| v.to_string());
                    Some(LatestMessage {
                        message: format!("{}{} {}", metric_name, series.target, value),
                        time,
                    })
                }));

                if messages.len() > MAX_LATEST_MESSAGES {
                    messages.truncate(MAX_LATEST_MESSAGES);
                    return Ok(messages);
                }
            }
        }
        Ok(messages)
    }

    /// Storage description of a collect configuration's data
    pub async fn storage_status(
        &self,
        collect_config_id: i64,
    ) -> Result<StorageStatus, DataLinkError> {
        self.configs.get(collect_config_id).await?;
        Ok(StorageStatus::placeholder())
    }

    /// Create the default collecting strategies for a new collect configuration
    pub async fn provision_default_strategies(
        &self,
        collect_config_id: i64,
        user_id: &str,
    ) -> Result<LoadReport, DataLinkError> {
        let config = self.configs.get(collect_config_id).await?;
        let report = DefaultStrategyLoader::new(
            self.strategies.as_ref(),
            &config,
            user_id,
            &self.notice_template,
        )
        .run()
        .await;

        tracing::info!(
            collect_config_id,
            created = report.created.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "Provisioned default strategies"
        );
        Ok(report)
    }
}
