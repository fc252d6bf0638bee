//! Built-in data-link alert strategies
//!
//! Strategy bodies are assembled from typed structs with the collect
//! configuration's values filled in directly.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Warning alert level
pub const WARNING_LEVEL: u8 = 2;

/// Label shared by every built-in collection strategy
pub const BUILTIN_LABEL: &str = "Collection built-in";

/// Default strategies created for each collect configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DatalinkStrategy {
    /// Collector reported a system-level failure code
    #[serde(rename = "datalink_collecting_sys_alarm")]
    CollectingSysAlarm,
    /// Plugin reported a user-level failure code
    #[serde(rename = "datalink_collecting_user_alarm")]
    CollectingUserAlarm,
}

impl DatalinkStrategy {
    pub const ALL: [DatalinkStrategy; 2] = [
        DatalinkStrategy::CollectingSysAlarm,
        DatalinkStrategy::CollectingUserAlarm,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DatalinkStrategy::CollectingSysAlarm => "datalink_collecting_sys_alarm",
            DatalinkStrategy::CollectingUserAlarm => "datalink_collecting_user_alarm",
        }
    }

    /// Unique label tying a strategy to its collect configuration
    pub fn render_label(&self, collect_config_id: i64) -> String {
        match self {
            DatalinkStrategy::CollectingSysAlarm => {
                format!("datalink_collecting_sys_{}", collect_config_id)
            }
            DatalinkStrategy::CollectingUserAlarm => {
                format!("datalink_collecting_user_{}", collect_config_id)
            }
        }
    }

    /// Label as stored by the strategy backend, wrapped in slashes
    pub fn render_escaped_label(&self, collect_config_id: i64) -> String {
        format!("/{}/", self.render_label(collect_config_id))
    }

    fn display_name(&self, collect_config_name: &str) -> String {
        match self {
            DatalinkStrategy::CollectingSysAlarm => {
                format!("Data collection - {} system runtime alarm", collect_config_name)
            }
            DatalinkStrategy::CollectingUserAlarm => {
                format!("Data collection - {} plugin execution alarm", collect_config_name)
            }
        }
    }

    fn up_code_conditions(&self) -> Vec<AggCondition> {
        match self {
            DatalinkStrategy::CollectingSysAlarm => vec![
                AggCondition::new("bkm_up_code", "nreg", r"^2\d{3}$"),
                AggCondition::new("bkm_up_code", "neq", "0").and(),
            ],
            DatalinkStrategy::CollectingUserAlarm => {
                vec![AggCondition::new("bkm_up_code", "reg", r"^2\d{3}$")]
            }
        }
    }

    fn agg_method(&self) -> &'static str {
        match self {
            DatalinkStrategy::CollectingSysAlarm => "COUNT",
            DatalinkStrategy::CollectingUserAlarm => "count",
        }
    }

    /// Build the strategy body to save for one collect configuration
    pub fn build(&self, ctx: &StrategyContext) -> StrategyConfig {
        let mut conditions = self.up_code_conditions();
        conditions.push(
            AggCondition::new(
                "bk_collect_config_id",
                "eq",
                ctx.collect_config_id.to_string(),
            )
            .and(),
        );

        let query = StrategyQueryConfig {
            agg_condition: conditions,
            agg_dimension: vec![
                "bkm_up_code".to_string(),
                "bk_target_ip".to_string(),
                "bk_target_cloud_id".to_string(),
            ],
            agg_interval: 60,
            agg_method: self.agg_method().to_string(),
            alias: "a".to_string(),
            data_source_label: "bk_monitor".to_string(),
            data_type_label: "time_series".to_string(),
            functions: Vec::new(),
            metric_field: "bkm_gather_up".to_string(),
            name: "bkm_gather_up".to_string(),
            result_table_id: ctx.result_table_id.clone(),
            unit: String::new(),
        };

        StrategyConfig {
            bk_biz_id: ctx.bk_biz_id,
            name: self.display_name(&ctx.collect_config_name),
            source: "bk_monitorv3".to_string(),
            scenario: "kubernetes".to_string(),
            strategy_type: "monitor".to_string(),
            labels: vec![
                BUILTIN_LABEL.to_string(),
                self.render_label(ctx.collect_config_id),
            ],
            detects: vec![DetectConfig::warning(5, 5, 4)],
            items: vec![ItemConfig {
                name: "count(bkm_gather_up)".to_string(),
                expression: "a".to_string(),
                functions: Vec::new(),
                algorithms: vec![AlgorithmConfig::threshold("gt", 0.0)],
                no_data_config: NoDataConfig::default(),
                query_configs: vec![query],
                target: vec![Vec::new()],
            }],
            notice: NoticeConfig::new(ctx.notice_group_id, ctx.notice_template.clone()),
            actions: Vec::new(),
        }
    }
}

impl std::fmt::Display for DatalinkStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Values a built-in strategy depends on
#[derive(Debug, Clone)]
pub struct StrategyContext {
    pub bk_biz_id: i64,
    pub collect_config_id: i64,
    pub collect_config_name: String,
    pub result_table_id: String,
    pub notice_group_id: i64,
    pub notice_template: Vec<NoticeTemplate>,
}

/// Strategy body accepted by the strategy backend's save call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub bk_biz_id: i64,
    pub name: String,
    pub source: String,
    pub scenario: String,
    #[serde(rename = "type")]
    pub strategy_type: String,
    pub labels: Vec<String>,
    pub detects: Vec<DetectConfig>,
    pub items: Vec<ItemConfig>,
    pub notice: NoticeConfig,
    #[serde(default)]
    pub actions: Vec<JsonValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectConfig {
    pub level: u8,
    pub expression: String,
    pub connector: String,
    pub trigger_config: TriggerConfig,
    pub recovery_config: RecoveryConfig,
}

impl DetectConfig {
    /// Warning detection: fire after `trigger_count` hits in `trigger_window`
    /// cycles, recover after `recovery_window` clean cycles
    pub fn warning(recovery_window: u32, trigger_window: u32, trigger_count: u32) -> Self {
        Self {
            level: WARNING_LEVEL,
            expression: String::new(),
            connector: "and".to_string(),
            trigger_config: TriggerConfig {
                count: trigger_count,
                check_window: trigger_window,
            },
            recovery_config: RecoveryConfig {
                check_window: recovery_window,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerConfig {
    pub count: u32,
    pub check_window: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryConfig {
    pub check_window: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemConfig {
    pub name: String,
    pub expression: String,
    #[serde(default)]
    pub functions: Vec<JsonValue>,
    pub algorithms: Vec<AlgorithmConfig>,
    pub no_data_config: NoDataConfig,
    pub query_configs: Vec<StrategyQueryConfig>,
    pub target: Vec<Vec<JsonValue>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmConfig {
    pub level: u8,
    #[serde(rename = "type")]
    pub algorithm_type: String,
    pub config: Vec<Vec<ThresholdCondition>>,
    #[serde(default)]
    pub unit_prefix: String,
}

impl AlgorithmConfig {
    pub fn threshold(method: impl Into<String>, threshold: f64) -> Self {
        Self {
            level: WARNING_LEVEL,
            algorithm_type: "Threshold".to_string(),
            config: vec![vec![ThresholdCondition {
                method: method.into(),
                threshold,
            }]],
            unit_prefix: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdCondition {
    pub method: String,
    pub threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoDataConfig {
    pub continuous: u32,
    pub is_enabled: bool,
    pub agg_dimension: Vec<String>,
    pub level: u8,
}

impl Default for NoDataConfig {
    fn default() -> Self {
        Self {
            continuous: 10,
            is_enabled: false,
            agg_dimension: Vec::new(),
            level: WARNING_LEVEL,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyQueryConfig {
    pub agg_condition: Vec<AggCondition>,
    pub agg_dimension: Vec<String>,
    pub agg_interval: u32,
    pub agg_method: String,
    pub alias: String,
    pub data_source_label: String,
    pub data_type_label: String,
    #[serde(default)]
    pub functions: Vec<JsonValue>,
    pub metric_field: String,
    pub name: String,
    pub result_table_id: String,
    #[serde(default)]
    pub unit: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggCondition {
    pub key: String,
    pub method: String,
    pub value: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl AggCondition {
    pub fn new(key: impl Into<String>, method: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            method: method.into(),
            value: vec![value.into()],
            condition: None,
        }
    }

    pub fn and(mut self) -> Self {
        self.condition = Some("and".to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoticeConfig {
    pub config_id: i64,
    pub user_groups: Vec<i64>,
    pub signal: Vec<String>,
    pub options: NoticeOptions,
    pub config: NoticeSettings,
}

impl NoticeConfig {
    pub fn new(user_group: i64, template: Vec<NoticeTemplate>) -> Self {
        Self {
            config_id: 0,
            user_groups: vec![user_group],
            signal: vec!["abnormal".to_string(), "no_data".to_string()],
            options: NoticeOptions::default(),
            config: NoticeSettings {
                interval_notify_mode: "standard".to_string(),
                notify_interval: 2 * 60 * 60,
                template,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoticeOptions {
    pub converge_config: ConvergeConfig,
    pub start_time: String,
    pub end_time: String,
}

impl Default for NoticeOptions {
    fn default() -> Self {
        Self {
            converge_config: ConvergeConfig {
                need_biz_converge: true,
            },
            start_time: "00:00:00".to_string(),
            end_time: "23:59:59".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergeConfig {
    pub need_biz_converge: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoticeSettings {
    pub interval_notify_mode: String,
    pub notify_interval: u32,
    pub template: Vec<NoticeTemplate>,
}

/// Message template for one alert signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoticeTemplate {
    pub signal: String,
    pub title_tmpl: String,
    pub message_tmpl: String,
}

impl NoticeTemplate {
    /// The same message for abnormal, recovered and closed signals
    pub fn for_all_signals(message_tmpl: &str) -> Vec<NoticeTemplate> {
        ["abnormal", "recovered", "closed"]
            .into_iter()
            .map(|signal| NoticeTemplate {
                signal: signal.to_string(),
                title_tmpl: "{{business.bk_biz_name}} - {{alarm.name}}{{alarm.display_type}}"
                    .to_string(),
                message_tmpl: message_tmpl.to_string(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> StrategyContext {
        StrategyContext {
            bk_biz_id: 2,
            collect_config_id: 42,
            collect_config_name: "nginx \"edge\"".to_string(),
            result_table_id: "script_nginx.__default__".to_string(),
            notice_group_id: 9,
            notice_template: NoticeTemplate::for_all_signals("{{content.level}}"),
        }
    }

    #[test]
    fn test_labels() {
        assert_eq!(
            DatalinkStrategy::CollectingSysAlarm.render_label(42),
            "datalink_collecting_sys_42"
        );
        assert_eq!(
            DatalinkStrategy::CollectingUserAlarm.render_escaped_label(42),
            "/datalink_collecting_user_42/"
        );
    }

    #[test]
    fn test_build_sys_alarm() {
        let config = DatalinkStrategy::CollectingSysAlarm.build(&context());

        assert_eq!(config.bk_biz_id, 2);
        // Names are taken verbatim, quotes need no escaping
        assert_eq!(config.name, "Data collection - nginx \"edge\" system runtime alarm");
        assert_eq!(
            config.labels,
            vec![BUILTIN_LABEL.to_string(), "datalink_collecting_sys_42".to_string()]
        );
        assert_eq!(config.notice.user_groups, vec![9]);
        assert_eq!(config.notice.config.template.len(), 3);

        let query = &config.items[0].query_configs[0];
        assert_eq!(query.result_table_id, "script_nginx.__default__");
        assert_eq!(query.agg_condition.len(), 3);
        assert_eq!(query.agg_condition[0].method, "nreg");
        assert_eq!(query.agg_condition[2].value, vec!["42".to_string()]);
        assert_eq!(query.agg_condition[2].condition.as_deref(), Some("and"));
    }

    #[test]
    fn test_build_user_alarm() {
        let config = DatalinkStrategy::CollectingUserAlarm.build(&context());
        let query = &config.items[0].query_configs[0];
        assert_eq!(query.agg_condition.len(), 2);
        assert_eq!(query.agg_condition[0].method, "reg");
        assert_eq!(query.agg_condition[0].value, vec![r"^2\d{3}$".to_string()]);
        assert_eq!(query.agg_method, "count");
    }

    #[test]
    fn test_strategy_config_json_shape() {
        let json = serde_json::to_value(DatalinkStrategy::CollectingSysAlarm.build(&context())).unwrap();
        assert_eq!(json["type"], "monitor");
        assert_eq!(json["source"], "bk_monitorv3");
        assert_eq!(json["scenario"], "kubernetes");
        assert_eq!(json["actions"], serde_json::json!([]));
        assert_eq!(json["items"][0]["algorithms"][0]["type"], "Threshold");
        assert_eq!(json["items"][0]["target"], serde_json::json!([[]]));
        assert_eq!(json["detects"][0]["trigger_config"]["count"], 4);
        assert!(json["items"][0]["query_configs"][0]["agg_condition"][0]
            .get("condition")
            .is_none());
    }
}
