//! Unified metrics query request and response types

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Body of a unified query against the metrics backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifyQueryRequest {
    pub bk_biz_id: i64,
    pub query_configs: Vec<QueryConfig>,
    pub expression: String,
    #[serde(default)]
    pub functions: Vec<JsonValue>,
    pub alias: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub start_time: i64,
    pub end_time: i64,
    pub slimit: u32,
    #[serde(default)]
    pub down_sample_range: String,
}

impl UnifyQueryRequest {
    pub fn new(bk_biz_id: i64, start_time: i64, end_time: i64) -> Self {
        Self {
            bk_biz_id,
            query_configs: Vec::new(),
            expression: String::new(),
            functions: Vec::new(),
            alias: "a".to_string(),
            name: None,
            start_time,
            end_time,
            slimit: 500,
            down_sample_range: String::new(),
        }
    }

    pub fn with_query(mut self, config: impl Into<QueryConfig>) -> Self {
        self.query_configs.push(config.into());
        self
    }

    pub fn with_expression(mut self, expression: impl Into<String>) -> Self {
        self.expression = expression.into();
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryConfig {
    PromQl(PromQlQuery),
    Metric(MetricQuery),
}

impl From<MetricQuery> for QueryConfig {
    fn from(query: MetricQuery) -> Self {
        QueryConfig::Metric(query)
    }
}

impl From<PromQlQuery> for QueryConfig {
    fn from(query: PromQlQuery) -> Self {
        QueryConfig::PromQl(query)
    }
}

/// Structured query over a result table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricQuery {
    pub data_source_label: String,
    pub data_type_label: String,
    pub metrics: Vec<MetricSelector>,
    pub table: String,
    #[serde(default)]
    pub data_label: String,
    #[serde(default)]
    pub index_set_id: Option<i64>,
    #[serde(default)]
    pub group_by: Vec<String>,
    #[serde(rename = "where", default)]
    pub conditions: Vec<WhereCondition>,
    pub interval: i64,
    pub interval_unit: String,
    #[serde(default)]
    pub time_field: Option<String>,
    #[serde(default)]
    pub filter_dict: Map<String, JsonValue>,
    #[serde(default)]
    pub functions: Vec<JsonValue>,
}

impl MetricQuery {
    /// `method(field) as alias` over a monitor time-series table
    pub fn count(
        table: impl Into<String>,
        field: impl Into<String>,
        alias: impl Into<String>,
    ) -> Self {
        Self {
            data_source_label: "bk_monitor".to_string(),
            data_type_label: "time_series".to_string(),
            metrics: vec![MetricSelector {
                field: field.into(),
                method: "COUNT".to_string(),
                alias: alias.into(),
            }],
            table: table.into(),
            data_label: String::new(),
            index_set_id: None,
            group_by: Vec::new(),
            conditions: Vec::new(),
            interval: 60,
            interval_unit: "s".to_string(),
            time_field: None,
            filter_dict: Map::new(),
            functions: Vec::new(),
        }
    }

    pub fn with_condition(mut self, condition: WhereCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn with_interval(mut self, interval: i64, unit: impl Into<String>) -> Self {
        self.interval = interval;
        self.interval_unit = unit.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSelector {
    pub field: String,
    pub method: String,
    pub alias: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhereCondition {
    pub key: String,
    pub method: String,
    pub value: Vec<JsonValue>,
}

impl WhereCondition {
    pub fn eq(key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        Self {
            key: key.into(),
            method: "eq".to_string(),
            value: vec![value.into()],
        }
    }
}

/// Raw PromQL query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromQlQuery {
    pub data_source_label: String,
    pub data_type_label: String,
    pub promql: String,
    pub interval: i64,
    pub alias: String,
}

impl PromQlQuery {
    pub fn new(promql: impl Into<String>, interval: i64, alias: impl Into<String>) -> Self {
        Self {
            data_source_label: "prometheus".to_string(),
            data_type_label: "time_series".to_string(),
            promql: promql.into(),
            interval,
            alias: alias.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnifyQueryResponse {
    #[serde(default)]
    pub series: Vec<QuerySeries>,
}

/// One returned series, datapoints are `[value, timestamp_ms]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySeries {
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub datapoints: Vec<(Option<f64>, i64)>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl QuerySeries {
    pub fn last_point(&self) -> Option<(Option<f64>, i64)> {
        self.datapoints.last().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_metric_query_serializes_where() {
        let query = MetricQuery::count("script_demo.__default__", "cpu", "m1")
            .with_condition(WhereCondition::eq("bk_collect_config_id", 12))
            .with_interval(1440, "m");
        let json = serde_json::to_value(&query).unwrap();

        assert_eq!(json["where"], json!([{ "key": "bk_collect_config_id", "method": "eq", "value": [12] }]));
        assert_eq!(json["metrics"][0]["method"], "COUNT");
        assert_eq!(json["interval"], 1440);
        assert_eq!(json["interval_unit"], "m");
        assert_eq!(json["index_set_id"], JsonValue::Null);
    }

    #[test]
    fn test_series_keeps_unknown_fields() {
        let raw = json!({
            "target": "{bk_target_ip=10.0.0.1}",
            "datapoints": [[1.0, 1000], [null, 2000]],
            "dimensions": { "bk_target_ip": "10.0.0.1" },
            "metric_field": "_result_"
        });
        let series: QuerySeries = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(series.last_point(), Some((None, 2000)));
        assert_eq!(serde_json::to_value(&series).unwrap(), raw);
    }
}
