//! Search backend client
//!
//! Builds the filter/terms/date_histogram aggregation request for the alert
//! index and folds the response buckets back into [`SparseCounts`].

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

use super::model::EventStatus;
use super::source::{AlertEventSource, AlertQuery, EventSourceError};
use crate::histogram::{Series, SeriesPoint, SparseCounts, TargetId, TimeWindow};

/// Document field holding the target key
pub const TARGET_FIELD: &str = "event.bk_host_id";

/// Alert search over HTTP
#[derive(Debug, Clone)]
pub struct SearchEventSource {
    http_client: reqwest::Client,
    base_url: String,
    index: String,
}

impl SearchEventSource {
    pub fn new(
        base_url: impl Into<String>,
        index: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, EventSourceError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EventSourceError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            index: index.into(),
        })
    }

    async fn search(&self, body: &JsonValue) -> Result<JsonValue, EventSourceError> {
        let url = format!("{}/{}/_search", self.base_url, self.index);

        let response = self
            .http_client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| EventSourceError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EventSourceError::Remote {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| EventSourceError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl AlertEventSource for SearchEventSource {
    async fn target_counts(
        &self,
        query: &AlertQuery,
        targets: &BTreeSet<TargetId>,
        window: &TimeWindow,
    ) -> Result<SparseCounts, EventSourceError> {
        if query.is_empty() || targets.is_empty() {
            return Ok(SparseCounts::new());
        }

        let body = target_counts_request(query, targets, window);
        let response = self.search(&body).await?;
        let counts = parse_target_counts(response, window)?;

        tracing::debug!(
            index = %self.index,
            targets = targets.len(),
            with_init = counts.init.len(),
            "Fetched target alert counts"
        );
        Ok(counts)
    }

    async fn status_histogram(
        &self,
        query: &AlertQuery,
        status: EventStatus,
        window: &TimeWindow,
    ) -> Result<Series, EventSourceError> {
        if query.is_empty() {
            return Ok(zero_series(window));
        }

        let body = status_histogram_request(query, status, window);
        let response = self.search(&body).await?;
        parse_status_histogram(response, window)
    }
}

fn base_filters(query: &AlertQuery, window: &TimeWindow) -> Vec<JsonValue> {
    vec![
        json!({ "terms": { "bk_biz_id": query.bk_biz_ids } }),
        json!({ "query_string": { "query": query.query_string() } }),
        json!({ "range": { "begin_time": { "lte": window.end_time() } } }),
        json!({
            "bool": {
                "should": [
                    { "range": { "end_time": { "gte": window.start_time() } } },
                    { "bool": { "must_not": { "exists": { "field": "end_time" } } } }
                ]
            }
        }),
    ]
}

fn targets_terms(size: usize) -> JsonValue {
    json!({ "field": TARGET_FIELD, "size": size })
}

fn date_histogram(field: &str, window: &TimeWindow) -> JsonValue {
    json!({
        "field": field,
        "fixed_interval": format!("{}s", window.interval()),
    })
}

/// Request body for the three per-target aggregations
pub fn target_counts_request(
    query: &AlertQuery,
    targets: &BTreeSet<TargetId>,
    window: &TimeWindow,
) -> JsonValue {
    let (start, end) = (window.start_time(), window.end_time());
    let mut filters = base_filters(query, window);
    filters.push(json!({ "terms": { (TARGET_FIELD): targets } }));

    let closed: Vec<&str> = EventStatus::closed_statuses()
        .iter()
        .map(|s| s.as_str())
        .collect();

    json!({
        "size": 0,
        "query": { "bool": { "filter": filters } },
        "aggs": {
            "init_alert": {
                "filter": { "range": { "begin_time": { "lt": start } } },
                "aggs": { "targets": { "terms": targets_terms(targets.len()) } }
            },
            "begin_time": {
                "filter": { "range": { "begin_time": { "gte": start, "lte": end } } },
                "aggs": {
                    "targets": {
                        "terms": targets_terms(targets.len()),
                        "aggs": { "time": { "date_histogram": date_histogram("begin_time", window) } }
                    }
                }
            },
            "end_time": {
                "filter": { "range": { "end_time": { "lte": end } } },
                "aggs": {
                    "end_alert": {
                        "filter": { "terms": { "status": closed } },
                        "aggs": {
                            "targets": {
                                "terms": targets_terms(targets.len()),
                                "aggs": { "time": { "date_histogram": date_histogram("end_time", window) } }
                            }
                        }
                    }
                }
            }
        }
    })
}

/// Request body for a status histogram bucketed by open time
pub fn status_histogram_request(
    query: &AlertQuery,
    status: EventStatus,
    window: &TimeWindow,
) -> JsonValue {
    let mut filters = base_filters(query, window);
    filters.push(json!({ "term": { "status": status.as_str() } }));
    filters.push(json!({
        "range": { "begin_time": { "gte": window.start_time(), "lt": window.end_time() } }
    }));

    json!({
        "size": 0,
        "query": { "bool": { "filter": filters } },
        "aggs": { "time": { "date_histogram": date_histogram("begin_time", window) } }
    })
}

#[derive(Debug, Deserialize)]
struct SearchResponse<A> {
    aggregations: Option<A>,
}

#[derive(Debug, Deserialize)]
struct CountAggregations {
    init_alert: TargetsAgg,
    begin_time: TargetsAgg,
    end_time: EndTimeAgg,
}

#[derive(Debug, Deserialize)]
struct EndTimeAgg {
    end_alert: TargetsAgg,
}

#[derive(Debug, Deserialize)]
struct TargetsAgg {
    targets: Buckets<TargetBucket>,
}

#[derive(Debug, Deserialize)]
struct Buckets<B> {
    #[serde(default = "Vec::new")]
    buckets: Vec<B>,
}

#[derive(Debug, Deserialize)]
struct TargetBucket {
    key: JsonValue,
    doc_count: i64,
    #[serde(default)]
    time: Option<Buckets<TimeBucket>>,
}

/// Date histogram bucket, keyed in epoch milliseconds
#[derive(Debug, Deserialize)]
struct TimeBucket {
    key: i64,
    doc_count: i64,
}

#[derive(Debug, Deserialize)]
struct HistogramAggregations {
    time: Buckets<TimeBucket>,
}

fn target_key(key: &JsonValue) -> Result<TargetId, EventSourceError> {
    match key {
        JsonValue::String(s) => Ok(s.clone()),
        JsonValue::Number(n) => Ok(n.to_string()),
        other => Err(EventSourceError::Malformed(format!(
            "unexpected target key {}",
            other
        ))),
    }
}

fn time_buckets(bucket: &TargetBucket) -> &[TimeBucket] {
    bucket
        .time
        .as_ref()
        .map(|t| t.buckets.as_slice())
        .unwrap_or(&[])
}

/// Fold a target-counts search response into sparse counts
pub fn parse_target_counts(
    response: JsonValue,
    window: &TimeWindow,
) -> Result<SparseCounts, EventSourceError> {
    let response: SearchResponse<CountAggregations> = serde_json::from_value(response)
        .map_err(|e| EventSourceError::Malformed(e.to_string()))?;

    let mut counts = SparseCounts::new();
    let Some(aggs) = response.aggregations else {
        return Ok(counts);
    };

    for bucket in &aggs.init_alert.targets.buckets {
        counts.add_init(&target_key(&bucket.key)?, bucket.doc_count);
    }
    for bucket in &aggs.begin_time.targets.buckets {
        let target = target_key(&bucket.key)?;
        for time in time_buckets(bucket) {
            counts.add_begin(&target, window.bucket_of(time.key.div_euclid(1000)), time.doc_count);
        }
    }
    for bucket in &aggs.end_time.end_alert.targets.buckets {
        let target = target_key(&bucket.key)?;
        for time in time_buckets(bucket) {
            counts.add_end(&target, window.bucket_of(time.key.div_euclid(1000)), time.doc_count);
        }
    }
    Ok(counts)
}

fn zero_series(window: &TimeWindow) -> Series {
    window.buckets().map(|ts| SeriesPoint(ts * 1000, 0)).collect()
}

/// Zero-fill a date histogram response over the window
pub fn parse_status_histogram(
    response: JsonValue,
    window: &TimeWindow,
) -> Result<Series, EventSourceError> {
    let response: SearchResponse<HistogramAggregations> = serde_json::from_value(response)
        .map_err(|e| EventSourceError::Malformed(e.to_string()))?;

    let mut series = zero_series(window);
    if let Some(aggs) = response.aggregations {
        for bucket in aggs.time.buckets {
            let ts = window.bucket_of(bucket.key.div_euclid(1000));
            if window.contains(ts) {
                let idx = ((ts - window.start_time()) / window.interval()) as usize;
                series[idx].1 += bucket.doc_count;
            }
        }
    }
    Ok(series)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window() -> TimeWindow {
        TimeWindow::aligned(3600, 3600 * 3, 3600).unwrap()
    }

    fn targets() -> BTreeSet<TargetId> {
        ["1".to_string(), "2".to_string()].into_iter().collect()
    }

    #[test]
    fn test_target_counts_request_shape() {
        let body = target_counts_request(&AlertQuery::new(5, vec![7, 8]), &targets(), &window());

        assert_eq!(body["size"], 0);
        assert_eq!(
            body["aggs"]["init_alert"]["filter"]["range"]["begin_time"]["lt"],
            3600
        );
        assert_eq!(
            body["aggs"]["begin_time"]["aggs"]["targets"]["aggs"]["time"]["date_histogram"]
                ["fixed_interval"],
            "3600s"
        );
        assert_eq!(
            body["aggs"]["end_time"]["aggs"]["end_alert"]["filter"]["terms"]["status"],
            json!(["RECOVERED", "CLOSED"])
        );
        assert_eq!(
            body["aggs"]["end_time"]["filter"]["range"]["end_time"]["lte"],
            3600 * 3
        );
        assert_eq!(
            body["aggs"]["init_alert"]["aggs"]["targets"]["terms"]["size"],
            2
        );

        let filters = body["query"]["bool"]["filter"].as_array().unwrap();
        assert!(filters.contains(&json!({
            "query_string": { "query": "strategy_id : 7 OR strategy_id : 8" }
        })));
        assert!(filters.contains(&json!({ "terms": { (TARGET_FIELD): ["1", "2"] } })));
    }

    #[test]
    fn test_parse_target_counts() {
        let response = json!({
            "hits": { "total": { "value": 4 } },
            "aggregations": {
                "init_alert": {
                    "doc_count": 3,
                    "targets": { "buckets": [ { "key": 1, "doc_count": 3 } ] }
                },
                "begin_time": {
                    "doc_count": 2,
                    "targets": { "buckets": [ {
                        "key": "2",
                        "doc_count": 2,
                        "time": { "buckets": [
                            { "key": 3_600_000, "key_as_string": "3600", "doc_count": 1 },
                            { "key": 7_200_000, "key_as_string": "7200", "doc_count": 1 }
                        ] }
                    } ] }
                },
                "end_time": {
                    "doc_count": 1,
                    "end_alert": {
                        "doc_count": 1,
                        "targets": { "buckets": [ {
                            "key": 1,
                            "doc_count": 1,
                            "time": { "buckets": [ { "key": 7_200_000, "doc_count": 1 } ] }
                        } ] }
                    }
                }
            }
        });

        let counts = parse_target_counts(response, &window()).unwrap();
        assert_eq!(counts.init_count("1"), 3);
        assert_eq!(counts.begin_count("2", 3600), 1);
        assert_eq!(counts.begin_count("2", 7200), 1);
        assert_eq!(counts.end_count("1", 7200), 1);
    }

    #[test]
    fn test_parse_without_aggregations() {
        let counts = parse_target_counts(json!({ "hits": {} }), &window()).unwrap();
        assert!(counts.is_empty());
    }

    #[test]
    fn test_parse_rejects_malformed_buckets() {
        let response = json!({
            "aggregations": {
                "init_alert": { "targets": { "buckets": [ { "key": [1], "doc_count": 1 } ] } },
                "begin_time": { "targets": { "buckets": [] } },
                "end_time": { "end_alert": { "targets": { "buckets": [] } } }
            }
        });
        assert!(matches!(
            parse_target_counts(response, &window()),
            Err(EventSourceError::Malformed(_))
        ));

        let missing = json!({ "aggregations": { "init_alert": {} } });
        assert!(matches!(
            parse_target_counts(missing, &window()),
            Err(EventSourceError::Malformed(_))
        ));
    }

    #[test]
    fn test_parse_status_histogram_zero_fills() {
        let response = json!({
            "aggregations": { "time": { "buckets": [
                { "key": 7_200_000, "doc_count": 4 },
                { "key": 99_000_000, "doc_count": 1 }
            ] } }
        });
        let series = parse_status_histogram(response, &window()).unwrap();
        assert_eq!(series, vec![SeriesPoint(3_600_000, 0), SeriesPoint(7_200_000, 4)]);
    }
}
