//! Metrics backend collaborators

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::query::{UnifyQueryRequest, UnifyQueryResponse};
use crate::remote::{ApiClient, RemoteError};

/// Metrics-query backend
#[async_trait]
pub trait MetricsBackend: Send + Sync {
    /// Run a unified query
    async fn unify_query(
        &self,
        request: &UnifyQueryRequest,
    ) -> Result<UnifyQueryResponse, MetricsError>;

    /// Whether a split-table time-series group with this name exists
    async fn has_time_series_group(&self, group_name: &str) -> Result<bool, MetricsError>;
}

/// Metrics backend over HTTP
#[derive(Debug, Clone)]
pub struct HttpMetricsBackend {
    client: ApiClient,
}

impl HttpMetricsBackend {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, MetricsError> {
        Ok(Self {
            client: ApiClient::new(base_url, timeout)?,
        })
    }
}

#[async_trait]
impl MetricsBackend for HttpMetricsBackend {
    async fn unify_query(
        &self,
        request: &UnifyQueryRequest,
    ) -> Result<UnifyQueryResponse, MetricsError> {
        Ok(self.client.post("graph_unify_query", request).await?)
    }

    async fn has_time_series_group(&self, group_name: &str) -> Result<bool, MetricsError> {
        let groups: Vec<serde_json::Value> = self
            .client
            .post(
                "query_time_series_group",
                &serde_json::json!({ "time_series_group_name": group_name }),
            )
            .await?;
        Ok(!groups.is_empty())
    }
}

/// Canned metrics backend
///
/// Answers queries from a queue of prepared responses, then with empty
/// results, and records every request it receives.
#[derive(Default)]
pub struct StaticMetricsBackend {
    responses: Mutex<VecDeque<UnifyQueryResponse>>,
    groups: Mutex<HashSet<String>>,
    requests: Mutex<Vec<UnifyQueryRequest>>,
}

impl StaticMetricsBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_response(&self, response: UnifyQueryResponse) {
        self.responses.lock().push_back(response);
    }

    pub fn add_group(&self, group_name: impl Into<String>) {
        self.groups.lock().insert(group_name.into());
    }

    pub fn requests(&self) -> Vec<UnifyQueryRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl MetricsBackend for StaticMetricsBackend {
    async fn unify_query(
        &self,
        request: &UnifyQueryRequest,
    ) -> Result<UnifyQueryResponse, MetricsError> {
        self.requests.lock().push(request.clone());
        Ok(self.responses.lock().pop_front().unwrap_or_default())
    }

    async fn has_time_series_group(&self, group_name: &str) -> Result<bool, MetricsError> {
        Ok(self.groups.lock().contains(group_name))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("Metrics backend error: {0}")]
    Remote(#[from] RemoteError),
}
