use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::datalink::{
    AlertStatus, DataLinkError, DataLinkService, DataLinkStage, InstanceStatus, IntervalOption,
    LatestMessage, StorageStatus,
};
use crate::histogram::{
    reconstruct, resolve_interval, DensityHistogram, HistogramError, IntervalSpec, SparseCounts,
    TargetId,
};
use crate::metrics::QuerySeries;
use crate::strategy::{CachedStrategyApi, LoadReport, StrategyCacheStats, StrategyError};

/// Application state shared across handlers
pub struct AppState {
    pub service: Arc<DataLinkService>,
    pub strategy_cache: Option<Arc<CachedStrategyApi>>,
}

// ============================================================================
// Health Check
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============================================================================
// Data-link status
// ============================================================================

#[derive(Deserialize)]
pub struct AlertStatusParams {
    pub collect_config_id: i64,
    pub stage: String,
}

pub async fn alert_status(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AlertStatusParams>,
) -> Result<Json<AlertStatus>, ApiError> {
    let stage: DataLinkStage = params.stage.parse()?;
    let status = state
        .service
        .alert_status(params.collect_config_id, stage)
        .await?;
    Ok(Json(status))
}

#[derive(Deserialize)]
pub struct CollectConfigParams {
    pub collect_config_id: i64,
}

pub async fn collecting_target_status(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CollectConfigParams>,
) -> Result<Json<InstanceStatus>, ApiError> {
    let status = state
        .service
        .collecting_target_status(params.collect_config_id)
        .await?;
    Ok(Json(status))
}

#[derive(Deserialize)]
pub struct TransferCountParams {
    pub collect_config_id: i64,
    pub start_time: i64,
    pub end_time: i64,
    pub interval_option: Option<String>,
}

pub async fn transfer_count_series(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TransferCountParams>,
) -> Result<Json<Vec<QuerySeries>>, ApiError> {
    let interval_option = match params.interval_option.as_deref() {
        Some(option) => option.parse()?,
        None => IntervalOption::default(),
    };
    let series = state
        .service
        .transfer_count_series(
            params.collect_config_id,
            params.start_time,
            params.end_time,
            interval_option,
        )
        .await?;
    Ok(Json(series))
}

pub async fn transfer_latest_msg(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CollectConfigParams>,
) -> Result<Json<Vec<LatestMessage>>, ApiError> {
    let messages = state
        .service
        .transfer_latest_messages(params.collect_config_id)
        .await?;
    Ok(Json(messages))
}

pub async fn storage_status(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CollectConfigParams>,
) -> Result<Json<StorageStatus>, ApiError> {
    let status = state
        .service
        .storage_status(params.collect_config_id)
        .await?;
    Ok(Json(status))
}

// ============================================================================
// Default strategies
// ============================================================================

#[derive(Deserialize)]
pub struct DefaultStrategiesRequest {
    pub collect_config_id: i64,
    pub user_id: String,
}

pub async fn default_strategies(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DefaultStrategiesRequest>,
) -> Result<Json<LoadReport>, ApiError> {
    let report = state
        .service
        .provision_default_strategies(request.collect_config_id, &request.user_id)
        .await?;
    Ok(Json(report))
}

// ============================================================================
// Histogram
// ============================================================================

#[derive(Deserialize)]
pub struct ReconstructRequest {
    pub targets: BTreeSet<TargetId>,
    pub start_time: i64,
    pub end_time: i64,
    /// Seconds, `60s` or `auto`
    #[serde(default)]
    pub interval: Option<String>,
    #[serde(default)]
    pub counts: SparseCounts,
}

pub async fn reconstruct_histogram(
    Json(request): Json<ReconstructRequest>,
) -> Result<Json<DensityHistogram>, ApiError> {
    let spec = match request.interval.as_deref() {
        Some(raw) => raw.parse()?,
        None => IntervalSpec::Auto,
    };
    let interval = resolve_interval(spec, request.start_time, request.end_time)?;
    let histogram = reconstruct(
        &request.targets,
        request.start_time,
        request.end_time,
        interval,
        &request.counts,
    )?;
    Ok(Json(histogram))
}

// ============================================================================
// Stats
// ============================================================================

#[derive(Serialize)]
pub struct StatsResponse {
    pub strategy_cache: Option<StrategyCacheStats>,
}

pub async fn stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    Json(StatsResponse {
        strategy_cache: state.strategy_cache.as_ref().map(|cache| cache.stats()),
    })
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Upstream(String),
    Internal(String),
}

impl From<DataLinkError> for ApiError {
    fn from(err: DataLinkError) -> Self {
        let message = err.to_string();
        match err {
            DataLinkError::CollectConfigNotFound(_)
            | DataLinkError::Strategy(StrategyError::NotFound(_)) => ApiError::NotFound(message),
            DataLinkError::UnknownStage(_)
            | DataLinkError::UnknownIntervalOption(_)
            | DataLinkError::Histogram(_) => ApiError::BadRequest(message),
            DataLinkError::Upstream(_)
            | DataLinkError::Strategy(_)
            | DataLinkError::Metrics(_) => ApiError::Upstream(message),
            DataLinkError::Backend(_) => ApiError::Internal(message),
        }
    }
}

impl From<HistogramError> for ApiError {
    fn from(err: HistogramError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Upstream(msg) => (StatusCode::BAD_GATEWAY, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        if status.is_server_error() {
            tracing::warn!(status = %status, error = %message, "Request failed");
        }

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}
