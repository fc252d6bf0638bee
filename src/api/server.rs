use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{
    alert_status, collecting_target_status, default_strategies, health_check,
    reconstruct_histogram, stats, storage_status, transfer_count_series, transfer_latest_msg,
    AppState,
};
use crate::datalink::{CollectConfigStore, DataLinkService, InMemoryCollectConfigStore};
use crate::events::{AlertEventSource, InMemoryEventSource, SearchEventSource};
use crate::metrics::{HttpMetricsBackend, MetricsBackend, StaticMetricsBackend};
use crate::strategy::{
    CachedStrategyApi, HttpStrategyApi, InMemoryStrategyApi, NoticeTemplate, StrategyApi,
};

pub const DEFAULT_NOTICE_MESSAGE: &str = "{{content.level}}\n{{content.begin_time}}\n{{content.time}}\n{{content.duration}}\n{{content.target_type}}\n{{content.data_source}}\n{{content.content}}\n{{content.current_value}}\n{{content.biz}}\n{{content.target}}\n{{content.dimension}}\n{{content.detail}}\n{{content.related_info}}";

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Search backend holding alert events, in-memory when unset
    pub event_search_url: Option<String>,
    pub alert_index: String,
    /// Alerting backend, in-memory when unset
    pub strategy_api_url: Option<String>,
    /// Metrics-query backend, canned empty answers when unset
    pub metrics_api_url: Option<String>,
    /// JSON file of collect configurations to serve
    pub collect_config_file: Option<PathBuf>,
    pub notice_message: String,
    pub http_timeout_secs: u64,
    pub strategy_cache_max_entries: u64,
    pub strategy_cache_ttl_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            event_search_url: None,
            alert_index: "bkfta_alert".to_string(),
            strategy_api_url: None,
            metrics_api_url: None,
            collect_config_file: None,
            notice_message: DEFAULT_NOTICE_MESSAGE.to_string(),
            http_timeout_secs: 30,
            strategy_cache_max_entries: 10_000,
            strategy_cache_ttl_secs: 60,
        }
    }
}

/// Build the application router
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Data-link status
        .route("/datalink/alert_status", get(alert_status))
        .route(
            "/datalink/collecting_target_status",
            get(collecting_target_status),
        )
        .route("/datalink/transfer_count_series", get(transfer_count_series))
        .route("/datalink/transfer_latest_msg", get(transfer_latest_msg))
        .route("/datalink/storage_status", get(storage_status))
        .route("/datalink/default_strategies", post(default_strategies))
        // Histogram
        .route("/histogram/reconstruct", post(reconstruct_histogram))
        // Stats
        .route("/stats", get(stats))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Wire up the collaborators named by `config`
pub fn build_state(config: &ServerConfig) -> Result<AppState, Box<dyn std::error::Error>> {
    let timeout = Duration::from_secs(config.http_timeout_secs);

    let configs = match &config.collect_config_file {
        Some(path) => {
            let json = std::fs::read_to_string(path)?;
            let loaded = InMemoryCollectConfigStore::from_json(&json)?;
            tracing::info!(path = %path.display(), configs = loaded.len(), "Loaded collect configs");
            loaded
        }
        None => InMemoryCollectConfigStore::new(),
    };
    let configs: Arc<dyn CollectConfigStore> = Arc::new(configs);

    let events: Arc<dyn AlertEventSource> = match &config.event_search_url {
        Some(url) => Arc::new(SearchEventSource::new(url, &config.alert_index, timeout)?),
        None => {
            tracing::info!("No event search backend configured, using in-memory events");
            Arc::new(InMemoryEventSource::new())
        }
    };

    let strategy_backend: Arc<dyn StrategyApi> = match &config.strategy_api_url {
        Some(url) => Arc::new(HttpStrategyApi::new(url, timeout)?),
        None => {
            tracing::info!("No strategy backend configured, using in-memory strategies");
            Arc::new(InMemoryStrategyApi::new())
        }
    };
    let strategy_cache = Arc::new(CachedStrategyApi::new(
        strategy_backend,
        config.strategy_cache_max_entries,
        Duration::from_secs(config.strategy_cache_ttl_secs),
    ));

    let metrics: Arc<dyn MetricsBackend> = match &config.metrics_api_url {
        Some(url) => Arc::new(HttpMetricsBackend::new(url, timeout)?),
        None => {
            tracing::info!("No metrics backend configured, metric queries return no series");
            Arc::new(StaticMetricsBackend::new())
        }
    };

    let service = DataLinkService::new(configs, events, strategy_cache.clone(), metrics)
        .with_notice_template(NoticeTemplate::for_all_signals(&config.notice_message));

    Ok(AppState {
        service: Arc::new(service),
        strategy_cache: Some(strategy_cache),
    })
}

/// Run the HTTP server
pub async fn run_server(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let state = Arc::new(build_state(&config)?);
    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!("Starting datalink server on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Datalink server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to install CTRL+C signal handler: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
