//! Datalink Server
//!
//! Run with: cargo run
//!
//! Environment variables:
//! - DATALINK_HOST: Bind address (default: 0.0.0.0)
//! - DATALINK_PORT: Port number (default: 8080)
//! - RUST_LOG: Log level (default: datalink=info,tower_http=info)
//!
//! Collaborators (in-memory when unset):
//! - DATALINK_EVENT_SEARCH_URL: Search backend holding alert events
//! - DATALINK_ALERT_INDEX: Alert index name (default: bkfta_alert)
//! - DATALINK_STRATEGY_API_URL: Alerting backend API
//! - DATALINK_METRICS_API_URL: Metrics-query backend API
//! - DATALINK_COLLECT_CONFIG_FILE: JSON file of collect configurations
//!
//! Tuning:
//! - DATALINK_NOTICE_TEMPLATE: Notice message for provisioned strategies
//! - DATALINK_HTTP_TIMEOUT_SECS: Timeout of remote calls (default: 30)
//! - DATALINK_STRATEGY_CACHE_TTL_SECS: Strategy lookup cache TTL (default: 60)

use datalink::api::{run_server, ServerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env_opt(name).and_then(|v| v.parse().ok())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "datalink=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let defaults = ServerConfig::default();
    let config = ServerConfig {
        host: env_opt("DATALINK_HOST").unwrap_or(defaults.host),
        port: env_parse("DATALINK_PORT").unwrap_or(defaults.port),
        event_search_url: env_opt("DATALINK_EVENT_SEARCH_URL"),
        alert_index: env_opt("DATALINK_ALERT_INDEX").unwrap_or(defaults.alert_index),
        strategy_api_url: env_opt("DATALINK_STRATEGY_API_URL"),
        metrics_api_url: env_opt("DATALINK_METRICS_API_URL"),
        collect_config_file: env_opt("DATALINK_COLLECT_CONFIG_FILE").map(Into::into),
        notice_message: env_opt("DATALINK_NOTICE_TEMPLATE").unwrap_or(defaults.notice_message),
        http_timeout_secs: env_parse("DATALINK_HTTP_TIMEOUT_SECS")
            .unwrap_or(defaults.http_timeout_secs),
        strategy_cache_max_entries: defaults.strategy_cache_max_entries,
        strategy_cache_ttl_secs: env_parse("DATALINK_STRATEGY_CACHE_TTL_SECS")
            .unwrap_or(defaults.strategy_cache_ttl_secs),
    };

    tracing::info!("Datalink configuration:");
    tracing::info!("  Host: {}:{}", config.host, config.port);
    tracing::info!(
        "  Event search: {}",
        config.event_search_url.as_deref().unwrap_or("in-memory")
    );
    tracing::info!("  Alert index: {}", config.alert_index);
    tracing::info!(
        "  Strategy API: {}",
        config.strategy_api_url.as_deref().unwrap_or("in-memory")
    );
    tracing::info!(
        "  Metrics API: {}",
        config.metrics_api_url.as_deref().unwrap_or("none")
    );
    tracing::info!("  HTTP timeout: {} seconds", config.http_timeout_secs);
    tracing::info!(
        "  Strategy cache TTL: {} seconds",
        config.strategy_cache_ttl_secs
    );

    run_server(config).await
}
