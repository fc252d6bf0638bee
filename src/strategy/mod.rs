//! Alert strategy provisioning for data-link monitoring
//!
//! Holds the built-in strategy templates, the alerting backend interface and
//! the loader that creates default strategies for new collect configurations.

pub mod client;
pub mod loader;
pub mod templates;

pub use client::{
    CachedStrategyApi, HttpStrategyApi, InMemoryStrategyApi, Strategy, StrategyApi,
    StrategyCacheStats, StrategyError,
};
pub use loader::{datalink_strategy_ids, DefaultStrategyLoader, LoadReport};
pub use templates::{DatalinkStrategy, NoticeTemplate, StrategyConfig, StrategyContext};
