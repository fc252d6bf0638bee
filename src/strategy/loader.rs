//! Default alert strategies for new collect configurations

use serde::Serialize;

use super::client::{StrategyApi, StrategyError};
use super::templates::{DatalinkStrategy, NoticeTemplate, StrategyContext};
use crate::datalink::{CollectConfig, DataLinkStage, PluginType};

/// Outcome of one provisioning run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadReport {
    pub created: Vec<CreatedStrategy>,
    /// Strategies whose label already existed
    pub skipped: Vec<DatalinkStrategy>,
    pub failed: Vec<FailedStrategy>,
    /// Plugin type has no default strategies
    pub unsupported_plugin: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreatedStrategy {
    pub strategy: DatalinkStrategy,
    pub id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedStrategy {
    pub strategy: DatalinkStrategy,
    pub error: String,
}

/// Creates the built-in data-link strategies for a collect configuration
pub struct DefaultStrategyLoader<'a> {
    api: &'a dyn StrategyApi,
    collect_config: &'a CollectConfig,
    user_id: &'a str,
    notice_template: &'a [NoticeTemplate],
}

impl<'a> DefaultStrategyLoader<'a> {
    pub fn new(
        api: &'a dyn StrategyApi,
        collect_config: &'a CollectConfig,
        user_id: &'a str,
        notice_template: &'a [NoticeTemplate],
    ) -> Self {
        Self {
            api,
            collect_config,
            user_id,
            notice_template,
        }
    }

    /// Plugin types that get default strategies
    pub fn supports(plugin_type: &PluginType) -> bool {
        matches!(
            plugin_type,
            PluginType::Script
                | PluginType::Process
                | PluginType::Pushgateway
                | PluginType::Exporter
                | PluginType::DataDog
        )
    }

    /// Result table the strategies query
    pub fn result_table_id(&self) -> String {
        match self.collect_config.plugin.plugin_type {
            PluginType::Process => "process.perf".to_string(),
            _ => self.collect_config.plugin.result_table_id("__default__"),
        }
    }

    async fn exists(&self, strategy: DatalinkStrategy) -> Result<bool, StrategyError> {
        let label = strategy.render_escaped_label(self.collect_config.id);
        let ids = self
            .api
            .strategy_ids_by_labels(self.collect_config.bk_biz_id, &[label])
            .await?;
        Ok(!ids.is_empty())
    }

    async fn load(&self, strategy: DatalinkStrategy) -> Result<i64, StrategyError> {
        let notice_group_id = self
            .api
            .ensure_collecting_notice_group(self.collect_config.bk_biz_id, self.user_id)
            .await?;

        let ctx = StrategyContext {
            bk_biz_id: self.collect_config.bk_biz_id,
            collect_config_id: self.collect_config.id,
            collect_config_name: self.collect_config.name.clone(),
            result_table_id: self.result_table_id(),
            notice_group_id,
            notice_template: self.notice_template.to_vec(),
        };
        self.api.save_strategy(&strategy.build(&ctx)).await
    }

    /// Create every missing default strategy.
    ///
    /// Failures are recorded per strategy and do not stop the run.
    pub async fn run(&self) -> LoadReport {
        let mut report = LoadReport::default();
        let config = self.collect_config;

        if !Self::supports(&config.plugin.plugin_type) {
            tracing::info!(
                collect_config_id = config.id,
                plugin_type = %config.plugin.plugin_type,
                "Plugin has no initial strategy"
            );
            report.unsupported_plugin = true;
            return report;
        }

        for strategy in DatalinkStrategy::ALL {
            let outcome = match self.exists(strategy).await {
                Ok(true) => {
                    tracing::info!(
                        collect_config_id = config.id,
                        strategy = %strategy,
                        "Strategy already exists"
                    );
                    report.skipped.push(strategy);
                    continue;
                }
                Ok(false) => self.load(strategy).await,
                Err(e) => Err(e),
            };

            match outcome {
                Ok(id) => {
                    tracing::info!(
                        collect_config_id = config.id,
                        strategy = %strategy,
                        strategy_id = id,
                        "Created default strategy"
                    );
                    report.created.push(CreatedStrategy { strategy, id });
                }
                Err(e) => {
                    tracing::error!(
                        collect_config_id = config.id,
                        collect_config_name = %config.name,
                        strategy = %strategy,
                        error = %e,
                        "Failed to load default strategy"
                    );
                    report.failed.push(FailedStrategy {
                        strategy,
                        error: e.to_string(),
                    });
                }
            }
        }
        report
    }
}

/// Strategy ids watching one stage of a collect configuration's data link
pub async fn datalink_strategy_ids(
    api: &dyn StrategyApi,
    bk_biz_id: i64,
    collect_config_id: i64,
    stage: DataLinkStage,
) -> Result<Vec<i64>, StrategyError> {
    match stage {
        DataLinkStage::Collecting => {
            let labels: Vec<String> = [
                DatalinkStrategy::CollectingSysAlarm,
                DatalinkStrategy::CollectingUserAlarm,
            ]
            .iter()
            .map(|s| s.render_escaped_label(collect_config_id))
            .collect();
            api.strategy_ids_by_labels(bk_biz_id, &labels).await
        }
        DataLinkStage::Transfer | DataLinkStage::Storage => Ok(Vec::new()),
    }
}
