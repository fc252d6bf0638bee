//! Collect configurations and their lookup backend

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use super::DataLinkError;
use crate::histogram::Series;

/// Collection plugin kind
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PluginType {
    Exporter,
    Script,
    Jmx,
    DataDog,
    Pushgateway,
    BuiltIn,
    Log,
    Process,
    SnmpTrap,
    K8s,
    Snmp,
    Other(String),
}

impl PluginType {
    pub fn as_str(&self) -> &str {
        match self {
            PluginType::Exporter => "Exporter",
            PluginType::Script => "Script",
            PluginType::Jmx => "JMX",
            PluginType::DataDog => "DataDog",
            PluginType::Pushgateway => "Pushgateway",
            PluginType::BuiltIn => "Built-In",
            PluginType::Log => "Log",
            PluginType::Process => "Process",
            PluginType::SnmpTrap => "SNMP_Trap",
            PluginType::K8s => "K8S",
            PluginType::Snmp => "SNMP",
            PluginType::Other(name) => name,
        }
    }
}

impl From<String> for PluginType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "Exporter" => PluginType::Exporter,
            "Script" => PluginType::Script,
            "JMX" => PluginType::Jmx,
            "DataDog" => PluginType::DataDog,
            "Pushgateway" => PluginType::Pushgateway,
            "Built-In" => PluginType::BuiltIn,
            "Log" => PluginType::Log,
            "Process" => PluginType::Process,
            "SNMP_Trap" => PluginType::SnmpTrap,
            "K8S" => PluginType::K8s,
            "SNMP" => PluginType::Snmp,
            _ => PluginType::Other(s),
        }
    }
}

impl From<PluginType> for String {
    fn from(plugin_type: PluginType) -> Self {
        plugin_type.as_str().to_string()
    }
}

impl std::fmt::Display for PluginType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plugin {
    pub plugin_id: String,
    pub plugin_type: PluginType,
}

impl Plugin {
    /// Result table a plugin's table lands in
    pub fn result_table_id(&self, table_name: &str) -> String {
        format!("{}_{}.{}", self.plugin_type, self.plugin_id, table_name).to_lowercase()
    }

    /// Name of the split-table time-series group, if the plugin has one
    pub fn time_series_group_name(&self) -> String {
        format!("{}_{}", self.plugin_type, self.plugin_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricField {
    pub name: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    /// `metric` or `dimension`
    pub monitor_type: String,
}

fn default_true() -> bool {
    true
}

impl MetricField {
    pub fn is_active_metric(&self) -> bool {
        self.is_active && self.monitor_type == "metric"
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricTable {
    pub table_name: String,
    #[serde(default)]
    pub fields: Vec<MetricField>,
}

/// A collect configuration as deployed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectConfig {
    pub id: i64,
    pub bk_biz_id: i64,
    pub name: String,
    pub plugin: Plugin,
    /// Metric tables of the deployed plugin version
    #[serde(default)]
    pub metrics: Vec<MetricTable>,
}

/// A metric table resolved to its result table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedMetricTable {
    pub table_name: String,
    pub table_id: String,
    pub metric_names: Vec<String>,
}

impl CollectConfig {
    /// Resolve each metric table to a result table id and its active metrics.
    ///
    /// With a split-table time-series group every table maps to `__default__`.
    pub fn resolve_metric_tables(&self, split_tables: bool) -> Vec<ResolvedMetricTable> {
        self.metrics
            .iter()
            .map(|table| {
                let table_name = if split_tables {
                    "__default__".to_string()
                } else {
                    table.table_name.clone()
                };
                ResolvedMetricTable {
                    table_id: self.plugin.result_table_id(&table_name),
                    table_name,
                    metric_names: table
                        .fields
                        .iter()
                        .filter(|f| f.is_active_metric())
                        .map(|f| f.name.clone())
                        .collect(),
                }
            })
            .collect()
    }
}

/// Deployment status of a collect configuration's instances, grouped by topology node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstanceStatus {
    #[serde(default)]
    pub contents: Vec<InstanceGroup>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstanceGroup {
    #[serde(default)]
    pub child: Vec<InstanceChild>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceChild {
    pub bk_host_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_histogram: Option<Series>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl InstanceStatus {
    /// Host ids of every child instance, as target keys
    pub fn host_ids(&self) -> Vec<String> {
        self.contents
            .iter()
            .flat_map(|group| group.child.iter())
            .map(|child| child.bk_host_id.to_string())
            .collect()
    }
}

/// Lookup of collect configurations and their instance status
#[async_trait]
pub trait CollectConfigStore: Send + Sync {
    async fn get(&self, id: i64) -> Result<CollectConfig, DataLinkError>;

    async fn instance_status(&self, id: i64) -> Result<InstanceStatus, DataLinkError>;
}

/// Collect configuration with its instance status, as loaded from a seed file
#[derive(Debug, Clone, Deserialize)]
pub struct CollectConfigSeed {
    #[serde(flatten)]
    pub config: CollectConfig,
    #[serde(default)]
    pub instance_status: InstanceStatus,
}

#[derive(Default)]
pub struct InMemoryCollectConfigStore {
    configs: DashMap<i64, CollectConfig>,
    instances: DashMap<i64, InstanceStatus>,
}

impl InMemoryCollectConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a JSON array of collect configurations
    pub fn from_json(json: &str) -> Result<Self, DataLinkError> {
        let seeds: Vec<CollectConfigSeed> =
            serde_json::from_str(json).map_err(|e| DataLinkError::Backend(e.to_string()))?;

        let store = Self::new();
        for seed in seeds {
            store.set_instance_status(seed.config.id, seed.instance_status);
            store.insert(seed.config);
        }
        Ok(store)
    }

    pub fn insert(&self, config: CollectConfig) {
        self.configs.insert(config.id, config);
    }

    pub fn set_instance_status(&self, id: i64, status: InstanceStatus) {
        self.instances.insert(id, status);
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }
}

#[async_trait]
impl CollectConfigStore for InMemoryCollectConfigStore {
    async fn get(&self, id: i64) -> Result<CollectConfig, DataLinkError> {
        self.configs
            .get(&id)
            .map(|c| c.value().clone())
            .ok_or(DataLinkError::CollectConfigNotFound(id))
    }

    async fn instance_status(&self, id: i64) -> Result<InstanceStatus, DataLinkError> {
        if !self.configs.contains_key(&id) {
            return Err(DataLinkError::CollectConfigNotFound(id));
        }
        Ok(self
            .instances
            .get(&id)
            .map(|s| s.value().clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> CollectConfig {
        CollectConfig {
            id: 1,
            bk_biz_id: 2,
            name: "demo".to_string(),
            plugin: Plugin {
                plugin_id: "MyScript".to_string(),
                plugin_type: PluginType::Script,
            },
            metrics: vec![MetricTable {
                table_name: "base".to_string(),
                fields: vec![
                    MetricField {
                        name: "cpu".to_string(),
                        is_active: true,
                        monitor_type: "metric".to_string(),
                    },
                    MetricField {
                        name: "disk".to_string(),
                        is_active: false,
                        monitor_type: "metric".to_string(),
                    },
                    MetricField {
                        name: "host".to_string(),
                        is_active: true,
                        monitor_type: "dimension".to_string(),
                    },
                ],
            }],
        }
    }

    #[test]
    fn test_plugin_type_strings() {
        let parsed: PluginType = serde_json::from_value(json!("DataDog")).unwrap();
        assert_eq!(parsed, PluginType::DataDog);
        let other: PluginType = serde_json::from_value(json!("Custom")).unwrap();
        assert_eq!(other, PluginType::Other("Custom".to_string()));
        assert_eq!(serde_json::to_value(PluginType::SnmpTrap).unwrap(), json!("SNMP_Trap"));
    }

    #[test]
    fn test_resolve_metric_tables() {
        let tables = config().resolve_metric_tables(false);
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].table_id, "script_myscript.base");
        assert_eq!(tables[0].metric_names, vec!["cpu".to_string()]);

        let split = config().resolve_metric_tables(true);
        assert_eq!(split[0].table_name, "__default__");
        assert_eq!(split[0].table_id, "script_myscript.__default__");
        assert_eq!(config().plugin.time_series_group_name(), "Script_MyScript");
    }

    #[test]
    fn test_instance_status_passthrough() {
        let raw = json!({
            "config_info": { "id": 1 },
            "contents": [{
                "node_path": "biz/set",
                "child": [
                    { "bk_host_id": 11, "ip": "10.0.0.1", "status": "SUCCESS" },
                    { "bk_host_id": 12, "ip": "10.0.0.2", "status": "FAILED" }
                ]
            }]
        });
        let status: InstanceStatus = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(status.host_ids(), vec!["11".to_string(), "12".to_string()]);
        assert_eq!(serde_json::to_value(&status).unwrap(), raw);
    }

    #[tokio::test]
    async fn test_store_lookup() {
        let store = InMemoryCollectConfigStore::new();
        store.insert(config());

        assert_eq!(store.get(1).await.unwrap().name, "demo");
        assert!(matches!(
            store.get(9).await,
            Err(DataLinkError::CollectConfigNotFound(9))
        ));
        assert!(store.instance_status(1).await.unwrap().contents.is_empty());
        assert!(store.instance_status(9).await.is_err());
    }

    #[tokio::test]
    async fn test_store_from_json_file() {
        let seed = json!([{
            "id": 5,
            "bk_biz_id": 2,
            "name": "node",
            "plugin": { "plugin_id": "node_exporter", "plugin_type": "Exporter" },
            "instance_status": { "contents": [ { "child": [ { "bk_host_id": 3 } ] } ] }
        }]);
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), seed.to_string()).unwrap();

        let json = std::fs::read_to_string(file.path()).unwrap();
        let store = InMemoryCollectConfigStore::from_json(&json).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.instance_status(5).await.unwrap().host_ids(), vec!["3".to_string()]);
        assert_eq!(store.get(5).await.unwrap().plugin.plugin_type, PluginType::Exporter);
    }
}
