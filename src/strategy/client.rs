//! Strategy backend collaborators

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use moka::sync::Cache;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

use super::templates::StrategyConfig;
use crate::remote::{ApiClient, RemoteError};

/// A saved strategy as returned by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    pub id: i64,
    pub bk_biz_id: i64,
    pub name: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub notice: StrategyNotice,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyNotice {
    #[serde(default)]
    pub user_groups: Vec<i64>,
    /// Expanded user group records
    #[serde(default)]
    pub user_group_list: Vec<JsonValue>,
}

/// Alerting backend API used by this service
#[async_trait]
pub trait StrategyApi: Send + Sync {
    async fn get_strategy(&self, bk_biz_id: i64, id: i64) -> Result<Strategy, StrategyError>;

    /// Save a strategy, returning its id
    async fn save_strategy(&self, config: &StrategyConfig) -> Result<i64, StrategyError>;

    /// Ids of strategies carrying any of the escaped (`/label/`) labels
    async fn strategy_ids_by_labels(
        &self,
        bk_biz_id: i64,
        labels: &[String],
    ) -> Result<Vec<i64>, StrategyError>;

    /// Get or create the business's collection notice group, with `user_id` as a member
    async fn ensure_collecting_notice_group(
        &self,
        bk_biz_id: i64,
        user_id: &str,
    ) -> Result<i64, StrategyError>;
}

/// Strategy backend over HTTP
#[derive(Debug, Clone)]
pub struct HttpStrategyApi {
    client: ApiClient,
}

impl HttpStrategyApi {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, StrategyError> {
        Ok(Self {
            client: ApiClient::new(base_url, timeout)?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct SavedStrategy {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct StrategyLabel {
    strategy_id: i64,
}

#[async_trait]
impl StrategyApi for HttpStrategyApi {
    async fn get_strategy(&self, bk_biz_id: i64, id: i64) -> Result<Strategy, StrategyError> {
        self.client
            .post("get_strategy_v2", &json!({ "bk_biz_id": bk_biz_id, "id": id }))
            .await
            .map_err(|e| match e {
                RemoteError::Rejected(_) => StrategyError::NotFound(id),
                other => other.into(),
            })
    }

    async fn save_strategy(&self, config: &StrategyConfig) -> Result<i64, StrategyError> {
        let saved: SavedStrategy = self.client.post("save_strategy_v2", config).await?;
        Ok(saved.id)
    }

    async fn strategy_ids_by_labels(
        &self,
        bk_biz_id: i64,
        labels: &[String],
    ) -> Result<Vec<i64>, StrategyError> {
        let rows: Vec<StrategyLabel> = self
            .client
            .post(
                "search_strategy_labels",
                &json!({ "bk_biz_id": bk_biz_id, "label_names": labels }),
            )
            .await?;
        let mut ids: Vec<i64> = rows.into_iter().map(|r| r.strategy_id).collect();
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    async fn ensure_collecting_notice_group(
        &self,
        bk_biz_id: i64,
        user_id: &str,
    ) -> Result<i64, StrategyError> {
        let group: SavedStrategy = self
            .client
            .post(
                "add_member_to_collecting_notice_group",
                &json!({ "bk_biz_id": bk_biz_id, "user_id": user_id }),
            )
            .await?;
        Ok(group.id)
    }
}

#[derive(Debug, Clone)]
struct NoticeGroup {
    id: i64,
    members: Vec<String>,
}

/// In-memory strategy backend
pub struct InMemoryStrategyApi {
    strategies: DashMap<i64, Strategy>,
    notice_groups: DashMap<i64, NoticeGroup>,
    next_id: AtomicI64,
}

impl InMemoryStrategyApi {
    pub fn new() -> Self {
        Self {
            strategies: DashMap::new(),
            notice_groups: DashMap::new(),
            next_id: AtomicI64::new(1),
        }
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    pub fn strategies(&self) -> Vec<Strategy> {
        let mut all: Vec<Strategy> = self.strategies.iter().map(|s| s.value().clone()).collect();
        all.sort_by_key(|s| s.id);
        all
    }

    /// Members of a business's collection notice group
    pub fn notice_group_members(&self, bk_biz_id: i64) -> Vec<String> {
        self.notice_groups
            .get(&bk_biz_id)
            .map(|g| g.members.clone())
            .unwrap_or_default()
    }
}

impl Default for InMemoryStrategyApi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StrategyApi for InMemoryStrategyApi {
    async fn get_strategy(&self, bk_biz_id: i64, id: i64) -> Result<Strategy, StrategyError> {
        self.strategies
            .get(&id)
            .filter(|s| s.bk_biz_id == bk_biz_id)
            .map(|s| s.value().clone())
            .ok_or(StrategyError::NotFound(id))
    }

    async fn save_strategy(&self, config: &StrategyConfig) -> Result<i64, StrategyError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let user_group_list = config
            .notice
            .user_groups
            .iter()
            .map(|group| json!({ "id": group, "name": format!("group-{}", group) }))
            .collect();

        let strategy = Strategy {
            id,
            bk_biz_id: config.bk_biz_id,
            name: config.name.clone(),
            labels: config.labels.iter().map(|l| format!("/{}/", l)).collect(),
            notice: StrategyNotice {
                user_groups: config.notice.user_groups.clone(),
                user_group_list,
            },
        };
        self.strategies.insert(id, strategy);
        Ok(id)
    }

    async fn strategy_ids_by_labels(
        &self,
        bk_biz_id: i64,
        labels: &[String],
    ) -> Result<Vec<i64>, StrategyError> {
        let mut ids: Vec<i64> = self
            .strategies
            .iter()
            .filter(|s| s.bk_biz_id == bk_biz_id && s.labels.iter().any(|l| labels.contains(l)))
            .map(|s| s.id)
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    async fn ensure_collecting_notice_group(
        &self,
        bk_biz_id: i64,
        user_id: &str,
    ) -> Result<i64, StrategyError> {
        let mut group = self.notice_groups.entry(bk_biz_id).or_insert_with(|| NoticeGroup {
            id: 1000 + bk_biz_id,
            members: Vec::new(),
        });
        if !group.members.iter().any(|m| m == user_id) {
            group.members.push(user_id.to_string());
        }
        Ok(group.id)
    }
}

/// Caches strategy lookups in front of another backend
pub struct CachedStrategyApi {
    inner: Arc<dyn StrategyApi>,
    cache: Cache<(i64, i64), Strategy>,
    hits: AtomicU64,
    misses: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StrategyCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entry_count: u64,
}

impl CachedStrategyApi {
    pub fn new(inner: Arc<dyn StrategyApi>, max_entries: u64, ttl: Duration) -> Self {
        Self {
            inner,
            cache: Cache::builder()
                .max_capacity(max_entries)
                .time_to_live(ttl)
                .build(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn stats(&self) -> StrategyCacheStats {
        StrategyCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count: self.cache.entry_count(),
        }
    }
}

#[async_trait]
impl StrategyApi for CachedStrategyApi {
    async fn get_strategy(&self, bk_biz_id: i64, id: i64) -> Result<Strategy, StrategyError> {
        if let Some(strategy) = self.cache.get(&(bk_biz_id, id)) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(strategy);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let strategy = self.inner.get_strategy(bk_biz_id, id).await?;
        self.cache.insert((bk_biz_id, id), strategy.clone());
        Ok(strategy)
    }

    async fn save_strategy(&self, config: &StrategyConfig) -> Result<i64, StrategyError> {
        let id = self.inner.save_strategy(config).await?;
        self.cache.invalidate(&(config.bk_biz_id, id));
        Ok(id)
    }

    async fn strategy_ids_by_labels(
        &self,
        bk_biz_id: i64,
        labels: &[String],
    ) -> Result<Vec<i64>, StrategyError> {
        self.inner.strategy_ids_by_labels(bk_biz_id, labels).await
    }

    async fn ensure_collecting_notice_group(
        &self,
        bk_biz_id: i64,
        user_id: &str,
    ) -> Result<i64, StrategyError> {
        self.inner
            .ensure_collecting_notice_group(bk_biz_id, user_id)
            .await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StrategyError {
    #[error("Strategy {0} not found")]
    NotFound(i64),

    #[error("Strategy backend error: {0}")]
    Remote(#[from] RemoteError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::templates::{DatalinkStrategy, NoticeTemplate, StrategyContext};

    fn config(collect_config_id: i64) -> StrategyConfig {
        DatalinkStrategy::CollectingSysAlarm.build(&StrategyContext {
            bk_biz_id: 2,
            collect_config_id,
            collect_config_name: "demo".to_string(),
            result_table_id: "script_demo.__default__".to_string(),
            notice_group_id: 5,
            notice_template: NoticeTemplate::for_all_signals("msg"),
        })
    }

    #[tokio::test]
    async fn test_in_memory_save_and_lookup() {
        let api = InMemoryStrategyApi::new();
        let id = api.save_strategy(&config(7)).await.unwrap();

        let strategy = api.get_strategy(2, id).await.unwrap();
        assert_eq!(strategy.notice.user_groups, vec![5]);
        assert_eq!(strategy.notice.user_group_list.len(), 1);
        assert!(matches!(
            api.get_strategy(3, id).await,
            Err(StrategyError::NotFound(_))
        ));

        let label = DatalinkStrategy::CollectingSysAlarm.render_escaped_label(7);
        assert_eq!(api.strategy_ids_by_labels(2, &[label.clone()]).await.unwrap(), vec![id]);
        assert!(api.strategy_ids_by_labels(3, &[label]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_notice_group_is_reused() {
        let api = InMemoryStrategyApi::new();
        let first = api.ensure_collecting_notice_group(2, "alice").await.unwrap();
        let second = api.ensure_collecting_notice_group(2, "bob").await.unwrap();
        let again = api.ensure_collecting_notice_group(2, "alice").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first, again);
        assert_eq!(api.notice_group_members(2), vec!["alice", "bob"]);
    }

    #[tokio::test]
    async fn test_cache_counts_hits() {
        let inner = Arc::new(InMemoryStrategyApi::new());
        let id = inner.save_strategy(&config(1)).await.unwrap();
        let cached = CachedStrategyApi::new(inner, 100, Duration::from_secs(60));

        cached.get_strategy(2, id).await.unwrap();
        cached.get_strategy(2, id).await.unwrap();
        assert!(cached.get_strategy(2, 999).await.is_err());

        let stats = cached.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
    }
}
