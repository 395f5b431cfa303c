use async_trait::async_trait;
use moka::future::Cache;
use std::time::Duration;
use tracing::debug;

use super::CacheLayer;
use crate::config::CacheConfig;
use crate::shard::ShardRecord;

pub struct MokaCache {
    inner: Cache<String, ShardRecord>,
}

impl MokaCache {
    pub fn new(config: &CacheConfig) -> Self {
        let inner = Cache::builder()
            .max_capacity(config.memory.max_capacity)
            .time_to_live(Duration::from_secs(config.default_ttl))
            .build();

        debug!(
            "MokaCache initialized with max capacity: {}, TTL: {}s",
            config.memory.max_capacity, config.default_ttl
        );
        Self { inner }
    }
}

#[async_trait]
impl CacheLayer for MokaCache {
    async fn get(&self, key: &str) -> Option<ShardRecord> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, record: ShardRecord, _ttl_secs: Option<u64>) {
        // moka 的 TTL 是缓存级别的，单条 TTL 提示在这里无法表达，忽略
        self.inner.insert(key.to_string(), record).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::LinkId;
    use chrono::Utc;

    fn record(key: &str) -> ShardRecord {
        ShardRecord {
            id: LinkId::from_i64(7),
            short_key: key.to_string(),
            long_url: "https://example.com/page".to_string(),
            owner_id: "owner".to_string(),
            created_at: Utc::now(),
            clicks: 0,
        }
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let cache = MokaCache::new(&CacheConfig::default());
        cache.put("abc", record("abc"), None).await;

        let hit = cache.get("abc").await.unwrap();
        assert_eq!(hit.long_url, "https://example.com/page");
        assert!(cache.get("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let cache = MokaCache::new(&CacheConfig::default());
        cache.put("abc", record("abc"), None).await;

        let mut updated = record("abc");
        updated.long_url = "https://example.com/other".to_string();
        cache.put("abc", updated, Some(60)).await;

        assert_eq!(
            cache.get("abc").await.unwrap().long_url,
            "https://example.com/other"
        );
    }
}
