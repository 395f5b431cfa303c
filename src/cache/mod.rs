//! Cache-aside layer in front of the shard stores.
//!
//! Entries expire by TTL only; nothing ever invalidates them, so a stale
//! window after any out-of-band change is expected and bounded by the TTL.
//! Misses are never cached: an unknown key always falls through to the
//! directory, so a key created moments ago resolves immediately.
//!
//! Cache trouble must never fail a request, both operations are
//! best-effort and log instead of returning errors.

mod moka;
mod null;
mod redis;

pub use moka::MokaCache;
pub use null::NullCache;
pub use redis::RedisCache;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::config::CacheConfig;
use crate::errors::{LinkshardError, Result};
use crate::shard::ShardRecord;

#[async_trait]
pub trait CacheLayer: Send + Sync {
    /// Cached record for a key, if present. Backend failures read as a miss.
    async fn get(&self, key: &str) -> Option<ShardRecord>;

    /// Store a record. `ttl_secs` overrides the configured default where the
    /// backend supports per-entry TTLs; backends with a cache-wide TTL ignore it.
    async fn put(&self, key: &str, record: ShardRecord, ttl_secs: Option<u64>);
}

/// 按配置构建缓存后端
pub fn build_cache(config: &CacheConfig) -> Result<Arc<dyn CacheLayer>> {
    let cache: Arc<dyn CacheLayer> = match config.cache_type.as_str() {
        "memory" => Arc::new(MokaCache::new(config)),
        "redis" => Arc::new(RedisCache::new(config)?),
        "null" => Arc::new(NullCache),
        other => {
            return Err(LinkshardError::backend_not_found(format!(
                "Cache backend not found: {}",
                other
            )));
        }
    };
    info!("Cache layer initialized: {}", config.cache_type);
    Ok(cache)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_cache_rejects_unknown_backend() {
        let config = CacheConfig {
            cache_type: "etcd".to_string(),
            ..CacheConfig::default()
        };
        let err = build_cache(&config).err().unwrap();
        assert_eq!(err.code(), "E013");
    }

    #[test]
    fn test_build_cache_memory_default() {
        assert!(build_cache(&CacheConfig::default()).is_ok());
    }
}
