use async_trait::async_trait;
use redis::{AsyncCommands, aio::MultiplexedConnection};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, trace};

use super::CacheLayer;
use crate::config::CacheConfig;
use crate::errors::{LinkshardError, Result};
use crate::shard::ShardRecord;

pub struct RedisCache {
    client: redis::Client,
    /// 持久化连接，使用 RwLock 保护
    connection: Arc<RwLock<Option<MultiplexedConnection>>>,
    key_prefix: String,
    default_ttl: u64,
}

impl RedisCache {
    pub fn new(config: &CacheConfig) -> Result<Self> {
        let redis_config = &config.redis;

        debug!(
            "RedisCache created with prefix: '{}', TTL: {}s",
            redis_config.key_prefix, config.default_ttl
        );

        let client = redis::Client::open(redis_config.url.clone()).map_err(|e| {
            LinkshardError::cache_connection(format!(
                "Failed to create Redis client ({}): {}",
                redis_config.url, e
            ))
        })?;

        Ok(Self {
            client,
            connection: Arc::new(RwLock::new(None)),
            key_prefix: redis_config.key_prefix.clone(),
            default_ttl: config.default_ttl,
        })
    }

    /// 获取或建立持久连接
    async fn get_connection(&self) -> std::result::Result<MultiplexedConnection, redis::RedisError> {
        // 首先尝试读取现有连接
        {
            let conn_guard = self.connection.read().await;
            if let Some(ref conn) = *conn_guard {
                return Ok(conn.clone());
            }
        }

        // 需要建立新连接
        let mut conn_guard = self.connection.write().await;

        // 双重检查，避免竞态条件
        if let Some(ref conn) = *conn_guard {
            return Ok(conn.clone());
        }

        let new_conn = self.client.get_multiplexed_async_connection().await?;
        *conn_guard = Some(new_conn.clone());
        debug!("Redis connection established and cached");

        Ok(new_conn)
    }

    /// 重置连接（在连接错误时调用）
    async fn reset_connection(&self) {
        let mut conn_guard = self.connection.write().await;
        *conn_guard = None;
        debug!("Redis connection reset due to error");
    }

    fn make_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }
}

#[async_trait]
impl CacheLayer for RedisCache {
    async fn get(&self, key: &str) -> Option<ShardRecord> {
        let redis_key = self.make_key(key);

        let mut conn = match self.get_connection().await {
            Ok(c) => c,
            Err(e) => {
                error!("Failed to get Redis connection: {}", e);
                self.reset_connection().await;
                return None;
            }
        };

        let result: redis::RedisResult<Option<String>> = conn.get(&redis_key).await;

        match result {
            Ok(Some(data)) => match serde_json::from_str::<ShardRecord>(&data) {
                Ok(record) => {
                    trace!("Cache hit: {}", key);
                    Some(record)
                }
                Err(e) => {
                    error!("Failed to deserialize cached record for '{}': {}", key, e);
                    None
                }
            },
            Ok(None) => {
                trace!("Cache miss: {}", key);
                None
            }
            Err(e) => {
                error!("Failed to get key '{}': {}", key, e);
                // 连接可能已断开，重置连接
                self.reset_connection().await;
                None
            }
        }
    }

    async fn put(&self, key: &str, record: ShardRecord, ttl_secs: Option<u64>) {
        let redis_key = self.make_key(key);
        let ttl = ttl_secs.unwrap_or(self.default_ttl);

        let mut conn = match self.get_connection().await {
            Ok(c) => c,
            Err(e) => {
                error!("Failed to get Redis connection: {}", e);
                self.reset_connection().await;
                return;
            }
        };

        match serde_json::to_string(&record) {
            Ok(serialized) => {
                match conn
                    .set_ex::<String, String, ()>(redis_key, serialized, ttl)
                    .await
                {
                    Ok(_) => {
                        trace!("Cached key '{}' for {}s", key, ttl);
                    }
                    Err(e) => {
                        error!("Failed to cache key '{}': {}", key, e);
                        self.reset_connection().await;
                    }
                }
            }
            Err(e) => {
                error!("Failed to serialize record for '{}': {}", key, e);
            }
        }
    }
}
