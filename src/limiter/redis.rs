use async_trait::async_trait;
use redis::{AsyncCommands, aio::MultiplexedConnection};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, trace};

use super::{Admission, RateLimiter, Tier, TierPolicies};
use crate::config::LimiterConfig;
use crate::errors::{LinkshardError, Result};

/// Redis-backed limiter, shared across processes.
///
/// Admission is one of two atomic commands: `SET key limit-1 NX EX window`
/// claims a fresh window and its first token in one step, and a lone `DECR`
/// both spends and reads the counter. There is no separate read-then-write
/// anywhere, so concurrent callers cannot overshoot the budget.
pub struct RedisLimiter {
    client: redis::Client,
    /// 持久化连接，使用 RwLock 保护
    connection: Arc<RwLock<Option<MultiplexedConnection>>>,
    key_prefix: String,
    policies: TierPolicies,
}

impl RedisLimiter {
    pub fn new(config: &LimiterConfig) -> Result<Self> {
        let client = redis::Client::open(config.redis_url.clone()).map_err(|e| {
            LinkshardError::cache_connection(format!(
                "Failed to create Redis client ({}): {}",
                config.redis_url, e
            ))
        })?;

        debug!("RedisLimiter created with prefix: '{}'", config.key_prefix);

        Ok(Self {
            client,
            connection: Arc::new(RwLock::new(None)),
            key_prefix: config.key_prefix.clone(),
            policies: TierPolicies::from_config(config),
        })
    }

    /// 获取或建立持久连接
    async fn get_connection(&self) -> std::result::Result<MultiplexedConnection, redis::RedisError> {
        {
            let conn_guard = self.connection.read().await;
            if let Some(ref conn) = *conn_guard {
                return Ok(conn.clone());
            }
        }

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

    fn make_key(&self, identity: &str, tier: Tier) -> String {
        format!("{}{}:{}", self.key_prefix, tier.key_fragment(), identity)
    }
}

#[async_trait]
impl RateLimiter for RedisLimiter {
    async fn allow(&self, identity: &str, tier: Tier) -> Result<Admission> {
        let policy = self.policies.policy(tier);
        if policy.limit == 0 {
            return Ok(Admission::Denied {
                retry_after_secs: policy.window_secs,
            });
        }

        let key = self.make_key(identity, tier);

        let mut conn = match self.get_connection().await {
            Ok(c) => c,
            Err(e) => {
                error!("Failed to get Redis connection: {}", e);
                self.reset_connection().await;
                return Err(e.into());
            }
        };

        // 首请求：原子地建窗口并预扣一个令牌。NX 保证并发下只有一个赢家
        let claimed = redis::cmd("SET")
            .arg(&key)
            .arg(policy.limit - 1)
            .arg("NX")
            .arg("EX")
            .arg(policy.window_secs)
            .query_async::<Option<String>>(&mut conn)
            .await;

        let claimed = match claimed {
            Ok(v) => v,
            Err(e) => {
                error!("Rate limit SET failed for '{}': {}", key, e);
                self.reset_connection().await;
                return Err(e.into());
            }
        };

        if claimed.is_some() {
            trace!("New rate window opened: {}", key);
            return Ok(Admission::Granted {
                remaining: policy.limit - 1,
            });
        }

        // 窗口已存在：DECR 一步完成扣减和读取，非负即放行
        let tokens: redis::RedisResult<i64> = conn.decr(&key, 1).await;
        let tokens = match tokens {
            Ok(v) => v,
            Err(e) => {
                error!("Rate limit DECR failed for '{}': {}", key, e);
                self.reset_connection().await;
                return Err(e.into());
            }
        };

        if tokens >= 0 {
            return Ok(Admission::Granted {
                remaining: tokens as u64,
            });
        }

        let ttl: redis::RedisResult<i64> = conn.ttl(&key).await;
        let retry_after_secs = match ttl {
            // TTL 为负表示键已过期或无过期时间，都按可立即重试处理
            Ok(secs) => secs.max(0) as u64,
            Err(e) => {
                error!("Rate limit TTL failed for '{}': {}", key, e);
                self.reset_connection().await;
                return Err(e.into());
            }
        };

        trace!("Rate limit exceeded: {} (retry in {}s)", key, retry_after_secs);
        Ok(Admission::Denied { retry_after_secs })
    }
}
