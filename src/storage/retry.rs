//! 数据库操作重试模块
//!
//! 目录预留、分片写入与聚合折叠都经过这里：瞬态错误（断线、死锁、
//! 锁等待）做指数退避重试，其余错误立刻上抛，由调用方决定补偿动作

use std::future::Future;
use std::time::Duration;

use sea_orm::DbErr;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::DatabaseConfig;

/// 重试参数，每个 SQL 后端从自己的配置段读一份
#[derive(Clone, Copy)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl RetryConfig {
    /// 从数据库配置段读取重试参数
    pub fn from_config(config: &DatabaseConfig) -> Self {
        Self {
            max_retries: config.retry_count,
            base_delay_ms: config.retry_base_delay_ms,
            max_delay_ms: config.retry_max_delay_ms,
        }
    }

    /// 第 `attempt` 次重试前的退避时长：指数增长、封顶、加 0-25% 抖动
    fn backoff(&self, attempt: u32) -> Duration {
        use rand::RngExt;
        let doubled = self
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt - 1));
        let capped = doubled.min(self.max_delay_ms);
        // 抖动错开同时失败的调用方
        let jitter = rand::rng().random_range(0..=capped / 4);
        Duration::from_millis(capped.saturating_add(jitter))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 100,
            max_delay_ms: 2000,
        }
    }
}

/// 指数退避重试执行器
pub async fn with_retry<T, F, Fut>(
    operation_name: &str,
    config: RetryConfig,
    operation: F,
) -> Result<T, DbErr>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DbErr>>,
{
    execute(operation_name, config, None, operation).await
}

/// 带单次超时的重试执行器
///
/// 跨区分片写入用它兜住慢响应：每次尝试独立计时，超时按一次失败
/// 尝试处理，预算耗尽后整体报超时错误
pub async fn with_retry_timeout<T, F, Fut>(
    operation_name: &str,
    config: RetryConfig,
    timeout_ms: u64,
    operation: F,
) -> Result<T, DbErr>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DbErr>>,
{
    execute(operation_name, config, Some(timeout_ms), operation).await
}

async fn execute<T, F, Fut>(
    operation_name: &str,
    config: RetryConfig,
    attempt_timeout_ms: Option<u64>,
    mut operation: F,
) -> Result<T, DbErr>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DbErr>>,
{
    let mut attempt = 0;
    loop {
        // None 表示本次尝试超时，只在设置了单次超时的路径出现
        let outcome = match attempt_timeout_ms {
            Some(ms) => tokio::time::timeout(Duration::from_millis(ms), operation())
                .await
                .ok(),
            None => Some(operation().await),
        };

        match outcome {
            Some(Ok(value)) => {
                if attempt > 0 {
                    debug!(
                        "Operation '{}' succeeded after {} retries",
                        operation_name, attempt
                    );
                }
                return Ok(value);
            }
            Some(Err(e)) if !is_transient_error(&e) => {
                debug!(
                    "Operation '{}' failed with non-retryable error: {}",
                    operation_name, e
                );
                return Err(e);
            }
            Some(Err(e)) => {
                if attempt >= config.max_retries {
                    warn!(
                        "Operation '{}' failed after {} attempts: {}",
                        operation_name,
                        attempt + 1,
                        e
                    );
                    return Err(e);
                }
                attempt += 1;
                let delay = config.backoff(attempt);
                warn!(
                    "Operation '{}' failed (attempt {}/{}): {}; retrying in {} ms",
                    operation_name,
                    attempt,
                    config.max_retries + 1,
                    e,
                    delay.as_millis()
                );
                sleep(delay).await;
            }
            None => {
                let timeout_ms = attempt_timeout_ms.unwrap_or_default();
                if attempt >= config.max_retries {
                    warn!(
                        "Operation '{}' timed out after {}ms, retries exhausted",
                        operation_name, timeout_ms
                    );
                    return Err(DbErr::Custom(format!(
                        "Operation '{}' timed out after {}ms",
                        operation_name, timeout_ms
                    )));
                }
                attempt += 1;
                let delay = config.backoff(attempt);
                warn!(
                    "Operation '{}' timed out after {}ms (attempt {}/{}); retrying in {} ms",
                    operation_name,
                    timeout_ms,
                    attempt,
                    config.max_retries + 1,
                    delay.as_millis()
                );
                sleep(delay).await;
            }
        }
    }
}

/// 判断数据库错误是否值得重试
pub fn is_transient_error(err: &DbErr) -> bool {
    match err {
        // 连接池取不到连接、连接中断
        DbErr::ConnectionAcquire(_) | DbErr::Conn(_) => true,
        DbErr::Exec(runtime_err) | DbErr::Query(runtime_err) => {
            transient_runtime_error(runtime_err)
        }
        _ => false,
    }
}

fn transient_runtime_error(err: &sea_orm::error::RuntimeErr) -> bool {
    use sea_orm::error::RuntimeErr;

    match err {
        RuntimeErr::SqlxError(sqlx_err) => {
            use std::ops::Deref;
            if let Some(db_err) = sqlx_err.deref().as_database_error() {
                if let Some(code) = db_err.code() {
                    // MySQL 死锁/锁等待，PostgreSQL 串行化失败/死锁，
                    // SQLite BUSY/LOCKED
                    return matches!(
                        code.as_ref(),
                        "1213" | "1205" | "40001" | "40P01" | "5" | "6"
                    );
                }
            }
            transient_message(&sqlx_err.to_string().to_lowercase())
        }
        RuntimeErr::Internal(msg) => transient_message(&msg.to_lowercase()),
        #[allow(unreachable_patterns)]
        _ => false,
    }
}

/// 错误码拿不到时按消息内容兜底判断
fn transient_message(err_str: &str) -> bool {
    err_str.contains("deadlock")
        || err_str.contains("lock wait timeout")
        || err_str.contains("database is locked")
        || err_str.contains("serialization failure")
}
