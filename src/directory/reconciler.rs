//! 预留回收任务
//!
//! 写入方在 reserve 之后、commit 之前崩溃会留下永远不提交的预留，
//! 占住短键。回收器周期性扫掉超时的预留条目，让键可以重新使用。
//! 已提交条目永远不会被回收。

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use tracing::{debug, error, info, warn};

use super::Directory;
use crate::config::DirectoryConfig;

/// 预留回收任务
pub struct ReservationReconciler {
    directory: Arc<dyn Directory>,
    /// 预留存活秒数，超过即视为写入方已死
    reservation_timeout_secs: u64,
    /// 扫描周期
    interval_secs: u64,
    /// 每批删除行数
    batch_size: u64,
}

impl ReservationReconciler {
    pub fn new(directory: Arc<dyn Directory>, config: &DirectoryConfig) -> Self {
        Self {
            directory,
            reservation_timeout_secs: config.reservation_timeout_secs,
            interval_secs: config.reconcile_interval_secs,
            batch_size: config.reconcile_batch_size,
        }
    }

    /// 执行一轮回收，返回删除的条目数
    ///
    /// 分批删除避免长事务；批次之间短暂停顿给正常流量让路。
    pub async fn sweep_once(&self) -> crate::errors::Result<u64> {
        let cutoff = Utc::now() - Duration::seconds(self.reservation_timeout_secs as i64);

        let mut total_deleted = 0u64;
        let mut iterations = 0;
        let max_iterations = 1000; // 防止无限循环

        loop {
            if iterations >= max_iterations {
                warn!(
                    "Reservation sweep reached max iterations {} (deleted {} rows)",
                    max_iterations, total_deleted
                );
                break;
            }

            let deleted = self.directory.sweep_stale(cutoff, self.batch_size).await?;
            if deleted == 0 {
                break;
            }

            total_deleted += deleted;
            iterations += 1;

            debug!(
                "Reservation sweep batch {}: deleted {} rows (total {})",
                iterations, deleted, total_deleted
            );

            if deleted < self.batch_size {
                break;
            }

            tokio::time::sleep(StdDuration::from_millis(100)).await;
        }

        if total_deleted > 0 {
            info!("Reservation sweep removed {} stale entries", total_deleted);
        }
        Ok(total_deleted)
    }

    /// 启动后台回收任务
    pub fn spawn_background_task(self: Arc<Self>) {
        let interval_secs = self.interval_secs;
        let reservation_timeout_secs = self.reservation_timeout_secs;
        tokio::spawn(async move {
            let interval = StdDuration::from_secs(interval_secs);

            loop {
                tokio::time::sleep(interval).await;

                if let Err(e) = self.sweep_once().await {
                    error!("Reservation sweep failed: {}", e);
                }
            }
        });

        info!(
            "Reservation reconciler started (interval: {}s, timeout: {}s)",
            interval_secs, reservation_timeout_secs
        );
    }
}
