//! 分片 clicks 列的批量计数器
//!
//! resolve 路径只在内存缓冲里加一，不碰数据库。缓冲达到阈值或
//! 定时器到期时按分片分组刷写，刷写失败的条目放回缓冲等下一轮。
//! 该计数只是信息性的，权威数字在分析聚合表里。

use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};
use tokio::sync::Mutex;
use tokio::time::{Duration, sleep};
use tracing::{debug, trace, warn};

use crate::config::AnalyticsConfig;
use crate::shard::ShardRouter;

/// 点击缓冲区状态，封装所有可变状态
struct ClickBuffer {
    /// (分片序号, 短键) → 未刷写的点击数
    data: DashMap<(u32, String), u64>,
    /// 缓冲区中的总点击数（用于阈值判断）
    total_clicks: AtomicUsize,
    /// 刷盘锁，防止并发刷盘
    flush_lock: Mutex<()>,
    /// 是否有 flush 任务待处理（防止重复 spawn）
    flush_pending: AtomicBool,
}

impl ClickBuffer {
    fn new() -> Self {
        Self {
            data: DashMap::new(),
            total_clicks: AtomicUsize::new(0),
            flush_lock: Mutex::new(()),
            flush_pending: AtomicBool::new(false),
        }
    }

    /// 增加点击计数，返回缓冲区当前总量
    fn increment(&self, shard_index: u32, short_key: &str) -> usize {
        self.data
            .entry((shard_index, short_key.to_string()))
            .and_modify(|v| *v += 1)
            .or_insert(1);
        trace!("ClickBuffer: Incremented key: {}", short_key);

        self.total_clicks.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// 收集所有更新并清空缓冲区（逐个 remove 避免竞态）
    fn drain(&self) -> Vec<((u32, String), u64)> {
        let keys: Vec<(u32, String)> = self.data.iter().map(|r| r.key().clone()).collect();

        let mut updates = Vec::with_capacity(keys.len());
        let mut total_removed = 0;
        for key in keys {
            if let Some((k, v)) = self.data.remove(&key) {
                total_removed += v as usize;
                updates.push((k, v));
            }
        }

        if total_removed > 0 {
            self.total_clicks
                .fetch_update(Ordering::Release, Ordering::Relaxed, |current| {
                    Some(current.saturating_sub(total_removed))
                })
                .ok();
        }

        updates
    }

    /// 恢复数据到缓冲区（用于刷盘失败时的恢复）
    fn restore(&self, updates: Vec<((u32, String), u64)>) {
        let mut restored_total = 0;
        for (key, count) in updates {
            *self.data.entry(key).or_insert(0) += count;
            restored_total += count as usize;
        }
        self.total_clicks
            .fetch_add(restored_total, Ordering::Relaxed);
    }

    fn total(&self) -> usize {
        self.total_clicks.load(Ordering::Relaxed)
    }
}

/// 点击计数器
///
/// 状态完全封装在结构体内部，便于测试和多实例使用。
#[derive(Clone)]
pub struct ClickCounter {
    buffer: Arc<ClickBuffer>,
    router: Arc<ShardRouter>,
    /// 刷盘间隔
    flush_interval: Duration,
    /// 触发刷盘的最大点击数
    max_clicks_before_flush: usize,
}

impl ClickCounter {
    pub fn new(router: Arc<ShardRouter>, config: &AnalyticsConfig) -> Self {
        Self {
            buffer: Arc::new(ClickBuffer::new()),
            router,
            flush_interval: Duration::from_secs(config.click_flush_interval_secs),
            max_clicks_before_flush: config.click_flush_threshold,
        }
    }

    /// 增加点击计数（线程安全，无锁）
    pub fn increment(&self, shard_index: u32, short_key: &str) {
        let current_size = self.buffer.increment(shard_index, short_key);
        trace!("ClickCounter: Current buffer size: {}", current_size);

        // 检查是否达到阈值，尝试触发刷盘
        if current_size >= self.max_clicks_before_flush {
            // 使用 compare_exchange 防止任务风暴：
            // 只有成功将 flush_pending 从 false 设为 true 的线程才 spawn
            if self
                .buffer
                .flush_pending
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::Relaxed)
                .is_ok()
            {
                let buffer = Arc::clone(&self.buffer);
                let router = Arc::clone(&self.router);
                tokio::spawn(async move {
                    if let Ok(_guard) = buffer.flush_lock.try_lock() {
                        Self::flush_buffer(&buffer, &router).await;
                    } else {
                        trace!("ClickCounter: flush already in progress, skipping");
                    }
                    // 无论成功与否都重置标志，允许下次触发
                    buffer.flush_pending.store(false, Ordering::Release);
                });
            }
        }
    }

    /// 启动后台刷盘任务（作为异步方法运行）
    pub async fn start_background_task(&self) {
        loop {
            sleep(self.flush_interval).await;

            debug!("ClickCounter: Triggering scheduled flush");
            if let Ok(_guard) = self.buffer.flush_lock.try_lock() {
                Self::flush_buffer(&self.buffer, &self.router).await;
            } else {
                trace!("ClickCounter: flush already in progress, skipping scheduled flush");
            }
        }
    }

    /// 手动触发刷盘（阻塞直到完成）
    pub async fn flush(&self) {
        debug!("ClickCounter: Manual flush triggered");
        let _guard = self.buffer.flush_lock.lock().await;
        Self::flush_buffer(&self.buffer, &self.router).await;
    }

    /// 执行实际的刷盘操作，按分片分组写
    async fn flush_buffer(buffer: &ClickBuffer, router: &Arc<ShardRouter>) {
        let updates = buffer.drain();

        if updates.is_empty() {
            trace!("ClickCounter: No clicks to flush");
            return;
        }

        let mut by_shard: HashMap<u32, Vec<(String, u64)>> = HashMap::new();
        for ((shard_index, short_key), count) in updates {
            by_shard
                .entry(shard_index)
                .or_default()
                .push((short_key, count));
        }

        for (shard_index, shard_updates) in by_shard {
            let store = match router.store(shard_index) {
                Ok(store) => store,
                Err(e) => {
                    // 分片序号越界说明拓扑配置错了，这批计数没有归宿
                    warn!(
                        "ClickCounter: dropping {} entries: {}",
                        shard_updates.len(),
                        e
                    );
                    continue;
                }
            };

            let count = shard_updates.len();
            match store.apply_click_counts(shard_updates.clone()).await {
                Ok(_) => {
                    debug!(
                        "ClickCounter: Successfully flushed {} entries to shard {}",
                        count, shard_index
                    );
                }
                Err(e) => {
                    // 刷盘失败，恢复数据到 buffer
                    buffer.restore(
                        shard_updates
                            .into_iter()
                            .map(|(key, n)| ((shard_index, key), n))
                            .collect(),
                    );
                    warn!(
                        "ClickCounter: flush to shard {} failed: {}, {} entries restored",
                        shard_index, e, count
                    );
                }
            }
        }
    }

    /// 获取当前缓冲区总点击数（用于监控）
    pub fn buffer_size(&self) -> usize {
        self.buffer.total()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::LinkId;
    use crate::shard::{MemoryShard, ShardRecord, ShardStore};
    use chrono::Utc;

    async fn router_with_record(key: &str) -> (Arc<ShardRouter>, Arc<MemoryShard>) {
        let shard = Arc::new(MemoryShard::new());
        shard
            .insert(&ShardRecord {
                id: LinkId::from_i64(1),
                short_key: key.to_string(),
                long_url: "https://example.com".to_string(),
                owner_id: "o".to_string(),
                created_at: Utc::now(),
                clicks: 0,
            })
            .await
            .unwrap();
        let router =
            Arc::new(ShardRouter::new(vec![shard.clone() as Arc<dyn ShardStore>]).unwrap());
        (router, shard)
    }

    fn config(threshold: usize) -> AnalyticsConfig {
        AnalyticsConfig {
            click_flush_threshold: threshold,
            click_flush_interval_secs: 3600,
            ..AnalyticsConfig::default()
        }
    }

    #[tokio::test]
    async fn test_increment_and_flush() {
        let (router, shard) = router_with_record("abc").await;
        let counter = ClickCounter::new(router, &config(10_000));

        counter.increment(0, "abc");
        counter.increment(0, "abc");
        counter.increment(0, "abc");
        assert_eq!(counter.buffer_size(), 3);

        counter.flush().await;
        assert_eq!(counter.buffer_size(), 0);

        let record = shard.get_by_key("abc").await.unwrap().unwrap();
        assert_eq!(record.clicks, 3);
    }

    #[tokio::test]
    async fn test_concurrent_increment() {
        let (router, shard) = router_with_record("hot").await;
        let counter = Arc::new(ClickCounter::new(router, &config(1_000_000)));

        const NUM_TASKS: usize = 10;
        const INCREMENTS_PER_TASK: usize = 500;

        let mut handles = vec![];
        for _ in 0..NUM_TASKS {
            let c = Arc::clone(&counter);
            handles.push(tokio::spawn(async move {
                for _ in 0..INCREMENTS_PER_TASK {
                    c.increment(0, "hot");
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(counter.buffer_size(), NUM_TASKS * INCREMENTS_PER_TASK);
        counter.flush().await;

        let record = shard.get_by_key("hot").await.unwrap().unwrap();
        assert_eq!(record.clicks, (NUM_TASKS * INCREMENTS_PER_TASK) as u64);
    }

    #[tokio::test]
    async fn test_out_of_range_shard_dropped_without_panic() {
        let (router, _shard) = router_with_record("abc").await;
        let counter = ClickCounter::new(router, &config(10_000));

        counter.increment(9, "abc");
        counter.flush().await;
        assert_eq!(counter.buffer_size(), 0);
    }
}
