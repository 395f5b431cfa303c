//! 聚合器
//!
//! 周期性地把未处理的原始事件折叠进按天聚合表。折叠是纯函数，
//! 落库由存储后端在单个事务里完成，所以任何一步失败都只是把
//! 这批事件留给下个周期。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tracing::{debug, error, info};

use super::{AggregateDelta, AnalyticsStore, PendingEvent};
use crate::config::AnalyticsConfig;
use crate::errors::Result;

/// 把一批原始事件按 (链接, 日) 折叠成聚合增量
///
/// unique_visitors 在批内按 requester_hash 去重；跨批只能相加，
/// 这是刻意保留的近似口径。
pub(crate) fn fold_events(pending: &[PendingEvent]) -> Vec<AggregateDelta> {
    let mut buckets: HashMap<(i64, NaiveDate), (AggregateDelta, HashSet<&str>)> = HashMap::new();

    for item in pending {
        let event = &item.event;
        let key = (event.short_url_id, event.day_bucket());
        let (delta, visitors) = buckets.entry(key).or_insert_with(|| {
            (
                AggregateDelta {
                    short_url_id: key.0,
                    day: key.1,
                    ..AggregateDelta::default()
                },
                HashSet::new(),
            )
        });

        delta.total_clicks += 1;
        visitors.insert(event.requester_hash.as_str());
        *delta.country_stats.entry(event.region.clone()).or_insert(0) += 1;
        if let Some(device) = &event.device {
            *delta.device_stats.entry(device.clone()).or_insert(0) += 1;
        }
        if let Some(referrer) = &event.referrer {
            *delta.referrer_stats.entry(referrer.clone()).or_insert(0) += 1;
        }
    }

    let mut deltas: Vec<AggregateDelta> = buckets
        .into_values()
        .map(|(mut delta, visitors)| {
            delta.unique_visitors = visitors.len() as u64;
            delta
        })
        .collect();
    deltas.sort_by_key(|d| (d.short_url_id, d.day));
    deltas
}

/// 点击聚合任务
pub struct Aggregator {
    store: Arc<dyn AnalyticsStore>,
    interval_secs: u64,
    batch_size: u64,
}

impl Aggregator {
    pub fn new(store: Arc<dyn AnalyticsStore>, config: &AnalyticsConfig) -> Self {
        Self {
            store,
            interval_secs: config.aggregate_interval_secs,
            batch_size: config.aggregate_batch_size,
        }
    }

    /// 执行一轮聚合，返回处理的事件行数
    pub async fn run_once(&self) -> Result<u64> {
        let mut total_rows = 0u64;

        loop {
            let pending = self.store.fetch_unprocessed(self.batch_size).await?;
            if pending.is_empty() {
                break;
            }

            let fetched = pending.len() as u64;
            let row_ids: Vec<String> = pending.iter().map(|p| p.row_id.clone()).collect();
            let deltas = fold_events(&pending);

            self.store.fold_batch(&deltas, &row_ids).await?;
            total_rows += fetched;

            debug!(
                "Aggregated batch of {} events into {} buckets",
                fetched,
                deltas.len()
            );

            if fetched < self.batch_size {
                break;
            }
        }

        if total_rows > 0 {
            info!("Aggregation pass folded {} events", total_rows);
        }
        Ok(total_rows)
    }

    /// 启动后台聚合任务
    pub fn spawn_background_task(self: Arc<Self>) {
        let interval_secs = self.interval_secs;
        tokio::spawn(async move {
            let interval = Duration::from_secs(interval_secs);

            loop {
                tokio::time::sleep(interval).await;

                if let Err(e) = self.run_once().await {
                    // 失败不中断任务，未处理行留给下个周期
                    error!("Aggregation pass failed: {}", e);
                }
            }
        });

        info!("Click aggregator started (interval: {}s)", interval_secs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::{ClickEvent, MemoryAnalytics};
    use chrono::{TimeZone, Utc};

    fn event(id: i64, hash: &str, day: u32, device: Option<&str>) -> ClickEvent {
        ClickEvent {
            short_url_id: id,
            short_key: "k".to_string(),
            requester_hash: hash.to_string(),
            region: "asia".to_string(),
            referrer: None,
            device: device.map(str::to_string),
            timestamp: Utc.with_ymd_and_hms(2026, 4, day, 12, 0, 0).unwrap(),
        }
    }

    fn pending(events: &[ClickEvent]) -> Vec<PendingEvent> {
        events
            .iter()
            .enumerate()
            .map(|(i, e)| PendingEvent {
                row_id: format!("row-{i}"),
                event: e.clone(),
            })
            .collect()
    }

    fn config(batch: u64) -> AnalyticsConfig {
        AnalyticsConfig {
            aggregate_batch_size: batch,
            ..AnalyticsConfig::default()
        }
    }

    #[test]
    fn test_fold_groups_by_link_and_day() {
        let rows = pending(&[
            event(1, "a", 1, Some("pc")),
            event(1, "b", 1, Some("pc")),
            event(1, "a", 2, None),
            event(2, "a", 1, Some("smartphone")),
        ]);

        let deltas = fold_events(&rows);
        assert_eq!(deltas.len(), 3);

        let first = &deltas[0]; // (1, 4月1日)
        assert_eq!(first.total_clicks, 2);
        assert_eq!(first.unique_visitors, 2);
        assert_eq!(first.country_stats["asia"], 2);
        assert_eq!(first.device_stats["pc"], 2);
        assert!(first.referrer_stats.is_empty());

        let second = &deltas[1]; // (1, 4月2日)
        assert_eq!(second.total_clicks, 1);
        assert!(second.device_stats.is_empty());

        let third = &deltas[2]; // (2, 4月1日)
        assert_eq!(third.device_stats["smartphone"], 1);
    }

    #[test]
    fn test_fold_dedups_visitors_within_batch() {
        let rows = pending(&[
            event(1, "same", 1, None),
            event(1, "same", 1, None),
            event(1, "same", 1, None),
        ]);

        let deltas = fold_events(&rows);
        assert_eq!(deltas[0].total_clicks, 3);
        assert_eq!(deltas[0].unique_visitors, 1);
    }

    #[tokio::test]
    async fn test_run_once_is_idempotent() {
        let store = Arc::new(MemoryAnalytics::new());
        for hash in ["a", "b"] {
            store.insert_event(&event(1, hash, 1, None)).await.unwrap();
        }

        let aggregator = Aggregator::new(store.clone(), &config(500));
        assert_eq!(aggregator.run_once().await.unwrap(), 2);

        // 再跑一轮：没有未处理行，聚合不变
        assert_eq!(aggregator.run_once().await.unwrap(), 0);

        let rows = store.aggregates_between(1, None, None).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].total_clicks, 2);
    }

    #[tokio::test]
    async fn test_later_events_merge_additively() {
        let store = Arc::new(MemoryAnalytics::new());
        let aggregator = Aggregator::new(store.clone(), &config(500));

        store.insert_event(&event(1, "a", 1, None)).await.unwrap();
        aggregator.run_once().await.unwrap();

        store.insert_event(&event(1, "a", 1, None)).await.unwrap();
        aggregator.run_once().await.unwrap();

        let rows = store.aggregates_between(1, None, None).await.unwrap();
        assert_eq!(rows[0].total_clicks, 2);
        // 同一访问者跨批被算两次，近似口径使然
        assert_eq!(rows[0].unique_visitors, 2);
        assert_eq!(rows[0].country_stats["asia"], 2);
    }

    #[tokio::test]
    async fn test_run_once_drains_in_batches() {
        let store = Arc::new(MemoryAnalytics::new());
        for i in 0..7 {
            store
                .insert_event(&event(1, &format!("h{i}"), 1, None))
                .await
                .unwrap();
        }

        let aggregator = Aggregator::new(store.clone(), &config(3));
        assert_eq!(aggregator.run_once().await.unwrap(), 7);
        assert!(store.fetch_unprocessed(10).await.unwrap().is_empty());
    }
}
