//! Analytics pipeline tests
//!
//! Runs the SeaORM-backed analytics store against temporary SQLite
//! databases: raw event persistence, the aggregation fold with its
//! processed-marker idempotency, date-range queries, and the
//! topic → consumer → aggregator pipeline end to end.

use std::sync::Arc;

use chrono::{NaiveDate, TimeZone, Utc};
use linkshard::analytics::{
    Aggregator, AnalyticsStore, ClickEvent, EventConsumer, EventProducer, EventTopic,
    SeaOrmAnalytics,
};
use linkshard::config::AnalyticsConfig;
use linkshard::id::LinkId;
use tempfile::TempDir;

async fn create_temp_analytics() -> (Arc<SeaOrmAnalytics>, TempDir) {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp.path().join("analytics.db");
    let url = format!("sqlite://{}?mode=rwc", db_path.display());
    let store = SeaOrmAnalytics::new(&url, &Default::default())
        .await
        .expect("Failed to create analytics store");
    (Arc::new(store), temp)
}

/// 固定时间戳的事件，day 取 2026 年 3 月内的日期
fn event(id: i64, hash: &str, day: u32) -> ClickEvent {
    ClickEvent {
        short_url_id: id,
        short_key: "stats-key".to_string(),
        requester_hash: hash.to_string(),
        region: "asia".to_string(),
        referrer: None,
        device: None,
        timestamp: Utc.with_ymd_and_hms(2026, 3, day, 8, 0, 0).unwrap(),
    }
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
}

fn config(batch: u64) -> AnalyticsConfig {
    AnalyticsConfig {
        aggregate_batch_size: batch,
        ..AnalyticsConfig::default()
    }
}

// =============================================================================
// 原始事件落库
// =============================================================================

#[tokio::test]
async fn test_events_persist_and_fetch_in_time_order() {
    let (store, _temp) = create_temp_analytics().await;

    // 乱序写入，读取按点击时间排
    for d in [3, 1, 2] {
        store.insert_event(&event(1, "visitor", d)).await.unwrap();
    }

    let pending = store.fetch_unprocessed(10).await.unwrap();
    assert_eq!(pending.len(), 3);
    let days: Vec<NaiveDate> = pending.iter().map(|p| p.event.day_bucket()).collect();
    assert_eq!(days, vec![day(1), day(2), day(3)]);
}

#[tokio::test]
async fn test_event_fields_survive_round_trip() {
    let (store, _temp) = create_temp_analytics().await;

    let mut original = event(42, "cafebabecafebabe", 5);
    original.referrer = Some("https://news.example.com".to_string());
    original.device = Some("pc".to_string());
    store.insert_event(&original).await.unwrap();

    let pending = store.fetch_unprocessed(1).await.unwrap();
    assert_eq!(pending[0].event, original);
    assert!(!pending[0].row_id.is_empty());
}

#[tokio::test]
async fn test_fetch_respects_limit() {
    let (store, _temp) = create_temp_analytics().await;

    for i in 0..5 {
        store
            .insert_event(&event(1, &format!("v{}", i), 10))
            .await
            .unwrap();
    }
    assert_eq!(store.fetch_unprocessed(2).await.unwrap().len(), 2);
}

// =============================================================================
// 聚合折叠与幂等
// =============================================================================

#[tokio::test]
async fn test_aggregation_folds_and_marks_processed() {
    let (store, _temp) = create_temp_analytics().await;

    // 链接 1：三次点击，两个访问者；链接 2：一次
    for hash in ["a", "a", "b"] {
        store.insert_event(&event(1, hash, 5)).await.unwrap();
    }
    store.insert_event(&event(2, "c", 5)).await.unwrap();

    let aggregator = Aggregator::new(store.clone(), &config(500));
    assert_eq!(aggregator.run_once().await.unwrap(), 4);

    let rows = store.aggregates_between(1, None, None).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].day, day(5));
    assert_eq!(rows[0].total_clicks, 3);
    assert_eq!(rows[0].unique_visitors, 2);
    assert_eq!(rows[0].country_stats["asia"], 3);

    // 处理过的行不会再被取出，重跑聚合不改数字
    assert!(store.fetch_unprocessed(10).await.unwrap().is_empty());
    assert_eq!(aggregator.run_once().await.unwrap(), 0);
    let rows = store.aggregates_between(1, None, None).await.unwrap();
    assert_eq!(rows[0].total_clicks, 3);
}

#[tokio::test]
async fn test_cross_batch_merge_is_additive() {
    let (store, _temp) = create_temp_analytics().await;
    let aggregator = Aggregator::new(store.clone(), &config(500));

    let mut first = event(9, "same-visitor", 2);
    first.device = Some("pc".to_string());
    store.insert_event(&first).await.unwrap();
    aggregator.run_once().await.unwrap();

    let mut second = event(9, "same-visitor", 2);
    second.device = Some("smartphone".to_string());
    store.insert_event(&second).await.unwrap();
    aggregator.run_once().await.unwrap();

    let rows = store.aggregates_between(9, None, None).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].total_clicks, 2);
    // 同一访问者跨批算了两次，近似口径
    assert_eq!(rows[0].unique_visitors, 2);
    assert_eq!(rows[0].device_stats["pc"], 1);
    assert_eq!(rows[0].device_stats["smartphone"], 1);
}

#[tokio::test]
async fn test_backlog_larger_than_batch_drains_fully() {
    let (store, _temp) = create_temp_analytics().await;

    for i in 0..7 {
        store
            .insert_event(&event(3, &format!("v{}", i), 8))
            .await
            .unwrap();
    }

    let aggregator = Aggregator::new(store.clone(), &config(3));
    assert_eq!(aggregator.run_once().await.unwrap(), 7);
    assert!(store.fetch_unprocessed(10).await.unwrap().is_empty());

    let rows = store.aggregates_between(3, None, None).await.unwrap();
    assert_eq!(rows[0].total_clicks, 7);
}

// =============================================================================
// 日期范围查询
// =============================================================================

#[tokio::test]
async fn test_date_range_bounds_are_inclusive() {
    let (store, _temp) = create_temp_analytics().await;

    for d in [10, 12, 14] {
        store.insert_event(&event(4, "v", d)).await.unwrap();
    }
    Aggregator::new(store.clone(), &config(500))
        .run_once()
        .await
        .unwrap();

    let all = store.aggregates_between(4, None, None).await.unwrap();
    assert_eq!(all.len(), 3);
    let days: Vec<NaiveDate> = all.iter().map(|r| r.day).collect();
    assert_eq!(days, vec![day(10), day(12), day(14)]);

    // 边界日包含在内
    let bounded = store
        .aggregates_between(4, Some(day(10)), Some(day(12)))
        .await
        .unwrap();
    assert_eq!(bounded.len(), 2);

    let tail = store.aggregates_between(4, Some(day(13)), None).await.unwrap();
    assert_eq!(tail.len(), 1);
    assert_eq!(tail[0].day, day(14));

    let empty = store
        .aggregates_between(4, Some(day(11)), Some(day(11)))
        .await
        .unwrap();
    assert!(empty.is_empty());

    // 其他链接查不到这些行
    assert!(store.aggregates_between(5, None, None).await.unwrap().is_empty());
}

// =============================================================================
// 主题 → 消费者 → 聚合器端到端
// =============================================================================

#[tokio::test]
async fn test_pipeline_from_topic_to_aggregates() {
    let (store, _temp) = create_temp_analytics().await;

    let (topic, receiver) = EventTopic::bounded(16);
    let consumer = tokio::spawn(EventConsumer::new(store.clone()).run(receiver));

    let producer = EventProducer::new(topic);
    producer.emit(
        LinkId::from_i64(77),
        "wired",
        "198.51.100.1",
        "asia",
        Some("https://news.example.com"),
        None,
    );
    producer.emit(LinkId::from_i64(77), "wired", "198.51.100.1", "asia", None, None);
    producer.emit(LinkId::from_i64(77), "wired", "198.51.100.2", "asia", None, None);

    // 发布端关闭后消费循环自然退出
    drop(producer);
    consumer.await.unwrap();

    let pending = store.fetch_unprocessed(10).await.unwrap();
    assert_eq!(pending.len(), 3);
    assert!(pending.iter().all(|p| p.event.short_key == "wired"));
    // 事件里只有散列，原始调用方标识不落库
    assert!(pending.iter().all(|p| p.event.requester_hash.len() == 16));

    let aggregator = Aggregator::new(store.clone(), &config(500));
    assert_eq!(aggregator.run_once().await.unwrap(), 3);

    let rows = store.aggregates_between(77, None, None).await.unwrap();
    let total: u64 = rows.iter().map(|r| r.total_clicks).sum();
    let referrals: u64 = rows
        .iter()
        .filter_map(|r| r.referrer_stats.get("https://news.example.com"))
        .sum();
    assert_eq!(total, 3);
    assert_eq!(referrals, 1);
}
