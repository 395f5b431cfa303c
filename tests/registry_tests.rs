//! Full-stack registry tests
//!
//! Builds a [`UrlRegistry`] from configuration over temporary SQLite
//! databases and exercises the public facade: create, resolve, admission,
//! owner listing and the routing topology.

use std::sync::Arc;

use linkshard::config::StaticConfig;
use linkshard::limiter::{Admission, Tier};
use linkshard::services::{CreateRequest, RequestContext, UrlRegistry};
use linkshard::shard::{SeaOrmShard, ShardStore};
use tempfile::TempDir;

/// 指向临时库的最小配置：内存缓存、内存限流、N 个 SQLite 分片
fn test_config(temp: &TempDir, shard_count: usize) -> StaticConfig {
    let mut config = StaticConfig::default();
    let base = temp.path().display();

    config.directory.database_url = format!("sqlite://{}/directory.db?mode=rwc", base);
    config.analytics.database_url = format!("sqlite://{}/analytics.db?mode=rwc", base);
    config.shards.urls = (0..shard_count)
        .map(|i| format!("sqlite://{}/shard{}.db?mode=rwc", base, i))
        .collect();
    config.cache.cache_type = "memory".to_string();
    config.limiter.limiter_type = "memory".to_string();
    config
}

async fn create_registry(shard_count: usize) -> (UrlRegistry, TempDir) {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let registry = UrlRegistry::from_config(&test_config(&temp, shard_count))
        .await
        .expect("Failed to build registry");
    (registry, temp)
}

fn request(alias: Option<&str>, region: &str) -> CreateRequest {
    CreateRequest {
        long_url: "https://example.com/articles/42".to_string(),
        region: region.to_string(),
        owner_id: "owner-7".to_string(),
        alias: alias.map(str::to_string),
    }
}

fn ctx(region: &str) -> RequestContext {
    RequestContext::anonymous("198.51.100.20", region)
}

// =============================================================================
// 创建与解析往返
// =============================================================================

#[tokio::test]
async fn test_create_then_resolve_roundtrip() {
    let (registry, _temp) = create_registry(1).await;

    let receipt = registry
        .create_short_url(request(Some("roundtrip"), "asia"))
        .await
        .unwrap();
    assert_eq!(receipt.short_key, "roundtrip");

    let resolution = registry
        .resolve_short_url("roundtrip", &ctx("asia"))
        .await
        .unwrap();
    assert_eq!(resolution.long_url, "https://example.com/articles/42");
    assert_eq!(resolution.owner_id, "owner-7");
    assert_eq!(resolution.id, receipt.id);
}

#[tokio::test]
async fn test_generated_key_resolves() {
    let (registry, _temp) = create_registry(1).await;

    let receipt = registry
        .create_short_url(request(None, "asia"))
        .await
        .unwrap();
    assert_eq!(receipt.short_key.len(), 6);

    let resolution = registry
        .resolve_short_url(&receipt.short_key, &ctx("asia"))
        .await
        .unwrap();
    assert_eq!(resolution.id, receipt.id);
}

#[tokio::test]
async fn test_unknown_key_is_not_found_on_cold_cache() {
    let (registry, _temp) = create_registry(1).await;

    let err = registry
        .resolve_short_url("never-created", &ctx("asia"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "E002");

    // 查不到的键不会被缓存住：之后创建立即可解析
    registry
        .create_short_url(request(Some("never-created"), "asia"))
        .await
        .unwrap();
    assert!(
        registry
            .resolve_short_url("never-created", &ctx("asia"))
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn test_id_carries_region_of_birth() {
    let (registry, _temp) = create_registry(1).await;

    let receipt = registry
        .create_short_url(request(None, "eu-central"))
        .await
        .unwrap();
    assert_eq!(receipt.id.region_code(), 2);
}

// =============================================================================
// 分片路由拓扑
// =============================================================================

#[tokio::test]
async fn test_three_shard_topology_routes_by_region() {
    let (registry, _temp) = create_registry(3).await;

    // 启动拓扑的既定样例：asia(0) → 分片 0，us-east(1) → 1，eu-central(2) → 2
    let asia = registry
        .create_short_url(request(None, "asia"))
        .await
        .unwrap();
    assert_eq!(asia.shard_index, 0);

    let us = registry
        .create_short_url(request(None, "us-east"))
        .await
        .unwrap();
    assert_eq!(us.shard_index, 1);

    let eu = registry
        .create_short_url(request(None, "eu-central"))
        .await
        .unwrap();
    assert_eq!(eu.shard_index, 2);

    // 每条都能从各自的分片解析回来
    for receipt in [&asia, &us, &eu] {
        assert!(
            registry
                .resolve_short_url(&receipt.short_key, &ctx("asia"))
                .await
                .is_ok()
        );
    }
}

#[tokio::test]
async fn test_unknown_region_rejected() {
    let (registry, _temp) = create_registry(1).await;

    let err = registry
        .create_short_url(request(None, "atlantis"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "E007");
}

// =============================================================================
// 别名竞争
// =============================================================================

#[tokio::test]
async fn test_concurrent_same_alias_exactly_one_winner() {
    let (registry, _temp) = create_registry(1).await;
    let registry = Arc::new(registry);

    let mut handles = Vec::new();
    for i in 0..4 {
        let registry = Arc::clone(&registry);
        handles.push(tokio::spawn(async move {
            registry
                .create_short_url(CreateRequest {
                    long_url: format!("https://example.com/contender/{}", i),
                    region: "asia".to_string(),
                    owner_id: format!("owner-{}", i),
                    alias: Some("grand-prize".to_string()),
                })
                .await
        }));
    }

    let mut winners = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => winners += 1,
            Err(e) => assert_eq!(e.code(), "E001"),
        }
    }
    assert_eq!(winners, 1);

    // 解析结果与唯一赢家的记录一致
    let resolution = registry
        .resolve_short_url("grand-prize", &ctx("asia"))
        .await
        .unwrap();
    assert!(resolution.long_url.starts_with("https://example.com/contender/"));
}

// =============================================================================
// 准入控制
// =============================================================================

#[tokio::test]
async fn test_admission_budget_and_denial() {
    let temp = TempDir::new().unwrap();
    let mut config = test_config(&temp, 1);
    config.limiter.anonymous.limit = 3;
    config.limiter.anonymous.window_secs = 60;
    let registry = UrlRegistry::from_config(&config).await.unwrap();

    for _ in 0..3 {
        assert!(registry.admit("203.0.113.5", Tier::Anonymous).await.unwrap());
    }

    // 第 4 次被拒，retry_after 不超过窗口长度
    assert!(!registry.admit("203.0.113.5", Tier::Anonymous).await.unwrap());
    match registry.allow("203.0.113.5", Tier::Anonymous).await.unwrap() {
        Admission::Denied { retry_after_secs } => assert!(retry_after_secs <= 60),
        Admission::Granted { .. } => panic!("expected denial after budget exhausted"),
    }

    // 其他身份与其他层级不受影响
    assert!(registry.admit("203.0.113.6", Tier::Anonymous).await.unwrap());
    assert!(registry.admit("203.0.113.5", Tier::Authenticated).await.unwrap());
}

// =============================================================================
// 属主列表与点击落盘
// =============================================================================

#[tokio::test]
async fn test_list_by_owner_through_facade() {
    let (registry, _temp) = create_registry(1).await;

    for i in 0..3 {
        registry
            .create_short_url(CreateRequest {
                long_url: "https://example.com/mine".to_string(),
                region: "asia".to_string(),
                owner_id: "collector".to_string(),
                alias: Some(format!("item-{}", i)),
            })
            .await
            .unwrap();
    }
    registry
        .create_short_url(request(Some("not-mine"), "asia"))
        .await
        .unwrap();

    let entries = registry.list_by_owner("collector", 0, 10).await.unwrap();
    assert_eq!(entries.len(), 3);
    assert!(entries.iter().all(|e| e.owner_id == "collector"));
}

#[tokio::test]
async fn test_flushed_clicks_reach_the_shard() {
    let (registry, temp) = create_registry(1).await;

    registry
        .create_short_url(request(Some("clicky"), "asia"))
        .await
        .unwrap();
    for _ in 0..5 {
        registry
            .resolve_short_url("clicky", &ctx("asia"))
            .await
            .unwrap();
    }
    registry.flush_clicks().await;

    // 从同一个分片库单独开一条连接验证计数落了盘
    let shard_url = format!("sqlite://{}/shard0.db?mode=rwc", temp.path().display());
    let shard = SeaOrmShard::new(&shard_url, 0, &Default::default())
        .await
        .unwrap();
    let record = shard.get_by_key("clicky").await.unwrap().unwrap();
    assert_eq!(record.clicks, 5);
}

// =============================================================================
// 聚合查询入口
// =============================================================================

#[tokio::test]
async fn test_aggregates_empty_before_rollup() {
    let (registry, _temp) = create_registry(1).await;

    let receipt = registry
        .create_short_url(request(Some("stats"), "asia"))
        .await
        .unwrap();

    // 聚合器还没跑过，查询应返回空集而不是错误
    let rows = registry
        .aggregates_between(receipt.id, None, None)
        .await
        .unwrap();
    assert!(rows.is_empty());
}
