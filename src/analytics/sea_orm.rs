//! SeaORM 分析存储
//!
//! 原始事件表只追加；聚合表的合并需要读改写 JSON 列，无法用单条
//! upsert 表达，所以按 (链接, 日) 逐桶处理，整批连同 processed
//! 标记放在一个事务里。事务失败不在这里重试，聚合器下个周期重来。

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, TransactionTrait, sea_query::Expr,
};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{AggregateDelta, AggregateRow, AnalyticsStore, ClickEvent, PendingEvent};
use crate::config::DatabaseConfig;
use crate::errors::{LinkshardError, Result};
use crate::storage::{self, retry};

use migration::entities::{click_aggregate, click_event};

pub struct SeaOrmAnalytics {
    db: DatabaseConnection,
    retry_config: retry::RetryConfig,
}

impl SeaOrmAnalytics {
    /// 连接分析库并跑迁移
    pub async fn new(url: &str, config: &DatabaseConfig) -> Result<Self> {
        let db = storage::connect(url, config).await?;
        Ok(Self {
            db,
            retry_config: retry::RetryConfig::from_config(config),
        })
    }

    /// 解析 JSON 统计列。坏数据按空表处理，不能卡死聚合
    fn parse_stats(stored: Option<&str>) -> HashMap<String, u64> {
        match stored {
            Some(raw) => serde_json::from_str(raw).unwrap_or_else(|e| {
                warn!("Discarding unreadable stats column: {}", e);
                HashMap::new()
            }),
            None => HashMap::new(),
        }
    }

    /// 已存 JSON 与增量按键相加后重新序列化
    fn merged_stats_json(
        stored: Option<&str>,
        delta: &HashMap<String, u64>,
    ) -> Result<Option<String>> {
        let mut map = Self::parse_stats(stored);
        for (key, count) in delta {
            *map.entry(key.clone()).or_insert(0) += count;
        }
        if map.is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::to_string(&map)?))
    }

    fn stats_json(delta: &HashMap<String, u64>) -> Result<Option<String>> {
        Self::merged_stats_json(None, delta)
    }

    fn row_from_model(model: click_aggregate::Model) -> AggregateRow {
        AggregateRow {
            short_url_id: model.short_url_id,
            day: model.day_bucket,
            total_clicks: model.total_clicks.max(0) as u64,
            unique_visitors: model.unique_visitors.max(0) as u64,
            country_stats: Self::parse_stats(model.country_stats.as_deref()),
            device_stats: Self::parse_stats(model.device_stats.as_deref()),
            referrer_stats: Self::parse_stats(model.referrer_stats.as_deref()),
        }
    }
}

#[async_trait]
impl AnalyticsStore for SeaOrmAnalytics {
    async fn insert_event(&self, event: &ClickEvent) -> Result<()> {
        let model = click_event::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            short_url_id: Set(event.short_url_id),
            short_key: Set(event.short_key.clone()),
            requester_hash: Set(event.requester_hash.clone()),
            region: Set(event.region.clone()),
            referrer: Set(event.referrer.clone()),
            device: Set(event.device.clone()),
            clicked_at: Set(event.timestamp),
            processed: Set(false),
        };

        let db = &self.db;
        retry::with_retry("insert_click_event", self.retry_config, || async {
            click_event::Entity::insert(model.clone()).exec(db).await
        })
        .await
        .map_err(|e| {
            LinkshardError::database_operation(format!(
                "写入点击事件 '{}' 失败: {}",
                event.short_key, e
            ))
        })?;

        Ok(())
    }

    async fn fetch_unprocessed(&self, limit: u64) -> Result<Vec<PendingEvent>> {
        let db = &self.db;
        let models = retry::with_retry("fetch_unprocessed", self.retry_config, || async {
            click_event::Entity::find()
                .filter(click_event::Column::Processed.eq(false))
                .order_by_asc(click_event::Column::ClickedAt)
                .limit(limit)
                .all(db)
                .await
        })
        .await
        .map_err(|e| {
            LinkshardError::database_operation(format!("读取未处理事件失败: {}", e))
        })?;

        Ok(models
            .into_iter()
            .map(|model| PendingEvent {
                row_id: model.id,
                event: ClickEvent {
                    short_url_id: model.short_url_id,
                    short_key: model.short_key,
                    requester_hash: model.requester_hash,
                    region: model.region,
                    referrer: model.referrer,
                    device: model.device,
                    timestamp: model.clicked_at,
                },
            })
            .collect())
    }

    async fn fold_batch(&self, deltas: &[AggregateDelta], row_ids: &[String]) -> Result<()> {
        if deltas.is_empty() && row_ids.is_empty() {
            return Ok(());
        }

        let txn = self.db.begin().await?;

        for delta in deltas {
            let existing = click_aggregate::Entity::find()
                .filter(click_aggregate::Column::ShortUrlId.eq(delta.short_url_id))
                .filter(click_aggregate::Column::DayBucket.eq(delta.day))
                .one(&txn)
                .await?;

            match existing {
                Some(model) => {
                    let total_clicks = model.total_clicks + delta.total_clicks as i64;
                    let unique_visitors = model.unique_visitors + delta.unique_visitors as i64;
                    let country_stats = Self::merged_stats_json(
                        model.country_stats.as_deref(),
                        &delta.country_stats,
                    )?;
                    let device_stats =
                        Self::merged_stats_json(model.device_stats.as_deref(), &delta.device_stats)?;
                    let referrer_stats = Self::merged_stats_json(
                        model.referrer_stats.as_deref(),
                        &delta.referrer_stats,
                    )?;

                    let mut active: click_aggregate::ActiveModel = model.into();
                    active.total_clicks = Set(total_clicks);
                    active.unique_visitors = Set(unique_visitors);
                    active.country_stats = Set(country_stats);
                    active.device_stats = Set(device_stats);
                    active.referrer_stats = Set(referrer_stats);
                    active.update(&txn).await?;
                }
                None => {
                    let active = click_aggregate::ActiveModel {
                        short_url_id: Set(delta.short_url_id),
                        day_bucket: Set(delta.day),
                        total_clicks: Set(delta.total_clicks as i64),
                        unique_visitors: Set(delta.unique_visitors as i64),
                        country_stats: Set(Self::stats_json(&delta.country_stats)?),
                        device_stats: Set(Self::stats_json(&delta.device_stats)?),
                        referrer_stats: Set(Self::stats_json(&delta.referrer_stats)?),
                        ..Default::default()
                    };
                    active.insert(&txn).await?;
                }
            }
        }

        // 聚合和标记同事务落地，重放不重算
        if !row_ids.is_empty() {
            click_event::Entity::update_many()
                .col_expr(click_event::Column::Processed, Expr::value(true))
                .filter(click_event::Column::Id.is_in(row_ids.to_vec()))
                .exec(&txn)
                .await?;
        }

        txn.commit().await?;

        debug!(
            "Folded {} aggregate buckets, marked {} events processed",
            deltas.len(),
            row_ids.len()
        );
        Ok(())
    }

    async fn aggregates_between(
        &self,
        short_url_id: i64,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<AggregateRow>> {
        let db = &self.db;
        let models = retry::with_retry("aggregates_between", self.retry_config, || async {
            let mut query = click_aggregate::Entity::find()
                .filter(click_aggregate::Column::ShortUrlId.eq(short_url_id));
            if let Some(from) = from {
                query = query.filter(click_aggregate::Column::DayBucket.gte(from));
            }
            if let Some(to) = to {
                query = query.filter(click_aggregate::Column::DayBucket.lte(to));
            }
            query
                .order_by_asc(click_aggregate::Column::DayBucket)
                .all(db)
                .await
        })
        .await
        .map_err(|e| {
            LinkshardError::database_operation(format!(
                "查询链接 {} 的聚合数据失败: {}",
                short_url_id, e
            ))
        })?;

        Ok(models.into_iter().map(Self::row_from_model).collect())
    }
}
