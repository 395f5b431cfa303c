//! SeaORM 分片存储
//!
//! 每个实例持有一个分片库的连接池。点击数刷写使用参数化的 CASE WHEN
//! 批量更新，短键额外经过格式校验，双重防线阻断 SQL 注入。

use async_trait::async_trait;
use sea_orm::sea_query::{CaseStatement, Expr, Query};
use sea_orm::{
    ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, ExprTrait,
    QueryFilter, QueryOrder,
};
use tracing::debug;

use super::{ShardRecord, ShardStore};
use crate::config::DatabaseConfig;
use crate::errors::{LinkshardError, Result};
use crate::id::LinkId;
use crate::storage::{self, retry};
use crate::utils::is_valid_short_key;

use migration::entities::shard_record;

/// 单次写入尝试的上限。分片库可能在别的区域，慢响应当作一次
/// 失败尝试交给重试层，不让 create 无限等待
const WRITE_ATTEMPT_TIMEOUT_MS: u64 = 5_000;

pub struct SeaOrmShard {
    db: DatabaseConnection,
    retry_config: retry::RetryConfig,
    /// 拓扑内的分片序号，仅用于日志
    index: u32,
}

impl SeaOrmShard {
    /// 连接分片库并跑迁移
    pub async fn new(url: &str, index: u32, config: &DatabaseConfig) -> Result<Self> {
        let db = storage::connect(url, config).await?;
        Ok(Self {
            db,
            retry_config: retry::RetryConfig::from_config(config),
            index,
        })
    }

    fn record_from_model(model: shard_record::Model) -> ShardRecord {
        ShardRecord {
            id: LinkId::from_i64(model.id),
            short_key: model.short_key,
            long_url: model.long_url,
            owner_id: model.owner_id,
            created_at: model.created_at,
            clicks: Ord::max(model.clicks, 0) as u64,
        }
    }
}

#[async_trait]
impl ShardStore for SeaOrmShard {
    async fn insert(&self, record: &ShardRecord) -> Result<()> {
        let model = shard_record::ActiveModel {
            id: Set(record.id.as_i64()),
            short_key: Set(record.short_key.clone()),
            long_url: Set(record.long_url.clone()),
            owner_id: Set(record.owner_id.clone()),
            created_at: Set(record.created_at),
            clicks: Set(record.clicks as i64),
        };

        let db = &self.db;
        retry::with_retry_timeout(
            "shard_insert",
            self.retry_config,
            WRITE_ATTEMPT_TIMEOUT_MS,
            || async { shard_record::Entity::insert(model.clone()).exec(db).await },
        )
        .await
        .map_err(|e| {
            LinkshardError::database_operation(format!(
                "写入分片 {} 记录 '{}' 失败: {}",
                self.index, record.short_key, e
            ))
        })?;

        debug!(
            "Record '{}' written to shard {} (id: {})",
            record.short_key, self.index, record.id
        );
        Ok(())
    }

    async fn get_by_key(&self, short_key: &str) -> Result<Option<ShardRecord>> {
        let db = &self.db;
        let key_owned = short_key.to_string();

        let model = retry::with_retry(
            &format!("shard_get({})", short_key),
            self.retry_config,
            || async {
                // 同键可能残留孤儿行（目录预留被回收后键重建），取最新一条
                shard_record::Entity::find()
                    .filter(shard_record::Column::ShortKey.eq(&key_owned))
                    .order_by_desc(shard_record::Column::Id)
                    .one(db)
                    .await
            },
        )
        .await
        .map_err(|e| {
            LinkshardError::database_operation(format!(
                "查询分片 {} 记录 '{}' 失败: {}",
                self.index, short_key, e
            ))
        })?;

        Ok(model.map(Self::record_from_model))
    }

    async fn apply_click_counts(&self, updates: Vec<(String, u64)>) -> Result<()> {
        if updates.is_empty() {
            return Ok(());
        }

        // 安全校验：确保所有短键格式合法，防止 SQL 注入
        for (key, _) in &updates {
            if !is_valid_short_key(key) {
                return Err(LinkshardError::validation(format!(
                    "Invalid short_key format detected: '{}' - refusing to execute SQL",
                    key
                )));
            }
        }

        let total_count = updates.len();

        // 构建 CASE WHEN 表达式（跨平台兼容）
        let mut case_stmt = CaseStatement::new();
        let mut keys: Vec<String> = Vec::with_capacity(total_count);

        for (key, count) in &updates {
            case_stmt = case_stmt.case(
                Expr::col(shard_record::Column::ShortKey).eq(Expr::val(key.as_str())),
                Expr::col(shard_record::Column::Clicks).add(Expr::val(*count as i64)),
            );
            keys.push(key.clone());
        }
        // 不匹配的保持原值
        case_stmt = case_stmt.finally(Expr::col(shard_record::Column::Clicks));

        let stmt = Query::update()
            .table(shard_record::Entity)
            .value(shard_record::Column::Clicks, case_stmt)
            .and_where(Expr::col(shard_record::Column::ShortKey).is_in(keys))
            .to_owned();

        // 参数化查询执行（SeaORM 内部自动 build 为带绑定参数的 Statement）
        let db = &self.db;
        let stmt_ref = &stmt;
        retry::with_retry("apply_click_counts", self.retry_config, || async {
            db.execute(stmt_ref).await
        })
        .await
        .map_err(|e| {
            LinkshardError::database_operation(format!(
                "批量更新分片 {} 点击数失败（重试后仍失败）: {}",
                self.index, e
            ))
        })?;

        debug!(
            "Click counts flushed to shard {} ({} records)",
            self.index, total_count
        );
        Ok(())
    }
}
