//! SeaORM directory backend.
//!
//! 预留依赖主键冲突保证原子性：同一短键的并发 reserve 只有一个
//! INSERT 能落库，其余拿到 Conflicted。提交、放弃都带状态过滤，
//! 不会误伤已提交条目。

use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, TryInsertResult,
};
use tracing::info;

use async_trait::async_trait;
use migration::entities::{DirectoryEntryEntity, directory_entry};

use super::{Directory, DirectoryEntry, EntryState};
use crate::config::DatabaseConfig;
use crate::errors::{LinkshardError, Result};
use crate::storage;
use crate::storage::retry::{RetryConfig, with_retry};

pub struct SeaOrmDirectory {
    db: DatabaseConnection,
    retry_config: RetryConfig,
}

impl SeaOrmDirectory {
    /// 连接目录库并跑迁移
    pub async fn connect(database_url: &str, config: &DatabaseConfig) -> Result<Self> {
        let db = storage::connect(database_url, config).await?;
        info!("Directory store initialized at {}", database_url);
        Ok(Self {
            db,
            retry_config: RetryConfig::from_config(config),
        })
    }

    /// 复用外部连接（测试或嵌入场景）
    pub fn with_connection(db: DatabaseConnection, retry_config: RetryConfig) -> Self {
        Self { db, retry_config }
    }

    pub fn get_db(&self) -> &DatabaseConnection {
        &self.db
    }

    fn model_to_entry(model: directory_entry::Model) -> Result<DirectoryEntry> {
        let state = model.state.parse::<EntryState>().map_err(|_| {
            LinkshardError::database_operation(format!("目录条目状态非法: {}", model.state))
        })?;
        Ok(DirectoryEntry {
            short_key: model.short_key,
            shard_index: model.shard_index as u32,
            owner_id: model.owner_id,
            state,
            reserved_at: model.reserved_at,
            committed_at: model.committed_at,
        })
    }
}

#[async_trait]
impl Directory for SeaOrmDirectory {
    async fn reserve(&self, short_key: &str, shard_index: u32, owner_id: &str) -> Result<()> {
        let result = with_retry("directory.reserve", self.retry_config, || {
            let model = directory_entry::ActiveModel {
                short_key: Set(short_key.to_string()),
                shard_index: Set(shard_index as i32),
                owner_id: Set(owner_id.to_string()),
                state: Set(EntryState::Reserved.to_string()),
                reserved_at: Set(Utc::now()),
                committed_at: Set(None),
            };
            async {
                DirectoryEntryEntity::insert(model)
                    .on_conflict(
                        OnConflict::column(directory_entry::Column::ShortKey)
                            .do_nothing()
                            .to_owned(),
                    )
                    .do_nothing()
                    .exec(&self.db)
                    .await
            }
        })
        .await?;

        match result {
            TryInsertResult::Conflicted => Err(LinkshardError::already_exists(format!(
                "short key '{}' is taken",
                short_key
            ))),
            _ => Ok(()),
        }
    }

    async fn commit(&self, short_key: &str) -> Result<()> {
        let rows = with_retry("directory.commit", self.retry_config, || async {
            DirectoryEntryEntity::update_many()
                .col_expr(
                    directory_entry::Column::State,
                    Expr::value(EntryState::Committed.to_string()),
                )
                .col_expr(directory_entry::Column::CommittedAt, Expr::value(Utc::now()))
                .filter(directory_entry::Column::ShortKey.eq(short_key))
                .filter(directory_entry::Column::State.eq(EntryState::Reserved.to_string()))
                .exec(&self.db)
                .await
        })
        .await?
        .rows_affected;

        if rows > 0 {
            return Ok(());
        }

        // 没有可翻转的预留：要么条目已不存在（回收器扫掉了），要么已提交
        let existing = DirectoryEntryEntity::find_by_id(short_key.to_string())
            .one(&self.db)
            .await?;
        match existing {
            Some(_) => Ok(()),
            None => Err(LinkshardError::not_found(format!(
                "no reservation for short key '{}'",
                short_key
            ))),
        }
    }

    async fn abandon(&self, short_key: &str) -> Result<()> {
        with_retry("directory.abandon", self.retry_config, || async {
            DirectoryEntryEntity::delete_many()
                .filter(directory_entry::Column::ShortKey.eq(short_key))
                .filter(directory_entry::Column::State.eq(EntryState::Reserved.to_string()))
                .exec(&self.db)
                .await
        })
        .await?;
        Ok(())
    }

    async fn lookup(&self, short_key: &str) -> Result<Option<DirectoryEntry>> {
        let model = with_retry("directory.lookup", self.retry_config, || async {
            DirectoryEntryEntity::find_by_id(short_key.to_string())
                .one(&self.db)
                .await
        })
        .await?;

        match model {
            Some(model) => {
                let entry = Self::model_to_entry(model)?;
                Ok((entry.state == EntryState::Committed).then_some(entry))
            }
            None => Ok(None),
        }
    }

    async fn list_by_owner(
        &self,
        owner_id: &str,
        page: u64,
        page_size: u64,
    ) -> Result<Vec<DirectoryEntry>> {
        let models = with_retry("directory.list_by_owner", self.retry_config, || async {
            DirectoryEntryEntity::find()
                .filter(directory_entry::Column::OwnerId.eq(owner_id))
                .filter(directory_entry::Column::State.eq(EntryState::Committed.to_string()))
                .order_by_desc(directory_entry::Column::CommittedAt)
                .paginate(&self.db, page_size.max(1))
                .fetch_page(page)
                .await
        })
        .await?;

        models.into_iter().map(Self::model_to_entry).collect()
    }

    async fn sweep_stale(&self, cutoff: DateTime<Utc>, batch: u64) -> Result<u64> {
        // 先选后删，批量限制删除范围；删除再次过滤状态，
        // 扫描与删除之间完成提交的条目不会被扫掉
        let stale_keys: Vec<String> = with_retry("directory.sweep_scan", self.retry_config, || {
            async {
                DirectoryEntryEntity::find()
                    .select_only()
                    .column(directory_entry::Column::ShortKey)
                    .filter(directory_entry::Column::State.eq(EntryState::Reserved.to_string()))
                    .filter(directory_entry::Column::ReservedAt.lt(cutoff))
                    .order_by_asc(directory_entry::Column::ReservedAt)
                    .limit(batch)
                    .into_tuple()
                    .all(&self.db)
                    .await
            }
        })
        .await?;

        if stale_keys.is_empty() {
            return Ok(0);
        }

        let deleted = with_retry("directory.sweep_delete", self.retry_config, || {
            let keys = stale_keys.clone();
            async {
                DirectoryEntryEntity::delete_many()
                    .filter(directory_entry::Column::ShortKey.is_in(keys))
                    .filter(directory_entry::Column::State.eq(EntryState::Reserved.to_string()))
                    .filter(directory_entry::Column::ReservedAt.lt(cutoff))
                    .exec(&self.db)
                    .await
            }
        })
        .await?
        .rows_affected;

        Ok(deleted)
    }
}
