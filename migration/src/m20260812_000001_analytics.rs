//! 点击分析表迁移
//!
//! - click_events: 原始点击事件（至少一次投递，processed 标记折叠水位）
//! - click_aggregates: 链接 × 天 聚合行（计数累加、标签并集合并）

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 1. 创建 click_events 表
        manager
            .create_table(
                Table::create()
                    .table(ClickEvent::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ClickEvent::Id)
                            .string_len(36)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ClickEvent::ShortUrlId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ClickEvent::ShortKey)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ClickEvent::RequesterHash)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ClickEvent::Region)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(ColumnDef::new(ClickEvent::Referrer).text().null())
                    .col(ColumnDef::new(ClickEvent::Device).string_len(32).null())
                    .col(
                        ColumnDef::new(ClickEvent::ClickedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ClickEvent::Processed)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .to_owned(),
            )
            .await?;

        // 聚合器扫描索引：processed + clicked_at
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_events_processed")
                    .table(ClickEvent::Table)
                    .col(ClickEvent::Processed)
                    .col(ClickEvent::ClickedAt)
                    .to_owned(),
            )
            .await?;

        // 2. 创建 click_aggregates 表
        manager
            .create_table(
                Table::create()
                    .table(ClickAggregate::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ClickAggregate::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ClickAggregate::ShortUrlId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ClickAggregate::DayBucket)
                            .date()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ClickAggregate::TotalClicks)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ClickAggregate::UniqueVisitors)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(ClickAggregate::CountryStats).text().null())
                    .col(ColumnDef::new(ClickAggregate::DeviceStats).text().null())
                    .col(ColumnDef::new(ClickAggregate::ReferrerStats).text().null())
                    .to_owned(),
            )
            .await?;

        // 唯一索引：short_url_id + day_bucket
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_aggregates_link_day")
                    .table(ClickAggregate::Table)
                    .col(ClickAggregate::ShortUrlId)
                    .col(ClickAggregate::DayBucket)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 删除 click_aggregates
        manager
            .drop_index(Index::drop().name("idx_aggregates_link_day").to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ClickAggregate::Table).to_owned())
            .await?;

        // 删除 click_events
        manager
            .drop_index(Index::drop().name("idx_events_processed").to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ClickEvent::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum ClickEvent {
    #[sea_orm(iden = "click_events")]
    Table,
    Id,
    ShortUrlId,
    ShortKey,
    RequesterHash,
    Region,
    Referrer,
    Device,
    ClickedAt,
    Processed,
}

#[derive(DeriveIden)]
enum ClickAggregate {
    #[sea_orm(iden = "click_aggregates")]
    Table,
    Id,
    ShortUrlId,
    DayBucket,
    TotalClicks,
    UniqueVisitors,
    CountryStats,
    DeviceStats,
    ReferrerStats,
}
