use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 创建 shard_records 表
        manager
            .create_table(
                Table::create()
                    .table(ShardRecord::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ShardRecord::Id)
                            .big_integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ShardRecord::ShortKey)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ShardRecord::LongUrl)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ShardRecord::OwnerId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ShardRecord::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ShardRecord::Clicks)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .to_owned(),
            )
            .await?;

        // 按短键查询索引。非唯一：全局唯一性由目录表保证
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_shard_short_key")
                    .table(ShardRecord::Table)
                    .col(ShardRecord::ShortKey)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_shard_short_key").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(ShardRecord::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ShardRecord {
    #[sea_orm(iden = "shard_records")]
    Table,
    Id,
    ShortKey,
    LongUrl,
    OwnerId,
    CreatedAt,
    Clicks,
}
