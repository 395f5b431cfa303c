use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 创建 directory_entries 表
        manager
            .create_table(
                Table::create()
                    .table(DirectoryEntry::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DirectoryEntry::ShortKey)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(DirectoryEntry::ShardIndex)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DirectoryEntry::OwnerId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DirectoryEntry::State)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DirectoryEntry::ReservedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DirectoryEntry::CommittedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        // 按 owner 列表查询索引
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_directory_owner")
                    .table(DirectoryEntry::Table)
                    .col(DirectoryEntry::OwnerId)
                    .to_owned(),
            )
            .await?;

        // 回收器扫描索引：state + reserved_at
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_directory_state_reserved")
                    .table(DirectoryEntry::Table)
                    .col(DirectoryEntry::State)
                    .col(DirectoryEntry::ReservedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 删除索引
        manager
            .drop_index(Index::drop().name("idx_directory_state_reserved").to_owned())
            .await?;

        manager
            .drop_index(Index::drop().name("idx_directory_owner").to_owned())
            .await?;

        // 删除表
        manager
            .drop_table(Table::drop().table(DirectoryEntry::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum DirectoryEntry {
    #[sea_orm(iden = "directory_entries")]
    Table,
    ShortKey,
    ShardIndex,
    OwnerId,
    State,
    ReservedAt,
    CommittedAt,
}
