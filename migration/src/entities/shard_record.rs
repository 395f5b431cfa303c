//! Shard-local link record entity.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "shard_records")]
pub struct Model {
    /// Snowflake identifier, allocated by the caller.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i64,
    pub short_key: String,
    #[sea_orm(column_type = "Text")]
    pub long_url: String,
    pub owner_id: String,
    pub created_at: DateTimeUtc,
    /// Informational counter, batched in; authoritative numbers live in analytics.
    pub clicks: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
