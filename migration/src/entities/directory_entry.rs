//! Global directory entity: maps a short key to its owning shard.
//!
//! The directory is the single authority on short-key uniqueness; shard
//! tables deliberately carry no unique index on the key.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "directory_entries")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub short_key: String,
    pub shard_index: i32,
    pub owner_id: String,
    /// Lifecycle state: "reserved" until the shard write lands, then "committed".
    pub state: String,
    pub reserved_at: DateTimeUtc,
    pub committed_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
