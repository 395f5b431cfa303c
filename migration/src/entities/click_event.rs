//! Raw click event entity, append-only.
//!
//! Rows arrive at-least-once from the consumer; `processed` marks rows the
//! aggregator has already folded so re-deliveries never double-count.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "click_events")]
pub struct Model {
    /// UUID, generated by the consumer at insert time.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub short_url_id: i64,
    pub short_key: String,
    pub requester_hash: String,
    pub region: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub referrer: Option<String>,
    pub device: Option<String>,
    pub clicked_at: DateTimeUtc,
    pub processed: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
