//! Per-link per-day aggregate entity.
//!
//! Counters are merged additively and the stat maps key-wise, never
//! overwritten, so partial re-aggregation cannot lose earlier folds.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "click_aggregates")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub short_url_id: i64,
    pub day_bucket: Date,
    pub total_clicks: i64,
    pub unique_visitors: i64,
    #[sea_orm(column_type = "Text", nullable)]
    pub country_stats: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub device_stats: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub referrer_stats: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
