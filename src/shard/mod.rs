//! Shard stores and region-based routing.
//!
//! Long URLs live in a fixed set of shard databases. A record's home shard
//! is decided once at creation time from the caller's region and never
//! moves; the directory remembers the shard index so lookups go straight
//! to the right store. Shard tables index `short_key` without a uniqueness
//! constraint, the directory is the only authority on key ownership.

mod memory;
mod sea_orm;

pub use memory::MemoryShard;
pub use sea_orm::SeaOrmShard;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{LinkshardError, Result};
use crate::id::LinkId;
use crate::region::RegionCode;

/// A stored link, as one shard sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardRecord {
    pub id: LinkId,
    pub short_key: String,
    pub long_url: String,
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
    pub clicks: u64,
}

/// One shard's storage operations.
#[async_trait]
pub trait ShardStore: Send + Sync {
    /// 写入一条链接记录。短键冲突不在这里拦截，目录表才是唯一性权威。
    async fn insert(&self, record: &ShardRecord) -> Result<()>;

    /// 按短键读取。同键存在多行时返回最新的一条（旧行是孤儿数据）。
    async fn get_by_key(&self, short_key: &str) -> Result<Option<ShardRecord>>;

    /// 批量累加点击数。键不存在的更新被忽略。
    async fn apply_click_counts(&self, updates: Vec<(String, u64)>) -> Result<()>;
}

/// Routes writes and reads to their home shard.
///
/// The mapping is `region_code % shard_count`, which keeps a record's home
/// shard computable from its identifier alone as long as the topology never
/// changes size.
pub struct ShardRouter {
    stores: Vec<Arc<dyn ShardStore>>,
}

impl ShardRouter {
    pub fn new(stores: Vec<Arc<dyn ShardStore>>) -> Result<Self> {
        if stores.is_empty() {
            return Err(LinkshardError::validation(
                "Shard topology must contain at least one store",
            ));
        }
        Ok(Self { stores })
    }

    pub fn shard_count(&self) -> u32 {
        self.stores.len() as u32
    }

    /// Home shard for a region.
    pub fn route(&self, region: RegionCode) -> u32 {
        region.value() as u32 % self.shard_count()
    }

    /// Home shard for an existing record, derived from the region bits of
    /// its identifier. Agrees with [`Self::route`] by construction, since a
    /// record is minted with the same region its shard was picked from.
    pub fn route_id(&self, id: LinkId) -> u32 {
        id.region_code() as u32 % self.shard_count()
    }

    /// Store behind a shard index, as recorded in the directory.
    pub fn store(&self, index: u32) -> Result<&dyn ShardStore> {
        self.stores
            .get(index as usize)
            .map(|s| s.as_ref())
            .ok_or_else(|| {
                LinkshardError::validation(format!(
                    "Shard index {} out of range (topology has {} shards)",
                    index,
                    self.stores.len()
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router(shards: usize) -> ShardRouter {
        let stores: Vec<Arc<dyn ShardStore>> = (0..shards)
            .map(|_| Arc::new(MemoryShard::new()) as Arc<dyn ShardStore>)
            .collect();
        ShardRouter::new(stores).unwrap()
    }

    #[test]
    fn test_route_is_region_modulo_count() {
        let r = router(3);
        assert_eq!(r.route(RegionCode::new(0).unwrap()), 0);
        assert_eq!(r.route(RegionCode::new(1).unwrap()), 1);
        assert_eq!(r.route(RegionCode::new(2).unwrap()), 2);
        assert_eq!(r.route(RegionCode::new(3).unwrap()), 0);
    }

    #[test]
    fn test_route_single_shard_takes_everything() {
        let r = router(1);
        for code in 0..=RegionCode::MAX {
            assert_eq!(r.route(RegionCode::new(code).unwrap()), 0);
        }
    }

    #[test]
    fn test_route_id_agrees_with_route() {
        let r = router(3);
        for code in 0..=RegionCode::MAX {
            let region = RegionCode::new(code).unwrap();
            let id = LinkId::from_parts(42, region, 1, 1, 0);
            assert_eq!(r.route_id(id), r.route(region));
        }
    }

    #[test]
    fn test_store_rejects_out_of_range_index() {
        let r = router(2);
        assert!(r.store(1).is_ok());
        assert!(r.store(2).is_err());
    }

    #[test]
    fn test_empty_topology_rejected() {
        assert!(ShardRouter::new(Vec::new()).is_err());
    }
}
