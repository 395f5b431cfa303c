use async_trait::async_trait;

use super::CacheLayer;
use crate::shard::ShardRecord;

/// Disables caching; every read falls through to storage.
pub struct NullCache;

#[async_trait]
impl CacheLayer for NullCache {
    async fn get(&self, _key: &str) -> Option<ShardRecord> {
        None
    }

    async fn put(&self, _key: &str, _record: ShardRecord, _ttl_secs: Option<u64>) {}
}
