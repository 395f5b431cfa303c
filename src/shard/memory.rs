//! In-memory shard store, for tests and single-node setups.

use async_trait::async_trait;
use dashmap::DashMap;

use super::{ShardRecord, ShardStore};
use crate::errors::Result;

/// DashMap-backed shard. Re-inserting a key replaces the previous record,
/// which mirrors the latest-row-wins read rule of the SQL store.
#[derive(Default)]
pub struct MemoryShard {
    records: DashMap<String, ShardRecord>,
}

impl MemoryShard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl ShardStore for MemoryShard {
    async fn insert(&self, record: &ShardRecord) -> Result<()> {
        self.records
            .insert(record.short_key.clone(), record.clone());
        Ok(())
    }

    async fn get_by_key(&self, short_key: &str) -> Result<Option<ShardRecord>> {
        Ok(self.records.get(short_key).map(|r| r.clone()))
    }

    async fn apply_click_counts(&self, updates: Vec<(String, u64)>) -> Result<()> {
        for (key, count) in updates {
            if let Some(mut record) = self.records.get_mut(&key) {
                record.clicks += count;
            }
        }
        Ok(())
    }
}
