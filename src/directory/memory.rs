//! In-memory directory backend for tests and single-node setups.
//!
//! DashMap's entry API gives the same claim atomicity the SQL backend gets
//! from its primary-key conflict.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::{Directory, DirectoryEntry, EntryState};
use crate::errors::{LinkshardError, Result};

#[derive(Default)]
pub struct MemoryDirectory {
    entries: DashMap<String, DirectoryEntry>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl Directory for MemoryDirectory {
    async fn reserve(&self, short_key: &str, shard_index: u32, owner_id: &str) -> Result<()> {
        match self.entries.entry(short_key.to_string()) {
            Entry::Occupied(_) => Err(LinkshardError::already_exists(format!(
                "short key '{}' is taken",
                short_key
            ))),
            Entry::Vacant(slot) => {
                slot.insert(DirectoryEntry {
                    short_key: short_key.to_string(),
                    shard_index,
                    owner_id: owner_id.to_string(),
                    state: EntryState::Reserved,
                    reserved_at: Utc::now(),
                    committed_at: None,
                });
                Ok(())
            }
        }
    }

    async fn commit(&self, short_key: &str) -> Result<()> {
        match self.entries.get_mut(short_key) {
            Some(mut entry) => {
                if entry.state == EntryState::Reserved {
                    entry.state = EntryState::Committed;
                    entry.committed_at = Some(Utc::now());
                }
                Ok(())
            }
            None => Err(LinkshardError::not_found(format!(
                "no reservation for short key '{}'",
                short_key
            ))),
        }
    }

    async fn abandon(&self, short_key: &str) -> Result<()> {
        self.entries
            .remove_if(short_key, |_, entry| entry.state == EntryState::Reserved);
        Ok(())
    }

    async fn lookup(&self, short_key: &str) -> Result<Option<DirectoryEntry>> {
        Ok(self
            .entries
            .get(short_key)
            .filter(|entry| entry.state == EntryState::Committed)
            .map(|entry| entry.clone()))
    }

    async fn list_by_owner(
        &self,
        owner_id: &str,
        page: u64,
        page_size: u64,
    ) -> Result<Vec<DirectoryEntry>> {
        let mut owned: Vec<DirectoryEntry> = self
            .entries
            .iter()
            .filter(|entry| entry.owner_id == owner_id && entry.state == EntryState::Committed)
            .map(|entry| entry.clone())
            .collect();
        owned.sort_by(|a, b| b.committed_at.cmp(&a.committed_at));

        let page_size = page_size.max(1) as usize;
        let start = page as usize * page_size;
        Ok(owned.into_iter().skip(start).take(page_size).collect())
    }

    async fn sweep_stale(&self, cutoff: DateTime<Utc>, batch: u64) -> Result<u64> {
        let stale: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.state == EntryState::Reserved && entry.reserved_at < cutoff)
            .take(batch as usize)
            .map(|entry| entry.short_key.clone())
            .collect();

        let mut deleted = 0;
        for key in stale {
            if self
                .entries
                .remove_if(&key, |_, entry| {
                    entry.state == EntryState::Reserved && entry.reserved_at < cutoff
                })
                .is_some()
            {
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reserve_commit_lookup() {
        let directory = MemoryDirectory::new();
        directory.reserve("abc123", 2, "owner-1").await.unwrap();

        // 预留阶段读者不可见
        assert!(directory.lookup("abc123").await.unwrap().is_none());

        directory.commit("abc123").await.unwrap();
        let entry = directory.lookup("abc123").await.unwrap().unwrap();
        assert_eq!(entry.shard_index, 2);
        assert_eq!(entry.owner_id, "owner-1");
        assert_eq!(entry.state, EntryState::Committed);
    }

    #[tokio::test]
    async fn test_second_reserve_loses() {
        let directory = MemoryDirectory::new();
        directory.reserve("dup", 0, "first").await.unwrap();
        let err = directory.reserve("dup", 1, "second").await.unwrap_err();
        assert!(matches!(err, LinkshardError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_abandon_frees_key_but_spares_committed() {
        let directory = MemoryDirectory::new();
        directory.reserve("gone", 0, "o").await.unwrap();
        directory.abandon("gone").await.unwrap();
        assert!(directory.reserve("gone", 0, "o").await.is_ok());

        directory.commit("gone").await.unwrap();
        directory.abandon("gone").await.unwrap();
        assert!(directory.lookup("gone").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_commit_unknown_key_not_found() {
        let directory = MemoryDirectory::new();
        let err = directory.commit("missing").await.unwrap_err();
        assert!(matches!(err, LinkshardError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_sweep_only_stale_reserved() {
        let directory = MemoryDirectory::new();
        directory.reserve("old", 0, "o").await.unwrap();
        directory.reserve("kept", 0, "o").await.unwrap();
        directory.commit("kept").await.unwrap();

        // cutoff 在未来，老的预留条目要被扫掉，已提交条目保留
        let cutoff = Utc::now() + chrono::Duration::seconds(1);
        let deleted = directory.sweep_stale(cutoff, 100).await.unwrap();
        assert_eq!(deleted, 1);
        assert!(directory.lookup("kept").await.unwrap().is_some());
        assert!(directory.reserve("old", 1, "o2").await.is_ok());
    }
}
