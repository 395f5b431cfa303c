//! Global directory: the single authority on short-key placement.
//!
//! Writers claim a key with [`Directory::reserve`], write the shard record,
//! then [`Directory::commit`]. Readers only ever observe committed entries,
//! so a half-finished create is invisible everywhere. Reservations whose
//! writer died are swept by the [`ReservationReconciler`].

mod memory;
mod reconciler;
mod sea_orm;

pub use memory::MemoryDirectory;
pub use reconciler::ReservationReconciler;
pub use sea_orm::SeaOrmDirectory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use strum::{Display, EnumString};

use crate::errors::Result;

/// Lifecycle state of a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum EntryState {
    Reserved,
    Committed,
}

/// One directory row: where a short key lives and who owns it.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectoryEntry {
    pub short_key: String,
    pub shard_index: u32,
    pub owner_id: String,
    pub state: EntryState,
    pub reserved_at: DateTime<Utc>,
    pub committed_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait Directory: Send + Sync {
    /// Atomically claims `short_key` for `owner_id` on the given shard.
    ///
    /// Fails with `AlreadyExists` when any entry, reserved or committed,
    /// already holds the key. Exactly one of N concurrent callers wins.
    async fn reserve(&self, short_key: &str, shard_index: u32, owner_id: &str) -> Result<()>;

    /// Flips a reservation to committed, making the key visible to readers.
    ///
    /// Committing an already-committed key is a no-op; committing a key with
    /// no entry fails with `NotFound` (the reconciler may have swept it).
    async fn commit(&self, short_key: &str) -> Result<()>;

    /// Drops a reservation after a failed shard write.
    ///
    /// Committed entries are never touched; abandoning an unknown key is a
    /// no-op, so compensation can be retried blindly.
    async fn abandon(&self, short_key: &str) -> Result<()>;

    /// Resolves a committed key to its placement. Reserved entries behave
    /// as absent.
    async fn lookup(&self, short_key: &str) -> Result<Option<DirectoryEntry>>;

    /// Committed entries for `owner_id`, newest first. `page` is zero-based.
    async fn list_by_owner(
        &self,
        owner_id: &str,
        page: u64,
        page_size: u64,
    ) -> Result<Vec<DirectoryEntry>>;

    /// Deletes up to `batch` reserved entries older than `cutoff`, returning
    /// how many went. Entries committed between scan and delete survive.
    async fn sweep_stale(&self, cutoff: DateTime<Utc>, batch: u64) -> Result<u64>;
}
