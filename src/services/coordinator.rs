//! Create path coordination.
//!
//! A create is two independent writes, directory then shard, with no
//! cross-store transaction. The saga runs reserve → shard write → commit:
//! a key only becomes visible to readers once the directory flips it to
//! committed, so a crash or failure at any earlier point leaves nothing
//! observable behind. Shard write failures release the reservation on the
//! spot; everything the compensation misses is reclaimed later by the
//! [`ReservationReconciler`](crate::directory::ReservationReconciler).

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::cache::CacheLayer;
use crate::directory::Directory;
use crate::errors::{LinkshardError, Result};
use crate::id::{LinkId, SnowflakeGenerator};
use crate::region::RegionTable;
use crate::shard::{ShardRecord, ShardRouter};
use crate::utils::url_validator::validate_long_url;
use crate::utils::{generate_random_code, is_valid_short_key};

/// 未指定别名时生成的随机短键长度
const RANDOM_KEY_LENGTH: usize = 6;

/// Request to register a long URL under a short key.
#[derive(Debug, Clone)]
pub struct CreateRequest {
    /// Target URL.
    pub long_url: String,
    /// Region name the request entered through; decides the home shard.
    pub region: String,
    /// Owner identity recorded in the directory and the shard row.
    pub owner_id: String,
    /// Caller-chosen short key. Generated when absent.
    pub alias: Option<String>,
}

/// Result of a successful create.
#[derive(Debug, Clone)]
pub struct CreateReceipt {
    pub id: LinkId,
    pub short_key: String,
    pub shard_index: u32,
}

/// Drives the create saga across the directory and the shard stores.
pub struct WriteCoordinator {
    directory: Arc<dyn Directory>,
    router: Arc<ShardRouter>,
    generator: Arc<SnowflakeGenerator>,
    regions: RegionTable,
    cache: Arc<dyn CacheLayer>,
}

impl WriteCoordinator {
    pub fn new(
        directory: Arc<dyn Directory>,
        router: Arc<ShardRouter>,
        generator: Arc<SnowflakeGenerator>,
        regions: RegionTable,
        cache: Arc<dyn CacheLayer>,
    ) -> Self {
        Self {
            directory,
            router,
            generator,
            regions,
            cache,
        }
    }

    /// Register `long_url` under a new short key.
    ///
    /// Fails with `AlreadyExists` when the alias is taken, `StoreUnavailable`
    /// when the home shard refuses the write, and `PartialWriteTimeout` when
    /// the shard row landed but the commit did not. The last case is an
    /// unknown outcome by design: the reconciler sweeps the stale
    /// reservation, and retrying with the same alias is safe because every
    /// retry re-checks the directory, never the shard.
    pub async fn create(&self, req: CreateRequest) -> Result<CreateReceipt> {
        validate_long_url(&req.long_url)
            .map_err(|e| LinkshardError::validation(e.to_string()))?;

        let short_key = match req.alias.filter(|a| !a.is_empty()) {
            Some(alias) => {
                if !is_valid_short_key(&alias) {
                    return Err(LinkshardError::validation(format!(
                        "Invalid short key '{}'. Only alphanumeric, hyphen and underscore allowed, 64 chars max.",
                        alias
                    )));
                }
                alias
            }
            None => generate_random_code(RANDOM_KEY_LENGTH),
        };

        let region = self
            .regions
            .resolve(&req.region)
            .ok_or_else(|| LinkshardError::validation(format!("Unknown region '{}'", req.region)))?;

        // route() 保证下标在拓扑范围内，store() 在这里不可能失败；
        // 放在 reserve 之前，避免预留无法落盘的半途状态
        let shard_index = self.router.route(region);
        let store = self.router.store(shard_index)?;

        // 目录是短键唯一性的唯一权威：并发同键 create 只有一个能预留成功
        self.directory
            .reserve(&short_key, shard_index, &req.owner_id)
            .await?;

        let id = self.generator.generate(region);
        let record = ShardRecord {
            id,
            short_key: short_key.clone(),
            long_url: req.long_url.trim().to_string(),
            owner_id: req.owner_id.clone(),
            created_at: Utc::now(),
            clicks: 0,
        };

        if let Err(e) = store.insert(&record).await {
            // 补偿：释放预留让键可以重用。放弃失败也无妨，回收器兜底
            if let Err(abandon_err) = self.directory.abandon(&short_key).await {
                warn!(
                    "Failed to abandon reservation for '{}' after shard write error: {}",
                    short_key, abandon_err
                );
            }
            error!(
                "Shard {} write failed for '{}': {}",
                shard_index, short_key, e
            );
            return Err(LinkshardError::store_unavailable(format!(
                "Shard {} rejected the write for '{}': {}",
                shard_index, short_key, e
            )));
        }

        if let Err(e) = self.directory.commit(&short_key).await {
            // 分片行已落库但键仍不可见。这里不回滚：回收器是部分写入的
            // 唯一清理权威，调用方按幂等语义重试即可
            error!("Commit failed for '{}' after shard write: {}", short_key, e);
            return Err(LinkshardError::partial_write_timeout(format!(
                "Key '{}' was written to shard {} but not committed: {}",
                short_key, shard_index, e
            )));
        }

        // Write-through so the first resolve does not pay the miss.
        self.cache.put(&short_key, record, None).await;

        info!("Created '{}' on shard {} (id {})", short_key, shard_index, id);

        Ok(CreateReceipt {
            id,
            short_key,
            shard_index,
        })
    }
}
