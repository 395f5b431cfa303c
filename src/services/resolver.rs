//! Resolve path: cache-aside read through directory and shard.
//!
//! Hits come straight from the cache. Misses fall back to the directory
//! for placement, then the home shard for the record, and populate the
//! cache on the way out. Unknown keys are never cached, so a key created
//! moments after a miss resolves immediately. Every successful resolve
//! emits a click event and buffers a click count; both are fire-and-forget
//! and never delay or fail the caller.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::analytics::{ClickCounter, EventProducer};
use crate::cache::CacheLayer;
use crate::directory::Directory;
use crate::errors::{LinkshardError, Result};
use crate::id::LinkId;
use crate::limiter::Tier;
use crate::shard::{ShardRecord, ShardRouter};

/// Caller context attached to a resolve: who is asking, from where, and
/// with what client. Everything but the tier feeds the analytics event;
/// the identity is hashed before it leaves the process.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Caller identity: user id for authenticated callers, client address
    /// for anonymous ones.
    pub identity: String,
    pub tier: Tier,
    /// Region name the request entered through.
    pub region: String,
    /// Referer header, when the client sent one.
    pub referrer: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestContext {
    /// Anonymous caller identified by client address.
    pub fn anonymous(address: &str, region: &str) -> Self {
        Self {
            identity: address.to_string(),
            tier: Tier::Anonymous,
            region: region.to_string(),
            referrer: None,
            user_agent: None,
        }
    }

    /// Authenticated caller identified by user id.
    pub fn authenticated(user_id: &str, region: &str) -> Self {
        Self {
            identity: user_id.to_string(),
            tier: Tier::Authenticated,
            region: region.to_string(),
            referrer: None,
            user_agent: None,
        }
    }
}

/// Outcome of a successful resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub id: LinkId,
    pub long_url: String,
    pub owner_id: String,
}

/// Read path over cache, directory and shards.
pub struct Resolver {
    directory: Arc<dyn Directory>,
    router: Arc<ShardRouter>,
    cache: Arc<dyn CacheLayer>,
    producer: EventProducer,
    clicks: Arc<ClickCounter>,
}

impl Resolver {
    pub fn new(
        directory: Arc<dyn Directory>,
        router: Arc<ShardRouter>,
        cache: Arc<dyn CacheLayer>,
        producer: EventProducer,
        clicks: Arc<ClickCounter>,
    ) -> Self {
        Self {
            directory,
            router,
            cache,
            producer,
            clicks,
        }
    }

    /// Resolve `short_key` to its target URL.
    ///
    /// `NotFound` covers unknown keys and keys whose reservation was never
    /// committed; neither outcome touches the cache.
    pub async fn resolve(&self, short_key: &str, ctx: &RequestContext) -> Result<Resolution> {
        if let Some(record) = self.cache.get(short_key).await {
            debug!("Cache hit for '{}'", short_key);
            // 缓存命中拿不到目录里的分片下标，从标识的区域位推回来
            self.record_hit(&record, self.router.route_id(record.id), ctx);
            return Ok(Self::resolution(record));
        }

        let entry = self.directory.lookup(short_key).await?.ok_or_else(|| {
            LinkshardError::not_found(format!("Short key '{}' not found", short_key))
        })?;

        let store = self.router.store(entry.shard_index)?;
        let record = match store.get_by_key(short_key).await? {
            Some(record) => record,
            None => {
                // 目录说有、分片说无。正常流程到不了这里（提交前分片行
                // 必已写入），多半是有人直接动了分片库
                warn!(
                    "Directory maps '{}' to shard {} but the shard has no row",
                    short_key, entry.shard_index
                );
                return Err(LinkshardError::not_found(format!(
                    "Short key '{}' not found",
                    short_key
                )));
            }
        };

        self.cache.put(short_key, record.clone(), None).await;
        self.record_hit(&record, entry.shard_index, ctx);

        Ok(Self::resolution(record))
    }

    fn resolution(record: ShardRecord) -> Resolution {
        Resolution {
            id: record.id,
            long_url: record.long_url,
            owner_id: record.owner_id,
        }
    }

    /// Fire-and-forget side effects of a successful resolve: one analytics
    /// event into the topic, one click into the flush buffer.
    fn record_hit(&self, record: &ShardRecord, shard_index: u32, ctx: &RequestContext) {
        self.producer.emit(
            record.id,
            &record.short_key,
            &ctx.identity,
            &ctx.region,
            ctx.referrer.as_deref(),
            ctx.user_agent.as_deref(),
        );
        self.clicks.increment(shard_index, &record.short_key);
    }
}
