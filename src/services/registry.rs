//! The registry facade: the one type embedders talk to.
//!
//! [`UrlRegistry::from_config`] assembles every backend from configuration
//! the same way the storage and cache factories do (type strings decide the
//! implementation), wires the create and resolve paths together, and
//! detaches the maintenance loops: event consumer, reservation reconciler,
//! aggregator and click flusher. Endpoint routing, authentication and
//! response shaping stay outside; callers hand in a [`RequestContext`] and
//! get typed results back.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::info;

use crate::analytics::{
    AggregateRow, Aggregator, AnalyticsStore, ClickCounter, EventConsumer, EventProducer,
    EventTopic, SeaOrmAnalytics,
};
use crate::cache::build_cache;
use crate::config::StaticConfig;
use crate::directory::{Directory, DirectoryEntry, ReservationReconciler, SeaOrmDirectory};
use crate::errors::{LinkshardError, Result};
use crate::id::{LinkId, SnowflakeGenerator};
use crate::limiter::{Admission, RateLimiter, Tier, build_limiter};
use crate::region::RegionTable;
use crate::services::coordinator::{CreateReceipt, CreateRequest, WriteCoordinator};
use crate::services::resolver::{RequestContext, Resolution, Resolver};
use crate::shard::{SeaOrmShard, ShardRouter, ShardStore};

/// 单页返回条目数上限
const MAX_PAGE_SIZE: u64 = 100;

/// Facade over the whole registry core.
pub struct UrlRegistry {
    coordinator: WriteCoordinator,
    resolver: Resolver,
    limiter: Arc<dyn RateLimiter>,
    directory: Arc<dyn Directory>,
    analytics: Arc<dyn AnalyticsStore>,
    clicks: Arc<ClickCounter>,
    home_region: String,
}

impl UrlRegistry {
    /// Build the registry from configuration and start its background
    /// loops. Must run inside a Tokio runtime; the loops live until the
    /// process exits, except the event consumer which stops on its own
    /// once the registry (and with it the topic sender) is dropped.
    pub async fn from_config(config: &StaticConfig) -> Result<Self> {
        let regions = RegionTable::new(&config.regions).map_err(LinkshardError::validation)?;

        // 本部署区域必须在表里，配错了要在启动时爆出来
        if regions.resolve(&config.generator.region).is_none() {
            return Err(LinkshardError::validation(format!(
                "Configured generator region '{}' is not in the region table",
                config.generator.region
            )));
        }

        let generator = Arc::new(SnowflakeGenerator::from_config(&config.generator));

        let directory: Arc<dyn Directory> = Arc::new(
            SeaOrmDirectory::connect(&config.directory.database_url, &config.database).await?,
        );

        let mut stores: Vec<Arc<dyn ShardStore>> = Vec::with_capacity(config.shards.urls.len());
        for (index, url) in config.shards.urls.iter().enumerate() {
            stores.push(Arc::new(
                SeaOrmShard::new(url, index as u32, &config.database).await?,
            ));
        }
        let router = Arc::new(ShardRouter::new(stores)?);

        let cache = build_cache(&config.cache)?;
        let limiter = build_limiter(&config.limiter)?;

        let analytics: Arc<dyn AnalyticsStore> = Arc::new(
            SeaOrmAnalytics::new(&config.analytics.database_url, &config.database).await?,
        );

        let (topic, receiver) = EventTopic::bounded(config.analytics.topic_capacity);
        let clicks = Arc::new(ClickCounter::new(Arc::clone(&router), &config.analytics));

        tokio::spawn(EventConsumer::new(Arc::clone(&analytics)).run(receiver));
        Arc::new(ReservationReconciler::new(
            Arc::clone(&directory),
            &config.directory,
        ))
        .spawn_background_task();
        Arc::new(Aggregator::new(Arc::clone(&analytics), &config.analytics))
            .spawn_background_task();
        {
            let clicks = Arc::clone(&clicks);
            tokio::spawn(async move { clicks.start_background_task().await });
        }

        let coordinator = WriteCoordinator::new(
            Arc::clone(&directory),
            Arc::clone(&router),
            generator,
            regions,
            Arc::clone(&cache),
        );
        let resolver = Resolver::new(
            Arc::clone(&directory),
            router,
            cache,
            EventProducer::new(topic),
            Arc::clone(&clicks),
        );

        info!(
            "URL registry initialized: {} shards, home region '{}'",
            config.shards.urls.len(),
            config.generator.region
        );

        Ok(Self {
            coordinator,
            resolver,
            limiter,
            directory,
            analytics,
            clicks,
            home_region: config.generator.region.clone(),
        })
    }

    /// Region name this deployment runs in, for stamping request contexts.
    pub fn home_region(&self) -> &str {
        &self.home_region
    }

    /// Register a long URL. See [`WriteCoordinator::create`] for the
    /// failure contract.
    pub async fn create_short_url(&self, req: CreateRequest) -> Result<CreateReceipt> {
        self.coordinator.create(req).await
    }

    /// Resolve a short key, recording the click.
    pub async fn resolve_short_url(
        &self,
        short_key: &str,
        ctx: &RequestContext,
    ) -> Result<Resolution> {
        self.resolver.resolve(short_key, ctx).await
    }

    /// Full admission verdict for one request from `identity`.
    pub async fn allow(&self, identity: &str, tier: Tier) -> Result<Admission> {
        self.limiter.allow(identity, tier).await
    }

    /// Admission as a plain yes/no.
    pub async fn admit(&self, identity: &str, tier: Tier) -> Result<bool> {
        Ok(self.allow(identity, tier).await?.is_granted())
    }

    /// Committed keys owned by `owner_id`, newest first. `page` is
    /// zero-based; `page_size` is clamped to 1..=100.
    pub async fn list_by_owner(
        &self,
        owner_id: &str,
        page: u64,
        page_size: u64,
    ) -> Result<Vec<DirectoryEntry>> {
        let page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        self.directory.list_by_owner(owner_id, page, page_size).await
    }

    /// Daily aggregates for a link, both bounds inclusive, `None` meaning
    /// unbounded. Numbers trail reality by up to one aggregation period.
    pub async fn aggregates_between(
        &self,
        id: LinkId,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<AggregateRow>> {
        self.analytics.aggregates_between(id.as_i64(), from, to).await
    }

    /// Push buffered click counts to the shards now. Meant for graceful
    /// shutdown; in normal operation the background flusher handles it.
    pub async fn flush_clicks(&self) {
        self.clicks.flush().await;
    }
}
