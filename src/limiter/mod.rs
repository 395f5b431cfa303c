//! Tiered admission control.
//!
//! Every caller burns tokens from a fixed window: authenticated callers get
//! a large hourly budget, anonymous callers a small daily one. Counters die
//! with their window; nothing ever resets them by hand.
//!
//! The admission check is a single atomic step per request (create the
//! counter, or decrement-and-read it), so two racing requests can never
//! both squeeze through the last token.

mod memory;
mod redis;

pub use memory::MemoryLimiter;
pub use redis::RedisLimiter;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::config::{LimiterConfig, TierPolicyConfig};
use crate::errors::{LinkshardError, Result};

/// Caller classification for admission purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Authenticated,
    Anonymous,
}

impl Tier {
    /// Key namespace fragment, `u` for users and `i` for anonymous callers.
    fn key_fragment(&self) -> &'static str {
        match self {
            Tier::Authenticated => "u",
            Tier::Anonymous => "i",
        }
    }
}

/// Admission verdict for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Request admitted; `remaining` tokens left in the window.
    Granted { remaining: u64 },
    /// Budget exhausted; try again once the window expires.
    Denied { retry_after_secs: u64 },
}

impl Admission {
    pub fn is_granted(&self) -> bool {
        matches!(self, Admission::Granted { .. })
    }
}

/// One tier's budget: `limit` requests per `window_secs`.
#[derive(Debug, Clone, Copy)]
pub struct TierPolicy {
    pub limit: u64,
    pub window_secs: u64,
}

impl From<TierPolicyConfig> for TierPolicy {
    fn from(config: TierPolicyConfig) -> Self {
        Self {
            limit: config.limit,
            window_secs: config.window_secs,
        }
    }
}

/// Both tier budgets, resolved from config once at construction.
#[derive(Debug, Clone, Copy)]
pub struct TierPolicies {
    pub authenticated: TierPolicy,
    pub anonymous: TierPolicy,
}

impl TierPolicies {
    pub fn from_config(config: &LimiterConfig) -> Self {
        Self {
            authenticated: config.authenticated.into(),
            anonymous: config.anonymous.into(),
        }
    }

    pub fn policy(&self, tier: Tier) -> TierPolicy {
        match tier {
            Tier::Authenticated => self.authenticated,
            Tier::Anonymous => self.anonymous,
        }
    }
}

#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Admit or reject one request from `identity` under `tier`'s budget.
    async fn allow(&self, identity: &str, tier: Tier) -> Result<Admission>;
}

/// 按配置构建限流后端
pub fn build_limiter(config: &LimiterConfig) -> Result<Arc<dyn RateLimiter>> {
    let limiter: Arc<dyn RateLimiter> = match config.limiter_type.as_str() {
        "memory" => Arc::new(MemoryLimiter::new(config)),
        "redis" => Arc::new(RedisLimiter::new(config)?),
        other => {
            return Err(LinkshardError::backend_not_found(format!(
                "Rate limiter backend not found: {}",
                other
            )));
        }
    };
    info!("Rate limiter initialized: {}", config.limiter_type);
    Ok(limiter)
}
