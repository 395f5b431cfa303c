use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use super::{Admission, RateLimiter, Tier, TierPolicies};
use crate::config::LimiterConfig;
use crate::errors::Result;

struct WindowSlot {
    remaining: u64,
    deadline: Instant,
}

/// In-process limiter. One DashMap entry per (tier, identity); the entry's
/// deadline is the window edge, expired entries restart on next touch.
pub struct MemoryLimiter {
    slots: DashMap<String, WindowSlot>,
    policies: TierPolicies,
}

impl MemoryLimiter {
    pub fn new(config: &LimiterConfig) -> Self {
        Self {
            slots: DashMap::new(),
            policies: TierPolicies::from_config(config),
        }
    }

    fn make_key(&self, identity: &str, tier: Tier) -> String {
        format!("{}:{}", tier.key_fragment(), identity)
    }
}

#[async_trait]
impl RateLimiter for MemoryLimiter {
    async fn allow(&self, identity: &str, tier: Tier) -> Result<Admission> {
        let policy = self.policies.policy(tier);
        if policy.limit == 0 {
            return Ok(Admission::Denied {
                retry_after_secs: policy.window_secs,
            });
        }

        let now = Instant::now();
        let window = Duration::from_secs(policy.window_secs);

        // entry() 持有分段锁，窗口判定和扣减是一个原子单元
        let mut slot = self
            .slots
            .entry(self.make_key(identity, tier))
            .or_insert_with(|| WindowSlot {
                remaining: policy.limit,
                deadline: now + window,
            });

        if slot.deadline <= now {
            // 窗口已过，重开
            slot.remaining = policy.limit;
            slot.deadline = now + window;
        }

        if slot.remaining > 0 {
            slot.remaining -= 1;
            Ok(Admission::Granted {
                remaining: slot.remaining,
            })
        } else {
            let left = slot.deadline.saturating_duration_since(now);
            let mut retry_after_secs = left.as_secs();
            if left.subsec_nanos() > 0 {
                retry_after_secs += 1;
            }
            Ok(Admission::Denied { retry_after_secs })
        }
    }
}
