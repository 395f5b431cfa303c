//! Snowflake-style identifier generator.
//!
//! One generator per process. The `(last_ts, sequence)` pair lives behind a
//! mutex so concurrent writers serialize on the critical section instead of
//! racing the clock; identifiers from a single generator are strictly
//! increasing.

use std::time::Duration;

use parking_lot::Mutex;
use tracing::warn;
use xxhash_rust::xxh64::xxh64;

use super::{HOST_MASK, ID_EPOCH_MS, LinkId, PROCESS_MASK, SEQUENCE_MASK};
use crate::config::GeneratorConfig;
use crate::region::RegionCode;

struct GeneratorState {
    /// Milliseconds since the service epoch at the last grant. -1 before
    /// the first call.
    last_ts: i64,
    sequence: u8,
}

pub struct SnowflakeGenerator {
    host_tag: u16,
    process_tag: u8,
    state: Mutex<GeneratorState>,
}

impl SnowflakeGenerator {
    /// Generator with identity derived from the environment: host tag from a
    /// hash of the host name, process tag from the PID.
    ///
    /// Derived identity is best-effort. Two hosts can hash to the same tag;
    /// deployments that need guaranteed disjoint tags should assign them via
    /// configuration instead.
    pub fn new() -> Self {
        Self::with_identity(derive_host_tag(), derive_process_tag())
    }

    /// Generator with an explicitly assigned identity.
    ///
    /// Oversized tags are masked into their fields (host tag 10 bits,
    /// process tag 5 bits).
    pub fn with_identity(host_tag: u16, process_tag: u8) -> Self {
        Self {
            host_tag: (host_tag as u64 & HOST_MASK) as u16,
            process_tag: (process_tag as u64 & PROCESS_MASK) as u8,
            state: Mutex::new(GeneratorState {
                last_ts: -1,
                sequence: 0,
            }),
        }
    }

    /// Builds the generator from configuration, falling back to derived
    /// identity for unset tags.
    pub fn from_config(config: &GeneratorConfig) -> Self {
        let host_tag = config.host_tag.unwrap_or_else(derive_host_tag);
        let process_tag = config.process_tag.unwrap_or_else(derive_process_tag);
        Self::with_identity(host_tag, process_tag)
    }

    /// Mints the next identifier for `region`.
    ///
    /// Never fails. A backwards clock jump or a sequence overflow inside one
    /// millisecond both degrade into a short wait until the wall clock
    /// catches up, holding the lock so no other caller can slip an older
    /// timestamp in between.
    pub fn generate(&self, region: RegionCode) -> LinkId {
        let mut state = self.state.lock();

        let mut ts = current_ts();
        if ts < state.last_ts {
            warn!(
                delta_ms = state.last_ts - ts,
                "clock moved backwards, waiting for it to catch up"
            );
            ts = wait_for_next_ms(state.last_ts);
        }

        if ts == state.last_ts {
            state.sequence = ((state.sequence as u64 + 1) & SEQUENCE_MASK) as u8;
            if state.sequence == 0 {
                // 32 identifiers in one millisecond, roll to the next
                ts = wait_for_next_ms(state.last_ts);
            }
        } else {
            state.sequence = 0;
        }

        state.last_ts = ts;
        LinkId::from_parts(
            ts as u64,
            region,
            self.host_tag,
            self.process_tag,
            state.sequence,
        )
    }

    pub fn host_tag(&self) -> u16 {
        self.host_tag
    }

    pub fn process_tag(&self) -> u8 {
        self.process_tag
    }
}

impl Default for SnowflakeGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Milliseconds since the service epoch.
fn current_ts() -> i64 {
    chrono::Utc::now().timestamp_millis() - ID_EPOCH_MS
}

/// Spins (with short sleeps) until the clock passes `last_ts`.
fn wait_for_next_ms(last_ts: i64) -> i64 {
    let mut ts = current_ts();
    while ts <= last_ts {
        std::thread::sleep(Duration::from_micros(100));
        ts = current_ts();
    }
    ts
}

/// Host tag from the host name: 10 bits of its xxh64 hash.
fn derive_host_tag() -> u16 {
    let host = std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.is_empty())
        .or_else(|| {
            std::fs::read_to_string("/etc/hostname")
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|h| !h.is_empty())
        })
        .unwrap_or_else(|| "localhost".to_string());
    (xxh64(host.as_bytes(), 0) % 1024) as u16
}

fn derive_process_tag() -> u8 {
    (std::process::id() % 32) as u8
}
