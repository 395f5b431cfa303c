//! Identifier layout and generation.
//!
//! 64-bit identifiers, LSB to MSB:
//!
//! ```text
//! | sequence: 5 | process tag: 5 | host tag: 10 | region code: 2 | timestamp: 42 |
//! ```
//!
//! The timestamp counts milliseconds since the service epoch
//! (2025-01-01T00:00:00Z), so identifiers sort by creation time and every
//! identifier carries the region it was born in.

mod generator;

pub use generator::SnowflakeGenerator;

use crate::region::RegionCode;

/// Service epoch: 2025-01-01T00:00:00Z as Unix milliseconds.
pub const ID_EPOCH_MS: i64 = 1_735_689_600_000;

pub(crate) const SEQUENCE_BITS: u32 = 5;
pub(crate) const PROCESS_BITS: u32 = 5;
pub(crate) const HOST_BITS: u32 = 10;
pub(crate) const REGION_BITS: u32 = 2;
pub(crate) const TIMESTAMP_BITS: u32 = 42;

pub(crate) const SEQUENCE_MASK: u64 = (1 << SEQUENCE_BITS) - 1;
pub(crate) const PROCESS_MASK: u64 = (1 << PROCESS_BITS) - 1;
pub(crate) const HOST_MASK: u64 = (1 << HOST_BITS) - 1;
pub(crate) const REGION_MASK: u64 = (1 << REGION_BITS) - 1;
pub(crate) const TIMESTAMP_MASK: u64 = (1 << TIMESTAMP_BITS) - 1;

pub(crate) const PROCESS_SHIFT: u32 = SEQUENCE_BITS;
pub(crate) const HOST_SHIFT: u32 = SEQUENCE_BITS + PROCESS_BITS;
pub(crate) const REGION_SHIFT: u32 = SEQUENCE_BITS + PROCESS_BITS + HOST_BITS;
pub(crate) const TIMESTAMP_SHIFT: u32 = SEQUENCE_BITS + PROCESS_BITS + HOST_BITS + REGION_BITS;

/// A link identifier with its birth region, host and process baked in.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct LinkId(u64);

impl LinkId {
    pub(crate) fn from_parts(
        timestamp_ms: u64,
        region: RegionCode,
        host_tag: u16,
        process_tag: u8,
        sequence: u8,
    ) -> Self {
        let value = ((timestamp_ms & TIMESTAMP_MASK) << TIMESTAMP_SHIFT)
            | ((region.value() as u64 & REGION_MASK) << REGION_SHIFT)
            | ((host_tag as u64 & HOST_MASK) << HOST_SHIFT)
            | ((process_tag as u64 & PROCESS_MASK) << PROCESS_SHIFT)
            | (sequence as u64 & SEQUENCE_MASK);
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    /// Storage form. The top bit stays clear until the epoch's 70th year,
    /// so the cast is lossless for any identifier this service can mint.
    pub fn as_i64(&self) -> i64 {
        self.0 as i64
    }

    pub fn from_i64(value: i64) -> Self {
        Self(value as u64)
    }

    /// Milliseconds since the service epoch at generation time.
    pub fn timestamp_ms(&self) -> u64 {
        (self.0 >> TIMESTAMP_SHIFT) & TIMESTAMP_MASK
    }

    /// Unix milliseconds at generation time.
    pub fn unix_ms(&self) -> i64 {
        ID_EPOCH_MS + self.timestamp_ms() as i64
    }

    pub fn region_code(&self) -> u8 {
        ((self.0 >> REGION_SHIFT) & REGION_MASK) as u8
    }

    pub fn host_tag(&self) -> u16 {
        ((self.0 >> HOST_SHIFT) & HOST_MASK) as u16
    }

    pub fn process_tag(&self) -> u8 {
        ((self.0 >> PROCESS_SHIFT) & PROCESS_MASK) as u8
    }

    pub fn sequence(&self) -> u8 {
        (self.0 & SEQUENCE_MASK) as u8
    }
}

impl std::fmt::Display for LinkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
