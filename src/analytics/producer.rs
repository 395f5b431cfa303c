//! Click event construction on the resolve path.
//!
//! The producer never stores who the requester is: the identity is folded
//! into a 16-char xxHash64 hex before the event leaves this module. Device
//! classification happens here too, so downstream consumers only ever see
//! a coarse category, not the raw User-Agent.

use chrono::Utc;
use woothee::parser::Parser;
use xxhash_rust::xxh64::xxh64;

use super::{ClickEvent, EventTopic};
use crate::id::LinkId;

pub struct EventProducer {
    topic: EventTopic,
}

impl EventProducer {
    pub fn new(topic: EventTopic) -> Self {
        Self { topic }
    }

    /// Compute xxHash64 of a string, returning 16-char hex
    #[inline]
    pub fn compute_hash(s: &str) -> String {
        format!("{:016x}", xxh64(s.as_bytes(), 0))
    }

    /// Coarse device category from a User-Agent string ("pc", "smartphone",
    /// "crawler", ...). Unparseable agents classify as None.
    fn classify_device(user_agent: &str) -> Option<String> {
        let parser = Parser::new();
        let result = parser.parse(user_agent)?;
        if result.category == "UNKNOWN" {
            None
        } else {
            Some(result.category.to_string())
        }
    }

    /// Build and publish one click event. Fire-and-forget: a full or closed
    /// topic drops the event, the resolve path never waits on analytics.
    pub fn emit(
        &self,
        id: LinkId,
        short_key: &str,
        requester: &str,
        region: &str,
        referrer: Option<&str>,
        user_agent: Option<&str>,
    ) {
        let event = ClickEvent {
            short_url_id: id.as_i64(),
            short_key: short_key.to_string(),
            requester_hash: Self::compute_hash(requester),
            region: region.to_string(),
            referrer: referrer.map(str::to_string),
            device: user_agent.and_then(Self::classify_device),
            timestamp: Utc::now(),
        };
        self.topic.try_publish(event);
    }
}
