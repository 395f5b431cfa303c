//! 事件消费者
//!
//! 主题的唯一消费端。事件先过校验，畸形的直接丢弃并记日志，
//! 合法的原样落库。循环绝不因单条事件退出：校验失败跳过，
//! 落库失败记错误后继续，下游聚合按 at-least-once 容忍重复。

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{AnalyticsStore, ClickEvent, TopicReceiver};
use crate::errors::{LinkshardError, Result};
use crate::utils::is_valid_short_key;

pub struct EventConsumer {
    store: Arc<dyn AnalyticsStore>,
}

impl EventConsumer {
    pub fn new(store: Arc<dyn AnalyticsStore>) -> Self {
        Self { store }
    }

    /// 单条事件的结构校验
    fn validate(event: &ClickEvent) -> Result<()> {
        if event.short_url_id <= 0 {
            return Err(LinkshardError::malformed_event(format!(
                "Click event carries invalid id {}",
                event.short_url_id
            )));
        }
        if !is_valid_short_key(&event.short_key) {
            return Err(LinkshardError::malformed_event(format!(
                "Click event carries invalid short_key '{}'",
                event.short_key
            )));
        }
        Ok(())
    }

    /// 消费循环，直到所有发布端关闭才返回
    pub async fn run(self, mut receiver: TopicReceiver) {
        info!("Event consumer started");

        while let Some(event) = receiver.recv().await {
            if let Err(e) = Self::validate(&event) {
                warn!("Skipping click event: {}", e);
                continue;
            }

            if let Err(e) = self.store.insert_event(&event).await {
                // 落库失败只损失这一条，消费循环继续
                warn!(
                    "Failed to store click event for '{}': {}",
                    event.short_key, e
                );
                continue;
            }

            debug!("Click event stored for '{}'", event.short_key);
        }

        info!("Event consumer stopped: topic closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::{EventTopic, MemoryAnalytics};
    use chrono::Utc;

    fn event(id: i64, key: &str) -> ClickEvent {
        ClickEvent {
            short_url_id: id,
            short_key: key.to_string(),
            requester_hash: "cafebabecafebabe".to_string(),
            region: "asia".to_string(),
            referrer: None,
            device: None,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_consumer_stores_valid_events() {
        let store = Arc::new(MemoryAnalytics::new());
        let (topic, rx) = EventTopic::bounded(8);

        topic.try_publish(event(1, "abc"));
        topic.try_publish(event(2, "def"));
        drop(topic);

        EventConsumer::new(store.clone()).run(rx).await;
        assert_eq!(store.fetch_unprocessed(10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_consumer_skips_malformed_events() {
        let store = Arc::new(MemoryAnalytics::new());
        let (topic, rx) = EventTopic::bounded(8);

        topic.try_publish(event(0, "abc")); // id 非法
        topic.try_publish(event(5, "has space")); // 短键非法
        topic.try_publish(event(7, "ok-key"));
        drop(topic);

        EventConsumer::new(store.clone()).run(rx).await;

        let stored = store.fetch_unprocessed(10).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].event.short_key, "ok-key");
    }

    #[test]
    fn test_validate_rejects_negative_id() {
        let e = event(-3, "abc");
        assert_eq!(EventConsumer::validate(&e).unwrap_err().code(), "E006");
    }
}
