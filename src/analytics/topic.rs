//! 进程内事件主题
//!
//! 有界 mpsc 通道，语义对齐追加型消息主题：发布端绝不阻塞，
//! 队列满载时丢弃事件并记日志。分析属于尽力而为，不反压请求路径。

use tokio::sync::mpsc;
use tracing::{trace, warn};

use super::ClickEvent;

pub type TopicReceiver = mpsc::Receiver<ClickEvent>;

/// 点击事件主题的发布端
#[derive(Clone)]
pub struct EventTopic {
    tx: mpsc::Sender<ClickEvent>,
}

impl EventTopic {
    /// 创建容量为 `capacity` 的主题，返回发布端和唯一的消费端
    pub fn bounded(capacity: usize) -> (Self, TopicReceiver) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// 非阻塞发布。队列满或消费端已关闭时事件被丢弃
    pub fn try_publish(&self, event: ClickEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {
                trace!("Click event published");
            }
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(
                    "Event topic full, dropping click event for '{}'",
                    event.short_key
                );
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                warn!(
                    "Event topic closed, dropping click event for '{}'",
                    event.short_key
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn event(key: &str) -> ClickEvent {
        ClickEvent {
            short_url_id: 1,
            short_key: key.to_string(),
            requester_hash: "deadbeefdeadbeef".to_string(),
            region: "asia".to_string(),
            referrer: None,
            device: None,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_publish_and_receive() {
        let (topic, mut rx) = EventTopic::bounded(8);
        topic.try_publish(event("abc"));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.short_key, "abc");
    }

    #[tokio::test]
    async fn test_full_topic_drops_instead_of_blocking() {
        let (topic, mut rx) = EventTopic::bounded(2);
        for i in 0..5 {
            topic.try_publish(event(&format!("k{i}")));
        }

        // 只有容量内的两条留下，其余被丢弃
        assert_eq!(rx.recv().await.unwrap().short_key, "k0");
        assert_eq!(rx.recv().await.unwrap().short_key, "k1");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_closed_receiver_does_not_panic() {
        let (topic, rx) = EventTopic::bounded(2);
        drop(rx);
        topic.try_publish(event("abc"));
    }
}
