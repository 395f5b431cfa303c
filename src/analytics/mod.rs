//! 点击分析管道
//!
//! 请求路径只做一件事：把事件塞进有界主题（塞不进就丢弃并记日志）。
//! 消费者把事件原样落库，聚合器周期性地把未处理行折叠进按天聚合表。
//! 投递语义是 at-least-once，聚合靠 `processed` 标记保证重放不重算。

mod aggregator;
mod clicks;
mod consumer;
mod memory;
mod producer;
mod sea_orm;
mod topic;

pub use aggregator::Aggregator;
pub use clicks::ClickCounter;
pub use consumer::EventConsumer;
pub use memory::MemoryAnalytics;
pub use producer::EventProducer;
pub use sea_orm::SeaOrmAnalytics;
pub use topic::{EventTopic, TopicReceiver};

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::errors::Result;

/// 一次点击事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickEvent {
    /// 被点击链接的标识
    pub short_url_id: i64,
    /// 短键
    pub short_key: String,
    /// 调用方散列（xxHash64 十六进制），不落原始地址
    pub requester_hash: String,
    /// 请求到达的区域标签
    pub region: String,
    /// 来源页面 (Referer header)
    pub referrer: Option<String>,
    /// 设备类别，从 User-Agent 解析
    pub device: Option<String>,
    /// 点击时间戳
    pub timestamp: DateTime<Utc>,
}

impl ClickEvent {
    /// 事件所属的聚合日（UTC）
    pub fn day_bucket(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }
}

/// 等待聚合的原始行
#[derive(Debug, Clone)]
pub struct PendingEvent {
    /// 落库时分配的行标识
    pub row_id: String,
    pub event: ClickEvent,
}

/// 一个 (链接, 日) 桶的聚合增量
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateDelta {
    pub short_url_id: i64,
    pub day: NaiveDate,
    pub total_clicks: u64,
    /// 本批内去重的访问者数。跨批只能相加，是有意的近似
    pub unique_visitors: u64,
    pub country_stats: HashMap<String, u64>,
    pub device_stats: HashMap<String, u64>,
    pub referrer_stats: HashMap<String, u64>,
}

/// 按天聚合结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateRow {
    pub short_url_id: i64,
    pub day: NaiveDate,
    pub total_clicks: u64,
    pub unique_visitors: u64,
    pub country_stats: HashMap<String, u64>,
    pub device_stats: HashMap<String, u64>,
    pub referrer_stats: HashMap<String, u64>,
}

/// 分析存储后端
#[async_trait]
pub trait AnalyticsStore: Send + Sync {
    /// 追加一条原始事件（重复投递容忍，行标识由存储分配）
    async fn insert_event(&self, event: &ClickEvent) -> Result<()>;

    /// 按时间序取出未处理的原始行
    async fn fetch_unprocessed(&self, limit: u64) -> Result<Vec<PendingEvent>>;

    /// 把增量折叠进聚合表并标记 `row_ids` 为已处理，同一事务完成
    async fn fold_batch(&self, deltas: &[AggregateDelta], row_ids: &[String]) -> Result<()>;

    /// 日期范围查询某链接的聚合行，边界闭区间，None 表示不设界
    async fn aggregates_between(
        &self,
        short_url_id: i64,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<AggregateRow>>;
}
