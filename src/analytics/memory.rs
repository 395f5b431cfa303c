//! In-memory analytics store, for tests and single-node setups.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use parking_lot::Mutex;
use uuid::Uuid;

use super::{AggregateDelta, AggregateRow, AnalyticsStore, ClickEvent, PendingEvent};
use crate::errors::Result;

struct StoredEvent {
    row_id: String,
    event: ClickEvent,
    processed: bool,
}

#[derive(Default)]
pub struct MemoryAnalytics {
    /// 原始事件，保持到达顺序
    events: Mutex<Vec<StoredEvent>>,
    aggregates: DashMap<(i64, NaiveDate), AggregateRow>,
}

impl MemoryAnalytics {
    pub fn new() -> Self {
        Self::default()
    }

    fn merge_map(target: &mut HashMap<String, u64>, delta: &HashMap<String, u64>) {
        for (key, count) in delta {
            *target.entry(key.clone()).or_insert(0) += count;
        }
    }
}

#[async_trait]
impl AnalyticsStore for MemoryAnalytics {
    async fn insert_event(&self, event: &ClickEvent) -> Result<()> {
        self.events.lock().push(StoredEvent {
            row_id: Uuid::new_v4().to_string(),
            event: event.clone(),
            processed: false,
        });
        Ok(())
    }

    async fn fetch_unprocessed(&self, limit: u64) -> Result<Vec<PendingEvent>> {
        let events = self.events.lock();
        Ok(events
            .iter()
            .filter(|stored| !stored.processed)
            .take(limit as usize)
            .map(|stored| PendingEvent {
                row_id: stored.row_id.clone(),
                event: stored.event.clone(),
            })
            .collect())
    }

    async fn fold_batch(&self, deltas: &[AggregateDelta], row_ids: &[String]) -> Result<()> {
        for delta in deltas {
            let mut row = self
                .aggregates
                .entry((delta.short_url_id, delta.day))
                .or_insert_with(|| AggregateRow {
                    short_url_id: delta.short_url_id,
                    day: delta.day,
                    total_clicks: 0,
                    unique_visitors: 0,
                    country_stats: HashMap::new(),
                    device_stats: HashMap::new(),
                    referrer_stats: HashMap::new(),
                });

            row.total_clicks += delta.total_clicks;
            row.unique_visitors += delta.unique_visitors;
            Self::merge_map(&mut row.country_stats, &delta.country_stats);
            Self::merge_map(&mut row.device_stats, &delta.device_stats);
            Self::merge_map(&mut row.referrer_stats, &delta.referrer_stats);
        }

        let mut events = self.events.lock();
        for stored in events.iter_mut() {
            if row_ids.contains(&stored.row_id) {
                stored.processed = true;
            }
        }
        Ok(())
    }

    async fn aggregates_between(
        &self,
        short_url_id: i64,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<AggregateRow>> {
        let mut rows: Vec<AggregateRow> = self
            .aggregates
            .iter()
            .filter(|entry| {
                let (id, day) = *entry.key();
                id == short_url_id
                    && from.is_none_or(|f| day >= f)
                    && to.is_none_or(|t| day <= t)
            })
            .map(|entry| entry.value().clone())
            .collect();
        rows.sort_by_key(|row| row.day);
        Ok(rows)
    }
}
