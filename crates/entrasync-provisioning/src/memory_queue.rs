//! In-memory work queue.
//!
//! Bounded by [`QueueConfig::capacity`] outstanding items. Contents are lost
//! when the process exits; the `postgres` backend is the durable choice.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::queue::{
    EnqueueOutcome, ItemState, QueueConfig, QueueError, QueueResult, QueueStats, RetryOutcome,
    WorkCategory, WorkItem, WorkQueue,
};

/// Work queue held in process memory.
#[derive(Debug)]
pub struct MemoryWorkQueue {
    config: QueueConfig,
    items: Mutex<Vec<WorkItem>>,
    available: AtomicBool,
}

impl Default for MemoryWorkQueue {
    fn default() -> Self {
        Self::new(QueueConfig::default())
    }
}

impl MemoryWorkQueue {
    #[must_use]
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            items: Mutex::new(Vec::new()),
            available: AtomicBool::new(true),
        }
    }

    #[must_use]
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Simulate the queue backend going away (or coming back).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Snapshot of every item in enqueue order.
    pub async fn items(&self) -> Vec<WorkItem> {
        self.items.lock().await.clone()
    }

    /// Items of one category in enqueue order.
    pub async fn items_in(&self, category: WorkCategory) -> Vec<WorkItem> {
        self.items
            .lock()
            .await
            .iter()
            .filter(|i| i.category == category)
            .cloned()
            .collect()
    }

    fn ensure_available(&self) -> QueueResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(QueueError::Unavailable("in-memory queue disabled".to_string()))
        }
    }
}

/// Cutoffs and delays are clamped to a century.
fn seconds(secs: u64) -> ChronoDuration {
    const CENTURY_SECS: i64 = 100 * 365 * 86_400;
    ChronoDuration::seconds(i64::try_from(secs).unwrap_or(i64::MAX).min(CENTURY_SECS))
}

fn claimed_mut(items: &mut [WorkItem], item_id: Uuid) -> QueueResult<&mut WorkItem> {
    let item = items
        .iter_mut()
        .find(|i| i.id == item_id)
        .ok_or(QueueError::NotFound { item_id })?;
    if item.state != ItemState::InProgress {
        return Err(QueueError::InvalidState {
            item_id,
            state: item.state,
        });
    }
    Ok(item)
}

#[async_trait]
impl WorkQueue for MemoryWorkQueue {
    async fn enqueue(&self, mut item: WorkItem) -> QueueResult<EnqueueOutcome> {
        self.ensure_available()?;
        let mut items = self.items.lock().await;

        if let Some(existing) = items
            .iter()
            .find(|i| i.state.is_outstanding() && i.idempotency_key == item.idempotency_key)
        {
            return Ok(EnqueueOutcome::Duplicate {
                existing: existing.id,
            });
        }

        let outstanding = items.iter().filter(|i| i.state.is_outstanding()).count();
        if outstanding >= self.config.capacity {
            return Err(QueueError::Full {
                capacity: self.config.capacity,
            });
        }

        item.state = ItemState::Pending;
        let id = item.id;
        debug!(item_id = %id, category = %item.category, "Enqueued work item");
        items.push(item);
        Ok(EnqueueOutcome::Enqueued(id))
    }

    async fn claim(
        &self,
        category: Option<WorkCategory>,
        limit: usize,
    ) -> QueueResult<Vec<WorkItem>> {
        self.ensure_available()?;
        let now = Utc::now();
        let mut items = self.items.lock().await;

        let claimed = items
            .iter_mut()
            .filter(|i| {
                i.state == ItemState::Pending
                    && i.next_attempt_at <= now
                    && category.map_or(true, |c| i.category == c)
            })
            .take(limit)
            .map(|item| {
                item.state = ItemState::InProgress;
                item.attempt_count += 1;
                item.claimed_at = Some(now);
                item.clone()
            })
            .collect();
        Ok(claimed)
    }

    async fn complete(&self, item_id: Uuid) -> QueueResult<()> {
        self.ensure_available()?;
        let mut items = self.items.lock().await;
        let item = claimed_mut(&mut items, item_id)?;
        item.state = ItemState::Completed;
        item.claimed_at = None;
        item.finished_at = Some(Utc::now());
        item.last_error = None;
        Ok(())
    }

    async fn retry(&self, item_id: Uuid, error: &str) -> QueueResult<RetryOutcome> {
        self.ensure_available()?;
        let mut items = self.items.lock().await;
        let item = claimed_mut(&mut items, item_id)?;
        item.claimed_at = None;
        item.last_error = Some(error.to_string());

        if item.attempts_exhausted() {
            item.state = ItemState::DeadLettered;
            item.finished_at = Some(Utc::now());
            return Ok(RetryOutcome::DeadLettered);
        }

        let delay = self.config.retry_delay(item.attempt_count);
        let next_attempt_at = Utc::now() + seconds(delay.as_secs());
        item.state = ItemState::Pending;
        item.next_attempt_at = next_attempt_at;
        Ok(RetryOutcome::Scheduled { next_attempt_at })
    }

    async fn dead_letter(&self, item_id: Uuid, error: &str) -> QueueResult<()> {
        self.ensure_available()?;
        let mut items = self.items.lock().await;
        let item = claimed_mut(&mut items, item_id)?;
        item.state = ItemState::DeadLettered;
        item.claimed_at = None;
        item.finished_at = Some(Utc::now());
        item.last_error = Some(error.to_string());
        Ok(())
    }

    async fn release_stale(&self, older_than_secs: u64) -> QueueResult<u64> {
        self.ensure_available()?;
        let cutoff = Utc::now() - seconds(older_than_secs);
        let mut items = self.items.lock().await;

        let mut released = 0;
        for item in items.iter_mut() {
            if item.state == ItemState::InProgress && item.claimed_at.is_some_and(|at| at <= cutoff)
            {
                item.state = ItemState::Pending;
                item.claimed_at = None;
                released += 1;
            }
        }
        Ok(released)
    }

    async fn purge_completed(&self, older_than_secs: u64) -> QueueResult<u64> {
        self.ensure_available()?;
        let cutoff = Utc::now() - seconds(older_than_secs);
        let mut items = self.items.lock().await;

        let before = items.len();
        items.retain(|i| {
            i.state != ItemState::Completed || i.finished_at.map_or(true, |at| at > cutoff)
        });
        let purged = u64::try_from(before - items.len()).unwrap_or(u64::MAX);
        if purged > 0 {
            debug!(purged, "Purged completed work items");
        }
        Ok(purged)
    }

    async fn stats(&self) -> QueueResult<QueueStats> {
        self.ensure_available()?;
        let items = self.items.lock().await;
        let mut stats = QueueStats::default();

        for item in items.iter() {
            let entry = stats.category_mut(item.category);
            match item.state {
                ItemState::Pending => {
                    entry.pending += 1;
                    if entry.oldest_pending_at.map_or(true, |at| item.enqueued_at < at) {
                        entry.oldest_pending_at = Some(item.enqueued_at);
                    }
                }
                ItemState::InProgress => entry.in_progress += 1,
                ItemState::Completed => entry.completed += 1,
                ItemState::DeadLettered => entry.dead_lettered += 1,
            }
        }
        Ok(stats)
    }

    async fn dead_letters(
        &self,
        category: Option<WorkCategory>,
        limit: usize,
    ) -> QueueResult<Vec<WorkItem>> {
        self.ensure_available()?;
        let items = self.items.lock().await;
        Ok(items
            .iter()
            .rev()
            .filter(|i| {
                i.state == ItemState::DeadLettered && category.map_or(true, |c| i.category == c)
            })
            .take(limit)
            .cloned()
            .collect())
    }
}
