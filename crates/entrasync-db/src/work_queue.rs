//! Durable work queue on `PostgreSQL`.
//!
//! Items live in the `work_items` table. A partial unique index on
//! `idempotency_key` over pending and in-progress rows makes enqueue
//! idempotent, and claims use `FOR UPDATE SKIP LOCKED` so several workers
//! can share the table.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use entrasync_provisioning::queue::{
    EnqueueOutcome, ItemState, QueueConfig, QueueError, QueueResult, QueueStats, RetryOutcome,
    WorkCategory, WorkItem, WorkQueue,
};

use crate::error::DbError;
use crate::models::WorkItemRow;
use crate::pool::DbPool;

/// Insert attempts before giving up when the conflicting item keeps
/// finishing between the insert and the lookup.
const ENQUEUE_ATTEMPTS: usize = 3;

/// Work queue backed by the `work_items` table.
///
/// `QueueConfig::capacity` is not enforced; the table is the bound.
#[derive(Debug, Clone)]
pub struct PgWorkQueue {
    pool: DbPool,
    config: QueueConfig,
}

impl PgWorkQueue {
    pub fn new(pool: DbPool, config: QueueConfig) -> Self {
        Self { pool, config }
    }

    #[must_use]
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Explain why a guarded transition touched no row.
    async fn transition_error(&self, item_id: Uuid) -> QueueError {
        match WorkItemRow::state_of(self.pool.inner(), item_id).await {
            Ok(None) => QueueError::NotFound { item_id },
            Ok(Some(state)) => match state.parse::<ItemState>() {
                Ok(state) => QueueError::InvalidState { item_id, state },
                Err(e) => QueueError::InvalidData(e),
            },
            Err(e) => DbError::query(e).into(),
        }
    }
}

#[async_trait]
impl WorkQueue for PgWorkQueue {
    #[instrument(skip(self, item), fields(category = %item.category, identity_key = %item.identity_key))]
    async fn enqueue(&self, item: WorkItem) -> QueueResult<EnqueueOutcome> {
        let pool = self.pool.inner();
        for _ in 0..ENQUEUE_ATTEMPTS {
            if let Some(id) = WorkItemRow::insert_if_absent(pool, &item)
                .await
                .map_err(DbError::query)?
            {
                return Ok(EnqueueOutcome::Enqueued(id));
            }
            if let Some(existing) = WorkItemRow::find_outstanding(pool, &item.idempotency_key)
                .await
                .map_err(DbError::query)?
            {
                debug!(%existing, "Work item already outstanding");
                return Ok(EnqueueOutcome::Duplicate { existing });
            }
        }
        Err(QueueError::Unavailable(
            "enqueue kept conflicting with a finishing item".to_string(),
        ))
    }

    async fn claim(
        &self,
        category: Option<WorkCategory>,
        limit: usize,
    ) -> QueueResult<Vec<WorkItem>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let rows = WorkItemRow::claim_due(
            self.pool.inner(),
            category,
            i64::try_from(limit).unwrap_or(i64::MAX),
        )
        .await
        .map_err(DbError::query)?;

        let mut items = rows
            .into_iter()
            .map(WorkItemRow::into_item)
            .collect::<Result<Vec<_>, _>>()?;
        items.sort_by_key(|i| (i.next_attempt_at, i.enqueued_at));
        Ok(items)
    }

    async fn complete(&self, item_id: Uuid) -> QueueResult<()> {
        let updated = WorkItemRow::mark_completed(self.pool.inner(), item_id)
            .await
            .map_err(DbError::query)?;
        if updated {
            Ok(())
        } else {
            Err(self.transition_error(item_id).await)
        }
    }

    async fn retry(&self, item_id: Uuid, error: &str) -> QueueResult<RetryOutcome> {
        let mut tx = self.pool.inner().begin().await.map_err(DbError::query)?;

        let Some(row) = WorkItemRow::lock_by_id(&mut *tx, item_id)
            .await
            .map_err(DbError::query)?
        else {
            return Err(QueueError::NotFound { item_id });
        };
        let item = row.into_item()?;
        if item.state != ItemState::InProgress {
            return Err(QueueError::InvalidState {
                item_id,
                state: item.state,
            });
        }

        let outcome = if item.attempts_exhausted() {
            WorkItemRow::mark_dead_lettered(&mut *tx, item_id, error)
                .await
                .map_err(DbError::query)?;
            warn!(%item_id, attempts = item.attempt_count, "Attempts exhausted, item dead-lettered");
            RetryOutcome::DeadLettered
        } else {
            let delay = self.config.retry_delay(item.attempt_count);
            let next_attempt_at = Utc::now()
                + ChronoDuration::seconds(i64::try_from(delay.as_secs()).unwrap_or(i64::MAX));
            WorkItemRow::mark_pending(&mut *tx, item_id, error, next_attempt_at)
                .await
                .map_err(DbError::query)?;
            RetryOutcome::Scheduled { next_attempt_at }
        };

        tx.commit().await.map_err(DbError::query)?;
        Ok(outcome)
    }

    async fn dead_letter(&self, item_id: Uuid, error: &str) -> QueueResult<()> {
        let mut conn = self.pool.inner().acquire().await.map_err(DbError::query)?;
        let updated = WorkItemRow::mark_dead_lettered(&mut *conn, item_id, error)
            .await
            .map_err(DbError::query)?;
        drop(conn);
        if updated {
            Ok(())
        } else {
            Err(self.transition_error(item_id).await)
        }
    }

    async fn release_stale(&self, older_than_secs: u64) -> QueueResult<u64> {
        let cutoff = Utc::now()
            - ChronoDuration::seconds(i64::try_from(older_than_secs).unwrap_or(i64::MAX));
        let released = WorkItemRow::release_claimed_before(self.pool.inner(), cutoff)
            .await
            .map_err(DbError::query)?;
        if released > 0 {
            warn!(released, older_than_secs, "Released stale in-progress items");
        }
        Ok(released)
    }

    async fn purge_completed(&self, older_than_secs: u64) -> QueueResult<u64> {
        let cutoff = Utc::now()
            - ChronoDuration::seconds(i64::try_from(older_than_secs).unwrap_or(i64::MAX));
        let purged = WorkItemRow::delete_completed_before(self.pool.inner(), cutoff)
            .await
            .map_err(DbError::query)?;
        if purged > 0 {
            debug!(purged, older_than_secs, "Purged completed items");
        }
        Ok(purged)
    }

    async fn stats(&self) -> QueueResult<QueueStats> {
        let counts = WorkItemRow::counts(self.pool.inner())
            .await
            .map_err(DbError::query)?;

        let mut stats = QueueStats::default();
        for row in counts {
            let category = row
                .category
                .parse::<WorkCategory>()
                .map_err(QueueError::InvalidData)?;
            let state = row.state.parse::<ItemState>().map_err(QueueError::InvalidData)?;
            let count = u64::try_from(row.count).unwrap_or(0);

            let entry = stats.category_mut(category);
            match state {
                ItemState::Pending => {
                    entry.pending = count;
                    entry.oldest_pending_at = row.oldest_enqueued_at;
                }
                ItemState::InProgress => entry.in_progress = count,
                ItemState::Completed => entry.completed = count,
                ItemState::DeadLettered => entry.dead_lettered = count,
            }
        }
        Ok(stats)
    }

    async fn dead_letters(
        &self,
        category: Option<WorkCategory>,
        limit: usize,
    ) -> QueueResult<Vec<WorkItem>> {
        let rows = WorkItemRow::dead_lettered(
            self.pool.inner(),
            category,
            i64::try_from(limit).unwrap_or(i64::MAX),
        )
        .await
        .map_err(DbError::query)?;
        Ok(rows
            .into_iter()
            .map(WorkItemRow::into_item)
            .collect::<Result<Vec<_>, _>>()?)
    }
}
