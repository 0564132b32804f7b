//! Work item model backing the durable queue.

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use entrasync_provisioning::queue::{ItemState, WorkCategory, WorkItem, WorkPayload};

use crate::error::DbError;

const COLUMNS: &str = "id, category, identity_key, idempotency_key, payload, state, \
                       attempt_count, max_attempts, enqueued_at, next_attempt_at, \
                       claimed_at, finished_at, last_error";

/// One row of `work_items`.
#[derive(Debug, Clone, FromRow)]
pub struct WorkItemRow {
    pub id: Uuid,
    pub category: String,
    pub identity_key: String,
    pub idempotency_key: String,
    pub payload: Json<WorkPayload>,
    pub state: String,
    pub attempt_count: i32,
    pub max_attempts: i32,
    pub enqueued_at: DateTime<Utc>,
    pub next_attempt_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Per category and state item counts.
#[derive(Debug, Clone, FromRow)]
pub struct WorkItemCount {
    pub category: String,
    pub state: String,
    pub count: i64,
    pub oldest_enqueued_at: Option<DateTime<Utc>>,
}

impl WorkItemRow {
    /// Insert unless an outstanding item has the same idempotency key.
    ///
    /// Returns the new id, or `None` on conflict.
    pub async fn insert_if_absent(pool: &PgPool, item: &WorkItem) -> Result<Option<Uuid>, sqlx::Error> {
        sqlx::query_scalar(
            r"
            INSERT INTO work_items (
                id, category, identity_key, idempotency_key, payload, state,
                attempt_count, max_attempts, enqueued_at, next_attempt_at
            )
            VALUES ($1, $2, $3, $4, $5, 'pending', 0, $6, $7, $8)
            ON CONFLICT (idempotency_key) WHERE state IN ('pending', 'in_progress')
            DO NOTHING
            RETURNING id
            ",
        )
        .bind(item.id)
        .bind(item.category.as_str())
        .bind(&item.identity_key)
        .bind(&item.idempotency_key)
        .bind(Json(&item.payload))
        .bind(clamp_i32(item.max_attempts))
        .bind(item.enqueued_at)
        .bind(item.next_attempt_at)
        .fetch_optional(pool)
        .await
    }

    /// Id of the outstanding item holding an idempotency key.
    pub async fn find_outstanding(
        pool: &PgPool,
        idempotency_key: &str,
    ) -> Result<Option<Uuid>, sqlx::Error> {
        sqlx::query_scalar(
            r"
            SELECT id FROM work_items
            WHERE idempotency_key = $1 AND state IN ('pending', 'in_progress')
            LIMIT 1
            ",
        )
        .bind(idempotency_key)
        .fetch_optional(pool)
        .await
    }

    /// Claim due pending items (with FOR UPDATE SKIP LOCKED).
    ///
    /// Concurrent claimers never receive the same row.
    pub async fn claim_due(
        pool: &PgPool,
        category: Option<WorkCategory>,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as(&format!(
            r"
            WITH due AS (
                SELECT id FROM work_items
                WHERE state = 'pending'
                    AND next_attempt_at <= NOW()
                    AND ($1::varchar IS NULL OR category = $1)
                ORDER BY next_attempt_at ASC, enqueued_at ASC
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            UPDATE work_items w
            SET state = 'in_progress',
                attempt_count = w.attempt_count + 1,
                claimed_at = NOW()
            FROM due
            WHERE w.id = due.id
            RETURNING {}
            ",
            prefixed_columns("w")
        ))
        .bind(category.map(|c| c.as_str()))
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// Lock a row for a state transition inside a transaction.
    pub async fn lock_by_id(conn: &mut PgConnection, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM work_items WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(conn)
        .await
    }

    /// Current state of an item, if it exists.
    pub async fn state_of(pool: &PgPool, id: Uuid) -> Result<Option<String>, sqlx::Error> {
        sqlx::query_scalar("SELECT state FROM work_items WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Mark an in-progress item completed. `false` when it was not in progress.
    pub async fn mark_completed(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r"
            UPDATE work_items
            SET state = 'completed', claimed_at = NULL, last_error = NULL, finished_at = NOW()
            WHERE id = $1 AND state = 'in_progress'
            ",
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Dead-letter an in-progress item. `false` when it was not in progress.
    pub async fn mark_dead_lettered(
        conn: &mut PgConnection,
        id: Uuid,
        error: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r"
            UPDATE work_items
            SET state = 'dead_lettered', claimed_at = NULL, last_error = $2, finished_at = NOW()
            WHERE id = $1 AND state = 'in_progress'
            ",
        )
        .bind(id)
        .bind(error)
        .execute(conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Return an in-progress item to pending, due at `next_attempt_at`.
    pub async fn mark_pending(
        conn: &mut PgConnection,
        id: Uuid,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r"
            UPDATE work_items
            SET state = 'pending', claimed_at = NULL, last_error = $2, next_attempt_at = $3
            WHERE id = $1 AND state = 'in_progress'
            ",
        )
        .bind(id)
        .bind(error)
        .bind(next_attempt_at)
        .execute(conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Return items claimed before `cutoff` to pending.
    pub async fn release_claimed_before(
        pool: &PgPool,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r"
            UPDATE work_items
            SET state = 'pending', claimed_at = NULL
            WHERE state = 'in_progress' AND claimed_at <= $1
            ",
        )
        .bind(cutoff)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Delete completed items that finished at or before `cutoff`.
    pub async fn delete_completed_before(
        pool: &PgPool,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r"
            DELETE FROM work_items
            WHERE state = 'completed' AND finished_at <= $1
            ",
        )
        .bind(cutoff)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Item counts grouped by category and state.
    pub async fn counts(pool: &PgPool) -> Result<Vec<WorkItemCount>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT category, state, COUNT(*) AS count, MIN(enqueued_at) AS oldest_enqueued_at
            FROM work_items
            GROUP BY category, state
            ",
        )
        .fetch_all(pool)
        .await
    }

    /// Dead-lettered items, most recent first.
    pub async fn dead_lettered(
        pool: &PgPool,
        category: Option<WorkCategory>,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as(&format!(
            r"
            SELECT {COLUMNS} FROM work_items
            WHERE state = 'dead_lettered'
                AND ($1::varchar IS NULL OR category = $1)
            ORDER BY finished_at DESC
            LIMIT $2
            "
        ))
        .bind(category.map(|c| c.as_str()))
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// Convert into the domain work item.
    pub fn into_item(self) -> Result<WorkItem, DbError> {
        let id = self.id;
        let invalid = move |e: String| DbError::InvalidData(format!("work item {id}: {e}"));
        let category = self.category.parse::<WorkCategory>().map_err(invalid)?;
        let state = self.state.parse::<ItemState>().map_err(invalid)?;

        Ok(WorkItem {
            id: self.id,
            category,
            identity_key: self.identity_key,
            idempotency_key: self.idempotency_key,
            payload: self.payload.0,
            state,
            attempt_count: u32::try_from(self.attempt_count).unwrap_or(0),
            max_attempts: u32::try_from(self.max_attempts).unwrap_or(1),
            enqueued_at: self.enqueued_at,
            next_attempt_at: self.next_attempt_at,
            claimed_at: self.claimed_at,
            finished_at: self.finished_at,
            last_error: self.last_error,
        })
    }
}

fn prefixed_columns(alias: &str) -> String {
    COLUMNS
        .split(',')
        .map(|c| format!("{alias}.{}", c.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn clamp_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}
