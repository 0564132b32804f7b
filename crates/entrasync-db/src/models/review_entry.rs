//! Review entry model.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};

use entrasync_connector::directory::AttributeValue;
use entrasync_provisioning::review::ReviewEntry;

/// One row of `review_entries`.
#[derive(Debug, Clone, FromRow)]
pub struct ReviewEntryRow {
    pub identity_key: String,
    pub reason: String,
    pub attributes: Json<BTreeMap<String, AttributeValue>>,
    pub first_flagged_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub times_seen: i32,
}

impl ReviewEntryRow {
    /// Insert an entry, or refresh an existing one.
    ///
    /// Returns `true` when the row was newly inserted.
    pub async fn upsert(pool: &PgPool, entry: &ReviewEntry) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar(
            r"
            INSERT INTO review_entries (
                identity_key, reason, attributes, first_flagged_at, last_seen_at, times_seen
            )
            VALUES ($1, $2, $3, $4, $4, 1)
            ON CONFLICT (identity_key) DO UPDATE
            SET reason = EXCLUDED.reason,
                attributes = EXCLUDED.attributes,
                last_seen_at = EXCLUDED.last_seen_at,
                times_seen = review_entries.times_seen + 1
            RETURNING (xmax = 0) AS inserted
            ",
        )
        .bind(&entry.identity_key)
        .bind(&entry.reason)
        .bind(Json(&entry.attributes))
        .bind(entry.last_seen_at)
        .fetch_one(pool)
        .await
    }

    /// Every entry ordered by identity key.
    pub async fn list(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT identity_key, reason, attributes, first_flagged_at, last_seen_at, times_seen
            FROM review_entries
            ORDER BY identity_key
            ",
        )
        .fetch_all(pool)
        .await
    }
}

impl From<ReviewEntryRow> for ReviewEntry {
    fn from(row: ReviewEntryRow) -> Self {
        ReviewEntry {
            identity_key: row.identity_key,
            reason: row.reason,
            attributes: row.attributes.0,
            first_flagged_at: row.first_flagged_at,
            last_seen_at: row.last_seen_at,
            times_seen: u32::try_from(row.times_seen).unwrap_or(0),
        }
    }
}
