//! `PostgreSQL` review store.

use async_trait::async_trait;

use entrasync_connector::error::StoreResult;
use entrasync_provisioning::review::{ReviewEntry, ReviewFlag, ReviewStore};

use crate::error::DbError;
use crate::models::ReviewEntryRow;
use crate::pool::DbPool;

/// Orphaned-account review entries in the `review_entries` table.
#[derive(Debug, Clone)]
pub struct PgReviewStore {
    pool: DbPool,
}

impl PgReviewStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReviewStore for PgReviewStore {
    async fn flag(&self, entry: ReviewEntry) -> StoreResult<ReviewFlag> {
        let inserted = ReviewEntryRow::upsert(self.pool.inner(), &entry)
            .await
            .map_err(DbError::query)?;
        Ok(if inserted {
            ReviewFlag::New
        } else {
            ReviewFlag::AlreadyFlagged
        })
    }

    async fn list(&self) -> StoreResult<Vec<ReviewEntry>> {
        let rows = ReviewEntryRow::list(self.pool.inner())
            .await
            .map_err(DbError::query)?;
        Ok(rows.into_iter().map(ReviewEntry::from).collect())
    }
}
