//! Cluster-wide run lock on a `PostgreSQL` advisory lock.

use async_trait::async_trait;
use sqlx::{Connection, PgConnection};
use tracing::debug;

use entrasync_provisioning::reconciliation::{ReconciliationResult, RunLease, RunLock};

use crate::error::DbError;
use crate::pool::DbPool;

/// Advisory lock key for reconciliation runs ("entrasyn" in ASCII).
pub const RUN_LOCK_KEY: i64 = 0x656e_7472_6173_796e;

/// Run lock shared by every process using the same database.
///
/// Advisory locks belong to a session, so the lease owns a connection
/// detached from the pool. Dropping the lease closes that connection and
/// the server releases the lock.
#[derive(Debug, Clone)]
pub struct PgRunLock {
    pool: DbPool,
    key: i64,
}

/// Session holding the advisory lock.
struct AdvisoryLockSession {
    _conn: PgConnection,
}

impl PgRunLock {
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            key: RUN_LOCK_KEY,
        }
    }

    /// Use a different lock key, e.g. to run two deployments on one database.
    #[must_use]
    pub fn with_key(mut self, key: i64) -> Self {
        self.key = key;
        self
    }
}

#[async_trait]
impl RunLock for PgRunLock {
    async fn try_acquire(&self) -> ReconciliationResult<Option<RunLease>> {
        let mut conn = self
            .pool
            .inner()
            .acquire()
            .await
            .map_err(DbError::query)?
            .detach();

        let acquired: bool = sqlx::query_scalar("SELECT pg_try_advisory_lock($1)")
            .bind(self.key)
            .fetch_one(&mut conn)
            .await
            .map_err(DbError::query)?;

        if acquired {
            debug!(lock_key = self.key, "Acquired run lock");
            Ok(Some(RunLease::new(AdvisoryLockSession { _conn: conn })))
        } else {
            debug!(lock_key = self.key, "Run lock already held by another process");
            if let Err(e) = conn.close().await {
                debug!(error = %e, "Closing lock probe connection failed");
            }
            Ok(None)
        }
    }
}
