//! Error types for the entrasync-db crate.
//!
//! Wraps `SQLx` errors with a transient/permanent classification and maps
//! them onto the error types of the traits this crate implements.

use thiserror::Error;

use entrasync_connector::error::StoreError;
use entrasync_provisioning::queue::QueueError;
use entrasync_provisioning::reconciliation::ReconciliationError;

/// `SQLSTATE` codes worth repeating the statement for.
const TRANSIENT_SQLSTATES: &[&str] = &[
    "40001", // serialization_failure
    "40P01", // deadlock_detected
    "53300", // too_many_connections
    "55P03", // lock_not_available
    "57P01", // admin_shutdown
    "57P03", // cannot_connect_now
];

/// `SQLSTATE` for a violated CHECK constraint.
const CHECK_VIOLATION: &str = "23514";

/// Database operation errors.
///
/// # Example
///
/// ```rust
/// use entrasync_db::DbError;
///
/// fn handle_error(err: DbError) {
///     match err {
///         DbError::ConnectionFailed(e) => eprintln!("Cannot connect: {}", e),
///         DbError::MigrationFailed(e) => eprintln!("Migration error: {}", e),
///         DbError::QueryFailed(e) => eprintln!("Query error: {}", e),
///         DbError::NotFound(msg) => eprintln!("Not found: {}", msg),
///         DbError::ValidationFailed(msg) => eprintln!("Validation: {}", msg),
///         DbError::InvalidData(msg) => eprintln!("Bad row: {}", msg),
///     }
/// }
/// ```
#[derive(Debug, Error)]
pub enum DbError {
    /// Failed to establish or acquire a database connection.
    #[error("Database connection failed: {0}")]
    ConnectionFailed(#[source] sqlx::Error),

    /// A database migration failed to apply.
    #[error("Migration failed: {0}")]
    MigrationFailed(#[source] sqlx::migrate::MigrateError),

    /// A database query failed to execute.
    #[error("Query failed: {0}")]
    QueryFailed(#[source] sqlx::Error),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Validation failed.
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// A stored row could not be decoded into its domain type.
    #[error("Invalid stored data: {0}")]
    InvalidData(String),
}

impl DbError {
    /// Classify a `SQLx` error from a query.
    ///
    /// Pool and socket failures become [`DbError::ConnectionFailed`];
    /// everything else is a [`DbError::QueryFailed`].
    #[must_use]
    pub fn query(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => DbError::ConnectionFailed(err),
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                DbError::InvalidData(err.to_string())
            }
            other => DbError::QueryFailed(other),
        }
    }

    /// Check if this error indicates a connection problem.
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(self, DbError::ConnectionFailed(_))
    }

    /// Check if this error indicates a migration problem.
    #[must_use]
    pub fn is_migration_error(&self) -> bool {
        matches!(self, DbError::MigrationFailed(_))
    }

    /// Check if this error indicates a query problem.
    #[must_use]
    pub fn is_query_error(&self) -> bool {
        matches!(self, DbError::QueryFailed(_))
    }

    /// Check if this error indicates a not found error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, DbError::NotFound(_))
    }

    /// Check if this error indicates a validation error.
    #[must_use]
    pub fn is_validation_failed(&self) -> bool {
        matches!(self, DbError::ValidationFailed(_))
            || self.sqlstate().as_deref() == Some(CHECK_VIOLATION)
    }

    /// Check if repeating the operation may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            DbError::ConnectionFailed(_) => true,
            DbError::QueryFailed(_) => self
                .sqlstate()
                .is_some_and(|code| TRANSIENT_SQLSTATES.contains(&code.as_str())),
            _ => false,
        }
    }

    fn sqlstate(&self) -> Option<String> {
        match self {
            DbError::QueryFailed(sqlx::Error::Database(db)) => db.code().map(|c| c.into_owned()),
            _ => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        if err.is_transient() {
            StoreError::Transient(err.to_string())
        } else if err.is_validation_failed() {
            StoreError::Validation(err.to_string())
        } else {
            StoreError::Backend(err.to_string())
        }
    }
}

impl From<DbError> for QueueError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::InvalidData(msg) => QueueError::InvalidData(msg),
            other => QueueError::Unavailable(other.to_string()),
        }
    }
}

impl From<DbError> for ReconciliationError {
    fn from(err: DbError) -> Self {
        ReconciliationError::Lock(err.to_string())
    }
}
