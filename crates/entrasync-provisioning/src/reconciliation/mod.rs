//! # Reconciliation
//!
//! Compares the identity provider directory with the local user store and
//! queues follow-up work for every difference.
//!
//! ## Overview
//!
//! A run is sequential: fetch the source, fetch the target, partition both
//! by normalized identity key, dispatch each bucket to its work queue. At
//! most one run is in flight at a time, enforced by a [`RunLock`].
//!
//! ```text
//!  ┌──────────────┐   ┌──────────────┐
//!  │ Entra ID     │   │ Local store  │
//!  └──────┬───────┘   └──────┬───────┘
//!         │ fetch_all        │ fetch_all
//!         ▼                  ▼
//!  ┌─────────────────────────────────┐
//!  │ partition (by identity key)     │
//!  └──┬──────────────┬────────────┬──┘
//!     │ only source  │ both       │ only target
//!     ▼              ▼            ▼
//!  create_local   reconcile    review_orphaned
//!  _user          _common_user _local_user
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use entrasync_provisioning::reconciliation::{ReconciliationRunner, MemoryRunLock};
//!
//! let runner = ReconciliationRunner::new(entra, local, dispatcher, Arc::new(MemoryRunLock::new()));
//! let report = runner.run().await?;
//! println!("{report}");
//! ```

mod engine;
mod lock;
mod report;
mod runner;
mod scheduler;

pub use engine::{
    partition, partition_by, DuplicateKeyError, DuplicateKeyPolicy, MatchedPair,
    PartitionResult, PartitionSummary, Side, SkippedRecord,
};
pub use lock::{MemoryRunLock, RunLease, RunLock};
pub use report::{DirectoryCount, RunReport};
pub use runner::ReconciliationRunner;
pub use scheduler::{ReconciliationScheduler, SyncConfig};

use thiserror::Error;

use entrasync_connector::error::FetchError;

/// Reconciliation errors.
#[derive(Debug, Error)]
pub enum ReconciliationError {
    /// Another run holds the run lock.
    #[error("Reconciliation already running")]
    AlreadyRunning,

    /// A directory could not be read; nothing was dispatched.
    #[error("Fetching the {directory} directory failed: {source}")]
    Fetch {
        directory: String,
        #[source]
        source: FetchError,
    },

    /// Duplicate identity keys under the `reject` policy.
    #[error(transparent)]
    DuplicateKeys(#[from] DuplicateKeyError),

    /// The run lock could not be queried.
    #[error("Run lock error: {0}")]
    Lock(String),
}

impl ReconciliationError {
    /// Check if a later run may succeed without intervention.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::AlreadyRunning | Self::Lock(_) => true,
            Self::Fetch { source, .. } => source.is_retryable(),
            Self::DuplicateKeys(_) => false,
        }
    }
}

/// Result type for reconciliation operations.
pub type ReconciliationResult<T> = Result<T, ReconciliationError>;
