//! At most one reconciliation run in flight.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::ReconciliationResult;

/// Proof of holding the run lock. Dropping it releases the lock.
pub struct RunLease {
    _guard: Box<dyn Any + Send>,
}

impl RunLease {
    /// Wrap whatever keeps the lock held (a mutex guard, a database
    /// connection holding an advisory lock, ...).
    pub fn new(guard: impl Any + Send) -> Self {
        Self {
            _guard: Box::new(guard),
        }
    }
}

impl std::fmt::Debug for RunLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunLease").finish_non_exhaustive()
    }
}

/// Guard against concurrent reconciliation runs.
#[async_trait]
pub trait RunLock: Send + Sync {
    /// Take the lock without waiting. `None` when another run holds it.
    async fn try_acquire(&self) -> ReconciliationResult<Option<RunLease>>;
}

/// Run lock scoped to this process.
#[derive(Debug, Default, Clone)]
pub struct MemoryRunLock {
    inner: Arc<Mutex<()>>,
}

impl MemoryRunLock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunLock for MemoryRunLock {
    async fn try_acquire(&self) -> ReconciliationResult<Option<RunLease>> {
        Ok(self.inner.clone().try_lock_owned().ok().map(RunLease::new))
    }
}
