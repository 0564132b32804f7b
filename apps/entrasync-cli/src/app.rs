//! Component wiring shared by the commands.

use std::sync::Arc;

use tracing::info;

use entrasync_connector::local::LocalDirectory;
use entrasync_connector::memory::{InMemoryUserStore, LoggingNotifier};
use entrasync_connector::traits::{DirectorySource, LocalUserStore};
use entrasync_connector_entra::EntraDirectory;
use entrasync_db::{DbPool, PgReviewStore, PgRunLock, PgUserStore, PgWorkQueue};
use entrasync_provisioning::reconciliation::{MemoryRunLock, ReconciliationRunner, RunLock};
use entrasync_provisioning::review::{MemoryReviewStore, ReviewStore};
use entrasync_provisioning::{
    CommonUserProcessor, CreateLocalUserProcessor, Dispatcher, MemoryWorkQueue,
    OrphanReviewProcessor, ProcessorRouter, QueueWorker, Shutdown, WorkQueue,
};

use crate::config::{Backend, Config};
use crate::error::CliResult;

/// Storage behind the local store, the queue, the review list and the run lock.
pub struct Backends {
    pub store: Arc<dyn LocalUserStore>,
    pub queue: Arc<dyn WorkQueue>,
    pub reviews: Arc<dyn ReviewStore>,
    pub run_lock: Arc<dyn RunLock>,
    pub pool: Option<DbPool>,
}

impl Backends {
    /// Open the configured backend.
    pub async fn open(config: &Config) -> CliResult<Self> {
        match config.local.backend {
            Backend::Memory => Ok(Self::memory(config)),
            Backend::Postgres => Self::postgres(config).await,
        }
    }

    /// Everything in process memory.
    #[must_use]
    pub fn memory(config: &Config) -> Self {
        info!("Using in-memory backend");
        Self {
            store: Arc::new(InMemoryUserStore::new(config.local.fields.clone())),
            queue: Arc::new(MemoryWorkQueue::new(config.queue.clone())),
            reviews: Arc::new(MemoryReviewStore::new()),
            run_lock: Arc::new(MemoryRunLock::new()),
            pool: None,
        }
    }

    async fn postgres(config: &Config) -> CliResult<Self> {
        let pool = DbPool::connect(config.database_url()?).await?;
        info!("Using postgres backend");
        Ok(Self::from_pool(config, pool))
    }

    /// PostgreSQL tables through an existing pool.
    #[must_use]
    pub fn from_pool(config: &Config, pool: DbPool) -> Self {
        Self {
            store: Arc::new(PgUserStore::new(pool.clone(), config.local.fields.clone())),
            queue: Arc::new(PgWorkQueue::new(pool.clone(), config.queue.clone())),
            reviews: Arc::new(PgReviewStore::new(pool.clone())),
            run_lock: Arc::new(PgRunLock::new(pool.clone())),
            pool: Some(pool),
        }
    }

    /// Whether queued work outlives the process.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        self.pool.is_some()
    }

    pub async fn close(self) {
        if let Some(pool) = self.pool {
            pool.close().await;
        }
    }
}

/// Microsoft Graph directory, selecting every attribute the mapping reads.
pub fn entra_directory(config: &Config) -> CliResult<Arc<EntraDirectory>> {
    let directory = EntraDirectory::new(config.entra.connection.clone(), config.credentials()?)?
        .with_select_fields(config.mapping.source_fields());
    Ok(Arc::new(directory))
}

/// The local store viewed as a directory.
#[must_use]
pub fn local_directory(config: &Config, backends: &Backends) -> Arc<LocalDirectory> {
    Arc::new(LocalDirectory::new(
        backends.store.clone(),
        config.local.identity_field,
        config.local.excluded_names.clone(),
    ))
}

/// Runner comparing `source` with the local store.
#[must_use]
pub fn runner(
    config: &Config,
    source: Arc<dyn DirectorySource>,
    backends: &Backends,
) -> ReconciliationRunner {
    ReconciliationRunner::new(
        source,
        local_directory(config, backends),
        Dispatcher::new(backends.queue.clone(), config.queue.max_attempts),
        backends.run_lock.clone(),
    )
    .with_duplicate_policy(config.sync.duplicate_policy)
}

/// One processor per work category.
#[must_use]
pub fn router(config: &Config, backends: &Backends) -> ProcessorRouter {
    ProcessorRouter::new()
        .with(Arc::new(CreateLocalUserProcessor::new(
            config.mapping.clone(),
            backends.store.clone(),
            Arc::new(LoggingNotifier),
        )))
        .with(Arc::new(OrphanReviewProcessor::new(backends.reviews.clone())))
        .with(Arc::new(CommonUserProcessor::default()))
}

/// Worker over the backend queue.
#[must_use]
pub fn worker(config: &Config, backends: &Backends, shutdown: Arc<Shutdown>) -> QueueWorker {
    QueueWorker::new(
        backends.queue.clone(),
        Arc::new(router(config, backends)),
        config.worker.clone(),
    )
    .with_shutdown(shutdown)
}
