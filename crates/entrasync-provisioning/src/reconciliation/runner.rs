//! One full reconciliation pass: fetch, partition, dispatch.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use entrasync_connector::directory::DirectoryUser;
use entrasync_connector::traits::DirectorySource;

use crate::dispatch::Dispatcher;

use super::{
    partition, DirectoryCount, DuplicateKeyPolicy, ReconciliationError, ReconciliationResult,
    RunLock, RunReport,
};

/// Runs reconciliation between an identity provider (source) and the local
/// user store (target).
pub struct ReconciliationRunner {
    source: Arc<dyn DirectorySource>,
    target: Arc<dyn DirectorySource>,
    dispatcher: Dispatcher,
    lock: Arc<dyn RunLock>,
    policy: DuplicateKeyPolicy,
}

impl ReconciliationRunner {
    pub fn new(
        source: Arc<dyn DirectorySource>,
        target: Arc<dyn DirectorySource>,
        dispatcher: Dispatcher,
        lock: Arc<dyn RunLock>,
    ) -> Self {
        Self {
            source,
            target,
            dispatcher,
            lock,
            policy: DuplicateKeyPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_duplicate_policy(mut self, policy: DuplicateKeyPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Fetch both directories, partition them and dispatch the differences.
    ///
    /// A fetch failure aborts the run before anything is enqueued. Enqueue
    /// failures do not fail the run; they are listed in the report.
    #[instrument(skip(self), fields(source = self.source.name(), target = self.target.name()))]
    pub async fn run(&self) -> ReconciliationResult<RunReport> {
        let Some(_lease) = self.lock.try_acquire().await? else {
            return Err(ReconciliationError::AlreadyRunning);
        };

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let start = Instant::now();
        info!(%run_id, policy = %self.policy, "Starting reconciliation run");

        let source_users = self.fetch(self.source.as_ref()).await?;
        let target_users = self.fetch(self.target.as_ref()).await?;
        let source = DirectoryCount {
            name: self.source.name().to_string(),
            fetched: source_users.len(),
        };
        let target = DirectoryCount {
            name: self.target.name().to_string(),
            fetched: target_users.len(),
        };

        let partition = partition(source_users, target_users, self.policy)?;
        for record in &partition.superseded {
            warn!(
                side = %record.side,
                identity_key = record.user.identity_key(),
                "Duplicate identity key, earlier record superseded"
            );
        }
        for record in &partition.rejected {
            warn!(side = %record.side, "Record with blank identity key rejected");
        }
        let summary = partition.summary();
        info!(
            only_in_source = summary.only_in_source,
            only_in_target = summary.only_in_target,
            in_both = summary.in_both,
            "Partitioned directories"
        );

        let dispatch = self.dispatcher.dispatch(&partition).await;

        let report = RunReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            duration_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            source,
            target,
            partition: summary,
            dispatch,
        };
        info!(
            %run_id,
            duration_ms = report.duration_ms,
            success = report.is_success(),
            "Reconciliation run finished"
        );
        Ok(report)
    }

    async fn fetch(&self, directory: &dyn DirectorySource) -> ReconciliationResult<Vec<DirectoryUser>> {
        let users = directory
            .fetch_all()
            .await
            .map_err(|source| ReconciliationError::Fetch {
                directory: directory.name().to_string(),
                source,
            })?;
        info!(directory = directory.name(), count = users.len(), "Fetched users");
        Ok(users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_queue::MemoryWorkQueue;
    use crate::queue::WorkCategory;
    use crate::reconciliation::MemoryRunLock;
    use async_trait::async_trait;
    use entrasync_connector::error::{FetchError, FetchResult};

    struct StaticDirectory {
        name: &'static str,
        result: Result<Vec<&'static str>, ()>,
    }

    #[async_trait]
    impl DirectorySource for StaticDirectory {
        fn name(&self) -> &str {
            self.name
        }

        async fn fetch_all(&self) -> FetchResult<Vec<DirectoryUser>> {
            match &self.result {
                Ok(keys) => Ok(keys.iter().map(|k| DirectoryUser::new(*k)).collect()),
                Err(()) => Err(FetchError::Transport("connection reset".into())),
            }
        }
    }

    fn directory(name: &'static str, keys: &[&'static str]) -> Arc<dyn DirectorySource> {
        Arc::new(StaticDirectory {
            name,
            result: Ok(keys.to_vec()),
        })
    }

    fn failing(name: &'static str) -> Arc<dyn DirectorySource> {
        Arc::new(StaticDirectory { name, result: Err(()) })
    }

    fn runner(
        source: Arc<dyn DirectorySource>,
        target: Arc<dyn DirectorySource>,
        queue: Arc<MemoryWorkQueue>,
        lock: Arc<dyn RunLock>,
    ) -> ReconciliationRunner {
        ReconciliationRunner::new(source, target, Dispatcher::new(queue, 3), lock)
    }

    #[tokio::test]
    async fn test_run_dispatches_differences() {
        let queue = Arc::new(MemoryWorkQueue::default());
        let runner = runner(
            directory("entra", &["a@x.com", "b@x.com"]),
            directory("local", &["b@x.com", "c@x.com"]),
            queue.clone(),
            Arc::new(MemoryRunLock::new()),
        );

        let report = runner.run().await.unwrap();

        assert!(report.is_success());
        assert_eq!(report.source.fetched, 2);
        assert_eq!(report.target.name, "local");
        assert_eq!(report.partition.in_both, 1);
        assert_eq!(report.dispatch.category(WorkCategory::CreateLocalUser).enqueued, 1);
        assert_eq!(queue.items().await.len(), 3);
    }

    #[tokio::test]
    async fn test_fetch_failure_enqueues_nothing() {
        let queue = Arc::new(MemoryWorkQueue::default());
        let runner = runner(
            directory("entra", &["a@x.com"]),
            failing("local"),
            queue.clone(),
            Arc::new(MemoryRunLock::new()),
        );

        let err = runner.run().await.unwrap_err();

        assert!(matches!(err, ReconciliationError::Fetch { ref directory, .. } if directory == "local"));
        assert!(err.is_retryable());
        assert!(queue.items().await.is_empty());
    }

    #[tokio::test]
    async fn test_reject_policy_aborts_before_dispatch() {
        let queue = Arc::new(MemoryWorkQueue::default());
        let runner = runner(
            directory("entra", &["a@x.com", "A@X.com"]),
            directory("local", &[]),
            queue.clone(),
            Arc::new(MemoryRunLock::new()),
        )
        .with_duplicate_policy(DuplicateKeyPolicy::Reject);

        let err = runner.run().await.unwrap_err();

        assert!(matches!(err, ReconciliationError::DuplicateKeys(_)));
        assert!(queue.items().await.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_run_is_refused() {
        let lock = Arc::new(MemoryRunLock::new());
        let runner = runner(
            directory("entra", &[]),
            directory("local", &[]),
            Arc::new(MemoryWorkQueue::default()),
            lock.clone(),
        );

        let _held = lock.try_acquire().await.unwrap().unwrap();
        let err = runner.run().await.unwrap_err();
        assert!(matches!(err, ReconciliationError::AlreadyRunning));
    }

    #[tokio::test]
    async fn test_lock_released_after_run() {
        let lock = Arc::new(MemoryRunLock::new());
        let runner = runner(
            directory("entra", &[]),
            directory("local", &[]),
            Arc::new(MemoryWorkQueue::default()),
            lock.clone(),
        );

        runner.run().await.unwrap();
        runner.run().await.unwrap();
        assert!(lock.try_acquire().await.unwrap().is_some());
    }
}
