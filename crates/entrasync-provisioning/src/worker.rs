//! Queue Worker
//!
//! Claims work items and runs them through the processor router. Two modes:
//! [`QueueWorker::drain`] processes until the queues are empty or a time
//! budget runs out, [`QueueWorker::run`] polls until shutdown is requested.
//! Both release stale claims, bound concurrency with a semaphore, and turn
//! processor failures into retries or dead-letters.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use crate::processor::{ProcessOutcome, ProcessorRouter};
use crate::queue::{QueueResult, RetryOutcome, WorkCategory, WorkItem, WorkQueue};
use crate::shutdown::Shutdown;

/// Worker configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Number of items processed concurrently.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// How often to poll the queue (in milliseconds).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Maximum items claimed per poll.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Time budget of one drain (in seconds).
    #[serde(default = "default_drain_budget_secs")]
    pub drain_budget_secs: u64,

    /// Claims older than this are returned to pending (in seconds).
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,

    /// Completed items are deleted this long after finishing (in seconds).
    #[serde(default = "default_completed_retention_secs")]
    pub completed_retention_secs: u64,
}

fn default_concurrency() -> usize {
    4
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_batch_size() -> usize {
    10
}

fn default_drain_budget_secs() -> u64 {
    60
}

fn default_stale_after_secs() -> u64 {
    300
}

fn default_completed_retention_secs() -> u64 {
    3600
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            poll_interval_ms: default_poll_interval_ms(),
            batch_size: default_batch_size(),
            drain_budget_secs: default_drain_budget_secs(),
            stale_after_secs: default_stale_after_secs(),
            completed_retention_secs: default_completed_retention_secs(),
        }
    }
}

impl WorkerConfig {
    fn permits(&self) -> usize {
        self.concurrency.max(1)
    }
}

/// What happened to one processed item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    Completed(ProcessOutcome),
    /// Handed back to the queue for a later attempt.
    Retried,
    DeadLettered,
    /// The result could not be written back; the claim is left for stale
    /// release.
    Unrecorded,
}

/// Outcome counts for one category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CategoryOutcomes {
    pub completed: u64,
    pub retried: u64,
    pub dead_lettered: u64,
    pub unrecorded: u64,
}

/// Summary of one drain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub categories: BTreeMap<WorkCategory, CategoryOutcomes>,
    /// Stale claims released before processing.
    pub released_stale: u64,
    /// Completed items deleted after processing.
    pub purged_completed: u64,
    /// Whether the drain stopped because its time budget ran out.
    pub budget_exhausted: bool,
    pub duration_ms: u64,
}

impl Default for DrainReport {
    fn default() -> Self {
        Self {
            categories: WorkCategory::ALL
                .into_iter()
                .map(|c| (c, CategoryOutcomes::default()))
                .collect(),
            released_stale: 0,
            purged_completed: 0,
            budget_exhausted: false,
            duration_ms: 0,
        }
    }
}

impl DrainReport {
    pub fn record(&mut self, category: WorkCategory, outcome: ItemOutcome) {
        let entry = self.categories.entry(category).or_default();
        match outcome {
            ItemOutcome::Completed(_) => entry.completed += 1,
            ItemOutcome::Retried => entry.retried += 1,
            ItemOutcome::DeadLettered => entry.dead_lettered += 1,
            ItemOutcome::Unrecorded => entry.unrecorded += 1,
        }
    }

    #[must_use]
    pub fn category(&self, category: WorkCategory) -> CategoryOutcomes {
        self.categories.get(&category).copied().unwrap_or_default()
    }

    #[must_use]
    pub fn processed(&self) -> u64 {
        self.categories
            .values()
            .map(|c| c.completed + c.retried + c.dead_lettered + c.unrecorded)
            .sum()
    }

    #[must_use]
    pub fn total_completed(&self) -> u64 {
        self.categories.values().map(|c| c.completed).sum()
    }

    #[must_use]
    pub fn total_dead_lettered(&self) -> u64 {
        self.categories.values().map(|c| c.dead_lettered).sum()
    }
}

/// Worker that processes the work queues.
pub struct QueueWorker {
    queue: Arc<dyn WorkQueue>,
    router: Arc<ProcessorRouter>,
    config: WorkerConfig,
    shutdown: Arc<Shutdown>,
}

impl QueueWorker {
    /// Create a new worker.
    pub fn new(queue: Arc<dyn WorkQueue>, router: Arc<ProcessorRouter>, config: WorkerConfig) -> Self {
        Self {
            queue,
            router,
            config,
            shutdown: Arc::new(Shutdown::new()),
        }
    }

    /// Share a shutdown signal with other components.
    #[must_use]
    pub fn with_shutdown(mut self, shutdown: Arc<Shutdown>) -> Self {
        self.shutdown = shutdown;
        self
    }

    #[must_use]
    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Request graceful shutdown.
    pub fn shutdown(&self) {
        info!("Shutdown requested");
        self.shutdown.trigger();
    }

    /// Check if shutdown was requested.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_triggered()
    }

    /// Process due items until none are left, the budget runs out or
    /// shutdown is requested.
    ///
    /// The budget is checked between batches, so a drain can overrun it by
    /// the time one batch takes.
    #[instrument(skip(self), fields(budget_secs = self.config.drain_budget_secs))]
    pub async fn drain(&self) -> QueueResult<DrainReport> {
        let start = Instant::now();
        let budget = Duration::from_secs(self.config.drain_budget_secs);
        let semaphore = Arc::new(Semaphore::new(self.config.permits()));
        let mut report = DrainReport {
            released_stale: self.queue.release_stale(self.config.stale_after_secs).await?,
            ..DrainReport::default()
        };

        loop {
            if start.elapsed() >= budget {
                report.budget_exhausted = true;
                break;
            }
            if self.shutdown.is_triggered() {
                break;
            }

            let items = self.queue.claim(None, self.config.batch_size.max(1)).await?;
            if items.is_empty() {
                break;
            }
            debug!(count = items.len(), "Claimed work items");

            let mut tasks = JoinSet::new();
            for item in items {
                let Ok(permit) = semaphore.clone().acquire_owned().await else {
                    break;
                };
                let queue = self.queue.clone();
                let router = self.router.clone();
                tasks.spawn(async move {
                    let _permit = permit;
                    let category = item.category;
                    (category, process_item(queue, router, item).await)
                });
            }

            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((category, outcome)) => report.record(category, outcome),
                    Err(e) => error!(error = %e, "Work item task failed"),
                }
            }
        }

        report.purged_completed = self
            .queue
            .purge_completed(self.config.completed_retention_secs)
            .await?;
        report.duration_ms = elapsed_ms(start);
        info!(
            processed = report.processed(),
            completed = report.total_completed(),
            dead_lettered = report.total_dead_lettered(),
            released_stale = report.released_stale,
            purged_completed = report.purged_completed,
            budget_exhausted = report.budget_exhausted,
            "Drain finished"
        );
        Ok(report)
    }

    /// Poll the queues until shutdown is requested.
    #[instrument(skip(self))]
    pub async fn run(&self) {
        info!(
            concurrency = self.config.concurrency,
            poll_interval_ms = self.config.poll_interval_ms,
            "Starting queue worker"
        );

        let permits = self.config.permits();
        let semaphore = Arc::new(Semaphore::new(permits));
        let mut poll_interval = interval(Duration::from_millis(self.config.poll_interval_ms.max(1)));
        poll_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut stale_interval = interval(Duration::from_secs(self.config.stale_after_secs.max(1)));
        stale_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = self.shutdown.wait() => {
                    info!("Worker shutdown requested, stopping poll loop");
                    break;
                }
                _ = poll_interval.tick() => {
                    self.poll_and_process(&semaphore).await;
                }
                _ = stale_interval.tick() => {
                    self.release_stale_items().await;
                    self.purge_completed_items().await;
                }
            }
        }

        // Wait for in-flight items to complete
        info!("Waiting for in-flight work items to complete...");
        let _ = semaphore
            .acquire_many(u32::try_from(permits).unwrap_or(u32::MAX))
            .await;
        info!("Worker stopped");
    }

    /// Claim as many items as there are free slots and process them in
    /// background tasks.
    async fn poll_and_process(&self, semaphore: &Arc<Semaphore>) {
        let free = semaphore.available_permits().min(self.config.batch_size);
        if free == 0 {
            debug!("All worker slots busy");
            return;
        }

        let items = match self.queue.claim(None, free).await {
            Ok(items) => items,
            Err(e) => {
                error!(error = %e, "Failed to claim work items");
                return;
            }
        };
        if items.is_empty() {
            return;
        }
        debug!(count = items.len(), "Claimed work items for processing");

        for item in items {
            // Only this loop takes permits, so one is free for every claimed item.
            let Ok(permit) = semaphore.clone().try_acquire_owned() else {
                warn!(item_id = %item.id, "No worker slot free, item left for stale release");
                continue;
            };

            let queue = self.queue.clone();
            let router = self.router.clone();
            tokio::spawn(async move {
                let _permit = permit;
                process_item(queue, router, item).await;
            });
        }
    }

    async fn release_stale_items(&self) {
        match self.queue.release_stale(self.config.stale_after_secs).await {
            Ok(count) if count > 0 => {
                warn!(count = count, "Released stale work items");
            }
            Ok(_) => {}
            Err(e) => {
                error!(error = %e, "Failed to release stale work items");
            }
        }
    }

    async fn purge_completed_items(&self) {
        match self
            .queue
            .purge_completed(self.config.completed_retention_secs)
            .await
        {
            Ok(count) if count > 0 => debug!(count, "Purged completed work items"),
            Ok(_) => {}
            Err(e) => error!(error = %e, "Failed to purge completed work items"),
        }
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Process a single item and record the result on the queue.
#[instrument(skip(queue, router, item), fields(
    item_id = %item.id,
    category = %item.category,
    identity_key = %item.identity_key,
    attempt = item.attempt_count,
))]
async fn process_item(
    queue: Arc<dyn WorkQueue>,
    router: Arc<ProcessorRouter>,
    item: WorkItem,
) -> ItemOutcome {
    let start = Instant::now();
    let result = router.process(&item).await;
    let duration_ms = elapsed_ms(start);

    match result {
        Ok(outcome) => {
            info!(duration_ms, outcome = %outcome, "Work item completed");
            if let Err(e) = queue.complete(item.id).await {
                error!(error = %e, "Failed to mark work item as complete");
            }
            ItemOutcome::Completed(outcome)
        }
        Err(e) if e.is_retryable() => {
            warn!(
                duration_ms,
                error = %e,
                max_attempts = item.max_attempts,
                "Work item failed, scheduling retry"
            );
            match queue.retry(item.id, &e.to_string()).await {
                Ok(RetryOutcome::Scheduled { next_attempt_at }) => {
                    debug!(%next_attempt_at, "Retry scheduled");
                    ItemOutcome::Retried
                }
                Ok(RetryOutcome::DeadLettered) => {
                    error!(error = %e, "Work item out of attempts, dead-lettered");
                    ItemOutcome::DeadLettered
                }
                Err(qe) => {
                    error!(error = %qe, "Retry not scheduled, item left for stale release");
                    ItemOutcome::Unrecorded
                }
            }
        }
        Err(e) => {
            error!(duration_ms, error = %e, "Work item failed permanently, dead-lettering");
            match queue.dead_letter(item.id, &e.to_string()).await {
                Ok(()) => ItemOutcome::DeadLettered,
                Err(qe) => {
                    error!(error = %qe, "Failed to move work item to dead letter");
                    ItemOutcome::Unrecorded
                }
            }
        }
    }
}
