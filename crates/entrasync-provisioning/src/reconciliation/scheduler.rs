//! Interval-triggered reconciliation runs.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

use crate::shutdown::Shutdown;

use super::{DuplicateKeyPolicy, ReconciliationError, ReconciliationRunner, RunReport};

/// The `sync:` configuration section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Whether the scheduler triggers runs on its own.
    #[serde(default)]
    pub cron_enabled: bool,

    /// Seconds between scheduled runs.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    #[serde(default)]
    pub duplicate_policy: DuplicateKeyPolicy,
}

fn default_interval_secs() -> u64 {
    3600
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            cron_enabled: false,
            interval_secs: default_interval_secs(),
            duplicate_policy: DuplicateKeyPolicy::default(),
        }
    }
}

/// Triggers a reconciliation run every `interval_secs` while enabled.
///
/// The first run starts immediately. A tick that finds a run still in
/// flight is skipped.
pub struct ReconciliationScheduler {
    runner: Arc<ReconciliationRunner>,
    config: SyncConfig,
    shutdown: Arc<Shutdown>,
}

impl ReconciliationScheduler {
    pub fn new(runner: Arc<ReconciliationRunner>, config: SyncConfig, shutdown: Arc<Shutdown>) -> Self {
        Self {
            runner,
            config,
            shutdown,
        }
    }

    /// Run until shutdown. Returns the number of completed runs.
    pub async fn run(&self) -> u64 {
        if !self.config.cron_enabled {
            info!("Scheduled reconciliation disabled");
            return 0;
        }

        info!(interval_secs = self.config.interval_secs, "Starting reconciliation scheduler");
        let mut ticker = interval(Duration::from_secs(self.config.interval_secs.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut completed = 0;

        loop {
            tokio::select! {
                () = self.shutdown.wait() => {
                    info!("Scheduler shutdown requested");
                    break;
                }
                _ = ticker.tick() => {
                    if self.trigger().await.is_some() {
                        completed += 1;
                    }
                }
            }
        }
        completed
    }

    /// Run reconciliation once, logging instead of returning errors.
    pub async fn trigger(&self) -> Option<RunReport> {
        match self.runner.run().await {
            Ok(report) => Some(report),
            Err(ReconciliationError::AlreadyRunning) => {
                info!("Reconciliation already running, skipping scheduled run");
                None
            }
            Err(e) => {
                error!(error = %e, retryable = e.is_retryable(), "Scheduled reconciliation failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::Dispatcher;
    use crate::memory_queue::MemoryWorkQueue;
    use crate::reconciliation::{MemoryRunLock, RunLock};
    use entrasync_connector::account::LocalIdentityField;
    use entrasync_connector::local::LocalDirectory;
    use entrasync_connector::mapping::LocalFieldSchema;
    use entrasync_connector::memory::InMemoryUserStore;

    fn runner(lock: Arc<MemoryRunLock>) -> Arc<ReconciliationRunner> {
        let store = Arc::new(InMemoryUserStore::new(LocalFieldSchema::default()));
        let local = Arc::new(LocalDirectory::new(store, LocalIdentityField::Mail, Vec::new()));
        let queue = Arc::new(MemoryWorkQueue::default());
        Arc::new(ReconciliationRunner::new(
            local.clone(),
            local,
            Dispatcher::new(queue, 3),
            lock,
        ))
    }

    #[test]
    fn test_sync_config_defaults() {
        let config: SyncConfig = serde_json::from_str("{}").unwrap();
        assert!(!config.cron_enabled);
        assert_eq!(config.interval_secs, 3600);
        assert_eq!(config.duplicate_policy, DuplicateKeyPolicy::LastWins);
    }

    #[tokio::test]
    async fn test_disabled_scheduler_returns_immediately() {
        let scheduler = ReconciliationScheduler::new(
            runner(Arc::new(MemoryRunLock::new())),
            SyncConfig::default(),
            Arc::new(Shutdown::new()),
        );
        let runs = tokio::time::timeout(Duration::from_millis(100), scheduler.run())
            .await
            .unwrap();
        assert_eq!(runs, 0);
    }

    #[tokio::test]
    async fn test_enabled_scheduler_runs_until_shutdown() {
        let shutdown = Arc::new(Shutdown::new());
        let scheduler = Arc::new(ReconciliationScheduler::new(
            runner(Arc::new(MemoryRunLock::new())),
            SyncConfig {
                cron_enabled: true,
                interval_secs: 3600,
                ..SyncConfig::default()
            },
            shutdown.clone(),
        ));

        let handle = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.run().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.trigger();

        let runs = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(runs, 1);
    }

    #[tokio::test]
    async fn test_trigger_skips_while_running() {
        let lock = Arc::new(MemoryRunLock::new());
        let scheduler = ReconciliationScheduler::new(
            runner(lock.clone()),
            SyncConfig::default(),
            Arc::new(Shutdown::new()),
        );

        let _held = lock.try_acquire().await.unwrap().unwrap();
        assert!(scheduler.trigger().await.is_none());
    }
}
