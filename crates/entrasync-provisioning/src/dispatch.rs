//! Dispatch of partition buckets onto the work queues.
//!
//! `only_in_source` records become [`WorkCategory::CreateLocalUser`] items,
//! `only_in_target` records become [`WorkCategory::ReviewOrphanedLocalUser`]
//! items and matched pairs become [`WorkCategory::ReconcileCommonUser`]
//! items. A failed enqueue is recorded and the remaining records are still
//! attempted; nothing is retried within the same run.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::queue::{EnqueueOutcome, WorkCategory, WorkItem, WorkPayload, WorkQueue};
use crate::reconciliation::PartitionResult;

/// A record that could not be enqueued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("Failed to enqueue {category} item for {identity_key}: {message}")]
pub struct DispatchError {
    pub category: WorkCategory,
    pub identity_key: String,
    pub message: String,
    /// Whether a later dispatch may succeed.
    pub retryable: bool,
}

/// Enqueue counts for one category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CategoryDispatch {
    pub enqueued: usize,
    /// Records whose item was already pending or in progress.
    pub duplicates: usize,
    pub failed: usize,
}

/// What one dispatch did, per category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub categories: BTreeMap<WorkCategory, CategoryDispatch>,
    pub errors: Vec<DispatchError>,
}

impl Default for DispatchReport {
    fn default() -> Self {
        Self {
            categories: WorkCategory::ALL
                .into_iter()
                .map(|c| (c, CategoryDispatch::default()))
                .collect(),
            errors: Vec::new(),
        }
    }
}

impl DispatchReport {
    #[must_use]
    pub fn category(&self, category: WorkCategory) -> CategoryDispatch {
        self.categories.get(&category).copied().unwrap_or_default()
    }

    #[must_use]
    pub fn total_enqueued(&self) -> usize {
        self.categories.values().map(|c| c.enqueued).sum()
    }

    #[must_use]
    pub fn total_duplicates(&self) -> usize {
        self.categories.values().map(|c| c.duplicates).sum()
    }

    #[must_use]
    pub fn total_failed(&self) -> usize {
        self.categories.values().map(|c| c.failed).sum()
    }

    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.errors.is_empty()
    }

    fn entry(&mut self, category: WorkCategory) -> &mut CategoryDispatch {
        self.categories.entry(category).or_default()
    }
}

/// Turns a partition into work items.
#[derive(Clone)]
pub struct Dispatcher {
    queue: Arc<dyn WorkQueue>,
    max_attempts: u32,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Items are created allowing `max_attempts` attempts each.
    pub fn new(queue: Arc<dyn WorkQueue>, max_attempts: u32) -> Self {
        Self {
            queue,
            max_attempts,
        }
    }

    /// Enqueue one item per classified record.
    #[instrument(skip_all, fields(
        only_in_source = partition.only_in_source.len(),
        only_in_target = partition.only_in_target.len(),
        in_both = partition.in_both.len(),
    ))]
    pub async fn dispatch(&self, partition: &PartitionResult) -> DispatchReport {
        let mut report = DispatchReport::default();

        for user in &partition.only_in_source {
            self.enqueue(
                &mut report,
                WorkCategory::CreateLocalUser,
                WorkPayload::User(user.clone()),
            )
            .await;
        }
        for user in &partition.only_in_target {
            self.enqueue(
                &mut report,
                WorkCategory::ReviewOrphanedLocalUser,
                WorkPayload::User(user.clone()),
            )
            .await;
        }
        for pair in &partition.in_both {
            self.enqueue(
                &mut report,
                WorkCategory::ReconcileCommonUser,
                WorkPayload::Pair(pair.clone()),
            )
            .await;
        }

        if report.has_failures() {
            warn!(
                enqueued = report.total_enqueued(),
                duplicates = report.total_duplicates(),
                failed = report.total_failed(),
                "Dispatch finished with failures"
            );
        } else {
            info!(
                enqueued = report.total_enqueued(),
                duplicates = report.total_duplicates(),
                "Dispatch finished"
            );
        }
        report
    }

    async fn enqueue(
        &self,
        report: &mut DispatchReport,
        category: WorkCategory,
        payload: WorkPayload,
    ) {
        let item = WorkItem::new(category, payload, self.max_attempts);
        let identity_key = item.identity_key.clone();

        match self.queue.enqueue(item).await {
            Ok(EnqueueOutcome::Enqueued(item_id)) => {
                debug!(%item_id, %category, %identity_key, "Work item enqueued");
                report.entry(category).enqueued += 1;
            }
            Ok(EnqueueOutcome::Duplicate { existing }) => {
                debug!(%existing, %category, %identity_key, "Work item already outstanding");
                report.entry(category).duplicates += 1;
            }
            Err(e) => {
                warn!(%category, %identity_key, error = %e, "Failed to enqueue work item");
                report.entry(category).failed += 1;
                report.errors.push(DispatchError {
                    category,
                    identity_key,
                    message: e.to_string(),
                    retryable: e.is_retryable(),
                });
            }
        }
    }
}
