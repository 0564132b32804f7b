//! Work Queue
//!
//! Three logical queues, one per [`WorkCategory`], behind the [`WorkQueue`]
//! trait. An item moves `Pending → InProgress → Completed`; a retryable
//! failure sends it back to `Pending` after a backoff, and a terminal
//! failure or exhausted attempts move it to `DeadLettered`.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use entrasync_connector::directory::DirectoryUser;

use crate::idempotency::idempotency_key;
use crate::reconciliation::MatchedPair;

/// Longest delay between two attempts of one item.
pub const MAX_RETRY_DELAY_SECS: u64 = 86_400;

/// Follow-up work produced by one reconciliation bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkCategory {
    /// User present only in the identity provider.
    CreateLocalUser,
    /// Local account with no identity provider counterpart.
    ReviewOrphanedLocalUser,
    /// User present on both sides.
    ReconcileCommonUser,
}

impl WorkCategory {
    pub const ALL: [WorkCategory; 3] = [
        WorkCategory::CreateLocalUser,
        WorkCategory::ReviewOrphanedLocalUser,
        WorkCategory::ReconcileCommonUser,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateLocalUser => "create_local_user",
            Self::ReviewOrphanedLocalUser => "review_orphaned_local_user",
            Self::ReconcileCommonUser => "reconcile_common_user",
        }
    }
}

impl std::fmt::Display for WorkCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WorkCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("Invalid work category: {s}"))
    }
}

/// Lifecycle state of a work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    Pending,
    InProgress,
    Completed,
    DeadLettered,
}

impl ItemState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::DeadLettered => "dead_lettered",
        }
    }

    /// Whether the item still awaits processing.
    #[must_use]
    pub fn is_outstanding(&self) -> bool {
        matches!(self, Self::Pending | Self::InProgress)
    }
}

impl std::fmt::Display for ItemState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ItemState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "dead_lettered" => Ok(Self::DeadLettered),
            _ => Err(format!("Invalid item state: {s}")),
        }
    }
}

/// What a work item carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkPayload {
    /// One record from a single side.
    User(DirectoryUser),
    /// A record present on both sides.
    Pair(MatchedPair),
}

impl WorkPayload {
    /// Identity key of the carried record, normalized.
    #[must_use]
    pub fn identity_key(&self) -> String {
        match self {
            Self::User(user) => user.normalized_key(),
            Self::Pair(pair) => pair.source.normalized_key(),
        }
    }
}

/// One queued unit of follow-up processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: Uuid,
    pub category: WorkCategory,
    /// Normalized identity key of the payload.
    pub identity_key: String,
    pub idempotency_key: String,
    pub payload: WorkPayload,
    pub state: ItemState,
    /// Attempts started so far. Incremented on claim.
    pub attempt_count: u32,
    pub max_attempts: u32,
    pub enqueued_at: DateTime<Utc>,
    /// Earliest time the item may be claimed.
    pub next_attempt_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
    /// When the item reached `Completed` or `DeadLettered`.
    pub finished_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl WorkItem {
    /// New pending item, claimable immediately.
    #[must_use]
    pub fn new(category: WorkCategory, payload: WorkPayload, max_attempts: u32) -> Self {
        let identity_key = payload.identity_key();
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            category,
            idempotency_key: idempotency_key(category, &identity_key),
            identity_key,
            payload,
            state: ItemState::Pending,
            attempt_count: 0,
            max_attempts: max_attempts.max(1),
            enqueued_at: now,
            next_attempt_at: now,
            claimed_at: None,
            finished_at: None,
            last_error: None,
        }
    }

    #[must_use]
    pub fn attempts_exhausted(&self) -> bool {
        self.attempt_count >= self.max_attempts
    }
}

/// Queue tuning, the `queue:` configuration section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Attempts before an item is dead-lettered.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Outstanding items the in-memory queue holds before refusing more.
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Delay before the first retry; doubles on each further attempt.
    #[serde(default = "default_retry_base_delay_secs")]
    pub retry_base_delay_secs: u64,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_capacity() -> usize {
    10_000
}

fn default_retry_base_delay_secs() -> u64 {
    30
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            capacity: default_capacity(),
            retry_base_delay_secs: default_retry_base_delay_secs(),
        }
    }
}

impl QueueConfig {
    pub fn validate(&self) -> QueueResult<()> {
        if self.max_attempts == 0 {
            return Err(QueueError::InvalidConfig(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.capacity == 0 {
            return Err(QueueError::InvalidConfig(
                "capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Delay before the next attempt once `attempt` attempts have failed:
    /// `base * 2^(attempt - 1)`, capped at [`MAX_RETRY_DELAY_SECS`].
    #[must_use]
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let secs = self
            .retry_base_delay_secs
            .saturating_mul(1u64 << exponent)
            .min(MAX_RETRY_DELAY_SECS);
        Duration::from_secs(secs)
    }
}

/// Result of an enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Enqueued(Uuid),
    /// An item with the same idempotency key is already pending or in progress.
    Duplicate { existing: Uuid },
}

/// Result of handing a failed item back to the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    Scheduled { next_attempt_at: DateTime<Utc> },
    /// The item had no attempts left.
    DeadLettered,
}

/// Item counts for one category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryStats {
    pub pending: u64,
    pub in_progress: u64,
    pub completed: u64,
    pub dead_lettered: u64,
    pub oldest_pending_at: Option<DateTime<Utc>>,
}

impl CategoryStats {
    #[must_use]
    pub fn depth(&self) -> u64 {
        self.pending + self.in_progress
    }
}

/// Item counts for every category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub categories: BTreeMap<WorkCategory, CategoryStats>,
}

impl Default for QueueStats {
    fn default() -> Self {
        Self {
            categories: WorkCategory::ALL
                .into_iter()
                .map(|c| (c, CategoryStats::default()))
                .collect(),
        }
    }
}

impl QueueStats {
    #[must_use]
    pub fn category(&self, category: WorkCategory) -> CategoryStats {
        self.categories.get(&category).cloned().unwrap_or_default()
    }

    pub fn category_mut(&mut self, category: WorkCategory) -> &mut CategoryStats {
        self.categories.entry(category).or_default()
    }

    #[must_use]
    pub fn total_depth(&self) -> u64 {
        self.categories.values().map(CategoryStats::depth).sum()
    }

    #[must_use]
    pub fn total_dead_lettered(&self) -> u64 {
        self.categories.values().map(|s| s.dead_lettered).sum()
    }
}

/// Queue errors.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The queue holds as many outstanding items as it may.
    #[error("Queue is full (capacity {capacity})")]
    Full { capacity: usize },

    /// The queue backend cannot be reached.
    #[error("Queue unavailable: {0}")]
    Unavailable(String),

    /// Work item not found.
    #[error("Work item not found: {item_id}")]
    NotFound { item_id: Uuid },

    /// The item is not in a state that allows the transition.
    #[error("Work item {item_id} is {state}")]
    InvalidState { item_id: Uuid, state: ItemState },

    /// Stored item data could not be decoded.
    #[error("Invalid work item data: {0}")]
    InvalidData(String),

    /// Queue configuration is invalid.
    #[error("Invalid queue configuration: {0}")]
    InvalidConfig(String),
}

impl QueueError {
    /// Check if the operation may succeed when repeated later.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Full { .. } | Self::Unavailable(_))
    }
}

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Durable or in-memory storage for work items.
///
/// Claiming hands an item exclusively to one worker. Each call to
/// [`claim`](WorkQueue::claim) counts as one attempt for every item returned.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Add an item unless one with the same idempotency key is outstanding.
    async fn enqueue(&self, item: WorkItem) -> QueueResult<EnqueueOutcome>;

    /// Claim up to `limit` pending items that are due, oldest first.
    async fn claim(
        &self,
        category: Option<WorkCategory>,
        limit: usize,
    ) -> QueueResult<Vec<WorkItem>>;

    /// Mark a claimed item as done.
    async fn complete(&self, item_id: Uuid) -> QueueResult<()>;

    /// Hand a claimed item back after a retryable failure.
    ///
    /// Dead-letters the item instead when its attempts are exhausted.
    async fn retry(&self, item_id: Uuid, error: &str) -> QueueResult<RetryOutcome>;

    /// Move a claimed item to the dead-letter state.
    async fn dead_letter(&self, item_id: Uuid, error: &str) -> QueueResult<()>;

    /// Return items claimed longer than `older_than_secs` ago to pending.
    async fn release_stale(&self, older_than_secs: u64) -> QueueResult<u64>;

    /// Delete completed items that finished more than `older_than_secs`
    /// ago. Dead-lettered items are kept for inspection.
    async fn purge_completed(&self, older_than_secs: u64) -> QueueResult<u64>;

    /// Item counts per category.
    async fn stats(&self) -> QueueResult<QueueStats>;

    /// Dead-lettered items, most recent first.
    async fn dead_letters(
        &self,
        category: Option<WorkCategory>,
        limit: usize,
    ) -> QueueResult<Vec<WorkItem>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_round_trips_through_str() {
        for category in WorkCategory::ALL {
            assert_eq!(category.as_str().parse::<WorkCategory>(), Ok(category));
        }
        assert!("delete_user".parse::<WorkCategory>().is_err());
    }

    #[test]
    fn test_item_state_parse() {
        assert_eq!("dead_lettered".parse::<ItemState>(), Ok(ItemState::DeadLettered));
        assert!(ItemState::InProgress.is_outstanding());
        assert!(!ItemState::Completed.is_outstanding());
    }

    #[test]
    fn test_new_item_uses_normalized_key() {
        let item = WorkItem::new(
            WorkCategory::CreateLocalUser,
            WorkPayload::User(DirectoryUser::new("  A@X.com ")),
            3,
        );
        assert_eq!(item.identity_key, "a@x.com");
        assert_eq!(item.state, ItemState::Pending);
        assert_eq!(item.attempt_count, 0);
        assert_eq!(item.idempotency_key.len(), 64);
        assert_eq!(item.next_attempt_at, item.enqueued_at);
    }

    #[test]
    fn test_zero_max_attempts_is_raised_to_one() {
        let item = WorkItem::new(
            WorkCategory::CreateLocalUser,
            WorkPayload::User(DirectoryUser::new("a@x.com")),
            0,
        );
        assert_eq!(item.max_attempts, 1);
    }

    #[test]
    fn test_retry_delay_doubles() {
        let config = QueueConfig {
            retry_base_delay_secs: 30,
            ..QueueConfig::default()
        };
        assert_eq!(config.retry_delay(1), Duration::from_secs(30));
        assert_eq!(config.retry_delay(2), Duration::from_secs(60));
        assert_eq!(config.retry_delay(3), Duration::from_secs(120));
        assert_eq!(config.retry_delay(40), Duration::from_secs(MAX_RETRY_DELAY_SECS));
    }

    #[test]
    fn test_queue_config_defaults_from_yaml() {
        let config: QueueConfig = serde_json::from_str(r#"{"max_attempts": 2}"#).unwrap();
        assert_eq!(config.max_attempts, 2);
        assert_eq!(config.capacity, 10_000);
        assert_eq!(config.retry_base_delay_secs, 30);
        assert!(config.validate().is_ok());

        let invalid = QueueConfig {
            max_attempts: 0,
            ..QueueConfig::default()
        };
        assert!(matches!(invalid.validate(), Err(QueueError::InvalidConfig(_))));
    }

    #[test]
    fn test_payload_serializes_with_kind_tag() {
        let payload = WorkPayload::User(DirectoryUser::new("a@x.com").with_attribute("mail", "a@x.com"));
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["kind"], "user");
        let back: WorkPayload = serde_json::from_value(json).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn test_stats_cover_every_category() {
        let mut stats = QueueStats::default();
        stats.category_mut(WorkCategory::CreateLocalUser).pending = 2;
        stats.category_mut(WorkCategory::ReconcileCommonUser).dead_lettered = 1;
        assert_eq!(stats.categories.len(), 3);
        assert_eq!(stats.total_depth(), 2);
        assert_eq!(stats.total_dead_lettered(), 1);
    }

    #[test]
    fn test_queue_error_retryable() {
        assert!(QueueError::Full { capacity: 1 }.is_retryable());
        assert!(QueueError::Unavailable("down".into()).is_retryable());
        assert!(!QueueError::NotFound { item_id: Uuid::nil() }.is_retryable());
    }
}
