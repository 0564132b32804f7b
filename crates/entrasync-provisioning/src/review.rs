//! Review list for local accounts the identity provider no longer knows.
//!
//! Orphaned accounts are only ever recorded here for an operator to act
//! on; nothing deletes or blocks them automatically.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use entrasync_connector::directory::{AttributeValue, DirectoryUser};
use entrasync_connector::error::StoreResult;

/// Reason recorded for accounts absent from the identity provider.
pub const ORPHAN_REASON: &str = "absent from identity provider";

/// One account awaiting manual review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewEntry {
    /// Normalized identity key.
    pub identity_key: String,
    pub reason: String,
    /// Attributes as last seen.
    pub attributes: BTreeMap<String, AttributeValue>,
    pub first_flagged_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    /// Reconciliation passes that have flagged the account.
    pub times_seen: u32,
}

impl ReviewEntry {
    #[must_use]
    pub fn new(user: &DirectoryUser, reason: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            identity_key: user.normalized_key(),
            reason: reason.into(),
            attributes: user.attributes().clone(),
            first_flagged_at: now,
            last_seen_at: now,
            times_seen: 1,
        }
    }
}

/// Whether a flag created a new entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewFlag {
    New,
    AlreadyFlagged,
}

/// Storage for review entries, keyed by identity key.
#[async_trait]
pub trait ReviewStore: Send + Sync {
    /// Insert an entry, or refresh `last_seen_at`, `times_seen` and the
    /// attributes of an existing one.
    async fn flag(&self, entry: ReviewEntry) -> StoreResult<ReviewFlag>;

    /// Every entry, ordered by identity key.
    async fn list(&self) -> StoreResult<Vec<ReviewEntry>>;
}

/// Review store held in process memory.
#[derive(Debug, Default)]
pub struct MemoryReviewStore {
    entries: RwLock<BTreeMap<String, ReviewEntry>>,
}

impl MemoryReviewStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReviewStore for MemoryReviewStore {
    async fn flag(&self, entry: ReviewEntry) -> StoreResult<ReviewFlag> {
        let mut entries = self.entries.write().await;
        match entries.get_mut(&entry.identity_key) {
            Some(existing) => {
                existing.last_seen_at = entry.last_seen_at;
                existing.attributes = entry.attributes;
                existing.times_seen += 1;
                Ok(ReviewFlag::AlreadyFlagged)
            }
            None => {
                entries.insert(entry.identity_key.clone(), entry);
                Ok(ReviewFlag::New)
            }
        }
    }

    async fn list(&self) -> StoreResult<Vec<ReviewEntry>> {
        Ok(self.entries.read().await.values().cloned().collect())
    }
}
