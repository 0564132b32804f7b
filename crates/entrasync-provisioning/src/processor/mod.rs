//! Work Item Processors
//!
//! One processor per [`WorkCategory`], selected by a [`ProcessorRouter`].
//! Processors classify their own failures: a retryable [`ProcessorError`]
//! sends the item back to the queue, anything else dead-letters it.

mod common_user;
mod create_user;
mod key_lock;
mod orphan_review;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use entrasync_connector::error::StoreError;

use crate::queue::{WorkCategory, WorkItem};

pub use common_user::{CommonUserHandler, CommonUserProcessor, NoopCommonUserHandler};
pub use create_user::CreateLocalUserProcessor;
pub use key_lock::KeyLocks;
pub use orphan_review::OrphanReviewProcessor;

/// Processor errors.
#[derive(Debug, Error)]
pub enum ProcessorError {
    /// The record can never produce a valid account.
    #[error("Validation failed for {identity_key}: {message}")]
    Validation {
        identity_key: String,
        message: String,
    },

    /// Local store or review store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The item carries a payload its category does not expect.
    #[error("Invalid work item payload: {message}")]
    InvalidPayload { message: String },

    /// Generating or hashing the initial credential failed.
    #[error("Credential error: {0}")]
    Credential(String),

    /// No processor handles the item's category.
    #[error("No processor registered for {0}")]
    NoProcessor(WorkCategory),
}

impl ProcessorError {
    /// Check if the item may succeed on a later attempt.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Store(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Check if the item should be dead-lettered immediately.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !self.is_retryable()
    }

    pub(crate) fn validation(identity_key: &str, message: impl Into<String>) -> Self {
        Self::Validation {
            identity_key: identity_key.to_string(),
            message: message.into(),
        }
    }
}

/// Result type for processor operations.
pub type ProcessorResult<T> = Result<T, ProcessorError>;

/// What processing a work item achieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// A local account was created.
    Created { account_id: i64 },
    /// The identity already had a local account; nothing was written.
    AlreadyExists { account_id: Option<i64> },
    /// The orphaned account was recorded for review.
    FlaggedForReview { first_time: bool },
    /// The common-user handler ran.
    Reconciled,
}

impl ProcessOutcome {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created { .. } => "created",
            Self::AlreadyExists { .. } => "already_exists",
            Self::FlaggedForReview { .. } => "flagged_for_review",
            Self::Reconciled => "reconciled",
        }
    }
}

impl std::fmt::Display for ProcessOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handles the items of one category.
#[async_trait]
pub trait WorkItemProcessor: Send + Sync {
    /// Category this processor consumes.
    fn category(&self) -> WorkCategory;

    /// Process one claimed item.
    ///
    /// Must be idempotent: dispatch is at-least-once and an item may be
    /// processed again after a stale release.
    async fn process(&self, item: &WorkItem) -> ProcessorResult<ProcessOutcome>;
}

/// Routes items to the processor registered for their category.
#[derive(Default, Clone)]
pub struct ProcessorRouter {
    processors: HashMap<WorkCategory, Arc<dyn WorkItemProcessor>>,
}

impl std::fmt::Debug for ProcessorRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut categories: Vec<_> = self.processors.keys().collect();
        categories.sort();
        f.debug_struct("ProcessorRouter")
            .field("categories", &categories)
            .finish()
    }
}

impl ProcessorRouter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a processor, replacing any previous one for its category.
    #[must_use]
    pub fn with(mut self, processor: Arc<dyn WorkItemProcessor>) -> Self {
        self.register(processor);
        self
    }

    pub fn register(&mut self, processor: Arc<dyn WorkItemProcessor>) {
        self.processors.insert(processor.category(), processor);
    }

    #[must_use]
    pub fn handles(&self, category: WorkCategory) -> bool {
        self.processors.contains_key(&category)
    }

    /// Process `item` with the processor for its category.
    pub async fn process(&self, item: &WorkItem) -> ProcessorResult<ProcessOutcome> {
        let processor = self
            .processors
            .get(&item.category)
            .ok_or(ProcessorError::NoProcessor(item.category))?;
        processor.process(item).await
    }
}
