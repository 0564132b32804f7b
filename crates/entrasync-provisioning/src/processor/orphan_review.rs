//! Flags local accounts with no identity provider counterpart.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument};

use crate::queue::{WorkCategory, WorkItem, WorkPayload};
use crate::review::{ReviewEntry, ReviewFlag, ReviewStore, ORPHAN_REASON};

use super::{ProcessOutcome, ProcessorError, ProcessorResult, WorkItemProcessor};

/// Records orphaned local accounts for manual follow-up.
pub struct OrphanReviewProcessor {
    reviews: Arc<dyn ReviewStore>,
}

impl OrphanReviewProcessor {
    pub fn new(reviews: Arc<dyn ReviewStore>) -> Self {
        Self { reviews }
    }
}

#[async_trait]
impl WorkItemProcessor for OrphanReviewProcessor {
    fn category(&self) -> WorkCategory {
        WorkCategory::ReviewOrphanedLocalUser
    }

    #[instrument(skip(self, item), fields(item_id = %item.id, identity_key = %item.identity_key))]
    async fn process(&self, item: &WorkItem) -> ProcessorResult<ProcessOutcome> {
        let WorkPayload::User(user) = &item.payload else {
            return Err(ProcessorError::InvalidPayload {
                message: "orphan review expects a single user".to_string(),
            });
        };

        let flag = self.reviews.flag(ReviewEntry::new(user, ORPHAN_REASON)).await?;
        let first_time = flag == ReviewFlag::New;
        if first_time {
            info!("Local account flagged for review");
        } else {
            info!("Local account still awaiting review");
        }
        Ok(ProcessOutcome::FlaggedForReview { first_time })
    }
}
