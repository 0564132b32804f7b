//! Users present on both sides.
//!
//! Attribute synchronization for these users is not defined. The
//! [`CommonUserHandler`] trait is where it would plug in; the default
//! handler only logs.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::queue::{WorkCategory, WorkItem, WorkPayload};
use crate::reconciliation::MatchedPair;

use super::{ProcessOutcome, ProcessorError, ProcessorResult, WorkItemProcessor};

/// Reconciles one matched pair.
#[async_trait]
pub trait CommonUserHandler: Send + Sync {
    async fn reconcile(&self, pair: &MatchedPair) -> ProcessorResult<()>;
}

/// Handler that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCommonUserHandler;

#[async_trait]
impl CommonUserHandler for NoopCommonUserHandler {
    async fn reconcile(&self, pair: &MatchedPair) -> ProcessorResult<()> {
        debug!(
            source_key = pair.source.identity_key(),
            target_key = pair.target.identity_key(),
            "User present in both directories, nothing to do"
        );
        Ok(())
    }
}

/// Runs a [`CommonUserHandler`] for every matched pair.
pub struct CommonUserProcessor {
    handler: Arc<dyn CommonUserHandler>,
}

impl Default for CommonUserProcessor {
    fn default() -> Self {
        Self::new(Arc::new(NoopCommonUserHandler))
    }
}

impl CommonUserProcessor {
    pub fn new(handler: Arc<dyn CommonUserHandler>) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl WorkItemProcessor for CommonUserProcessor {
    fn category(&self) -> WorkCategory {
        WorkCategory::ReconcileCommonUser
    }

    #[instrument(skip(self, item), fields(item_id = %item.id, identity_key = %item.identity_key))]
    async fn process(&self, item: &WorkItem) -> ProcessorResult<ProcessOutcome> {
        let WorkPayload::Pair(pair) = &item.payload else {
            return Err(ProcessorError::InvalidPayload {
                message: "common user reconciliation expects a matched pair".to_string(),
            });
        };
        self.handler.reconcile(pair).await?;
        Ok(ProcessOutcome::Reconciled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use entrasync_connector::directory::DirectoryUser;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingHandler {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CommonUserHandler for CountingHandler {
        async fn reconcile(&self, _pair: &MatchedPair) -> ProcessorResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn pair_item() -> WorkItem {
        WorkItem::new(
            WorkCategory::ReconcileCommonUser,
            WorkPayload::Pair(MatchedPair {
                source: DirectoryUser::new("a@x.com"),
                target: DirectoryUser::new("A@x.com"),
            }),
            3,
        )
    }

    #[tokio::test]
    async fn test_default_handler_completes() {
        let processor = CommonUserProcessor::default();
        assert_eq!(
            processor.process(&pair_item()).await.unwrap(),
            ProcessOutcome::Reconciled
        );
    }

    #[tokio::test]
    async fn test_custom_handler_is_called() {
        let handler = Arc::new(CountingHandler::default());
        let processor = CommonUserProcessor::new(handler.clone());
        processor.process(&pair_item()).await.unwrap();
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_single_user_payload_is_rejected() {
        let item = WorkItem::new(
            WorkCategory::ReconcileCommonUser,
            WorkPayload::User(DirectoryUser::new("a@x.com")),
            3,
        );
        let err = CommonUserProcessor::default().process(&item).await.unwrap_err();
        assert!(err.is_terminal());
    }
}
