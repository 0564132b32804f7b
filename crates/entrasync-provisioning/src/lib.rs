//! # Provisioning Engine
//!
//! Reconciliation, work queues and item processing for entrasync.
//!
//! This crate provides the infrastructure for:
//! - Partitioning two directories by identity key
//! - Dispatching differences onto per-category work queues
//! - Idempotent enqueue and at-least-once processing
//! - Retry with exponential backoff and a dead-letter state
//! - Field-mapping-driven local account creation
//! - Run locking, interval scheduling and run reports
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ Reconciliation  │────►│  Dispatcher  │────►│  Work Queue  │
//! │ Runner          │     │              │     │ (3 categories)│
//! └─────────────────┘     └──────────────┘     └──────┬───────┘
//!                                                     │ claim
//!                                              ┌──────▼───────┐
//!                                              │ Queue Worker │
//!                                              └──────┬───────┘
//!                          ┌──────────────────────────┼──────────────────────┐
//!                          ▼                          ▼                      ▼
//!                 ┌─────────────────┐      ┌──────────────────┐    ┌─────────────────┐
//!                 │ CreateLocalUser │      │ OrphanReview     │    │ CommonUser      │
//!                 │ Processor       │      │ Processor        │    │ Processor       │
//!                 └────────┬────────┘      └──────────────────┘    └─────────────────┘
//!                          │
//!                 ┌────────▼────────┐      ┌──────────────┐
//!                 │ Local user store│      │ Dead Letter  │ (terminal failures and
//!                 └─────────────────┘      └──────────────┘  exhausted retries)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use entrasync_provisioning::{Dispatcher, MemoryWorkQueue, QueueWorker, ProcessorRouter};
//! use entrasync_provisioning::reconciliation::{MemoryRunLock, ReconciliationRunner};
//!
//! let queue = Arc::new(MemoryWorkQueue::default());
//! let runner = ReconciliationRunner::new(
//!     entra,
//!     local,
//!     Dispatcher::new(queue.clone(), 5),
//!     Arc::new(MemoryRunLock::new()),
//! );
//! let report = runner.run().await?;
//!
//! let worker = QueueWorker::new(queue, Arc::new(router), WorkerConfig::default());
//! let drained = worker.drain().await?;
//! ```

pub mod credential;
pub mod dispatch;
pub mod idempotency;
pub mod memory_queue;
pub mod processor;
pub mod queue;
pub mod reconciliation;
pub mod review;
pub mod shutdown;
pub mod worker;

pub use credential::CredentialGenerator;
pub use dispatch::{CategoryDispatch, DispatchError, DispatchReport, Dispatcher};
pub use idempotency::idempotency_key;
pub use memory_queue::MemoryWorkQueue;
pub use processor::{
    CommonUserHandler, CommonUserProcessor, CreateLocalUserProcessor, NoopCommonUserHandler,
    OrphanReviewProcessor, ProcessOutcome, ProcessorError, ProcessorResult, ProcessorRouter,
    WorkItemProcessor,
};
pub use queue::{
    CategoryStats, EnqueueOutcome, ItemState, QueueConfig, QueueError, QueueResult, QueueStats,
    RetryOutcome, WorkCategory, WorkItem, WorkPayload, WorkQueue,
};
pub use reconciliation::{
    DuplicateKeyPolicy, PartitionResult, ReconciliationError, ReconciliationResult,
    ReconciliationRunner, ReconciliationScheduler, RunLock, RunReport, SyncConfig,
};
pub use review::{MemoryReviewStore, ReviewEntry, ReviewFlag, ReviewStore};
pub use shutdown::Shutdown;
pub use worker::{DrainReport, QueueWorker, WorkerConfig};
