//! Reconciliation Scenario Tests
//!
//! End-to-end runs against the in-memory local store and work queue:
//! - Users only in the identity provider get a local account
//! - Users on both sides produce no creation work
//! - Orphaned local accounts are flagged, never removed
//! - Mandatory-field failures dead-letter without blocking other items
//! - Repeated dispatch never creates an account twice

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use entrasync_connector::account::LocalIdentityField;
use entrasync_connector::directory::{AttributeValue, DirectoryUser};
use entrasync_connector::error::FetchResult;
use entrasync_connector::local::LocalDirectory;
use entrasync_connector::mapping::{
    AccountStatus, FieldMapping, FieldMappingConfig, LocalFieldDefinition, LocalFieldSchema,
};
use entrasync_connector::memory::{InMemoryUserStore, RecordingNotifier};
use entrasync_connector::traits::{DirectorySource, LocalUserStore};
use entrasync_provisioning::reconciliation::{MemoryRunLock, ReconciliationRunner};
use entrasync_provisioning::{
    CommonUserProcessor, CreateLocalUserProcessor, CredentialGenerator, Dispatcher, ItemState,
    MemoryReviewStore, MemoryWorkQueue, OrphanReviewProcessor, ProcessorRouter, QueueConfig,
    QueueWorker, ReviewStore, WorkCategory, WorkPayload, WorkQueue, WorkerConfig,
};

// =============================================================================
// Test Harness
// =============================================================================

/// Identity provider stand-in whose user list can change between runs.
#[derive(Default)]
struct FakeIdentityProvider {
    users: RwLock<Vec<DirectoryUser>>,
}

impl FakeIdentityProvider {
    async fn set(&self, users: Vec<DirectoryUser>) {
        *self.users.write().await = users;
    }
}

#[async_trait]
impl DirectorySource for FakeIdentityProvider {
    fn name(&self) -> &str {
        "entra"
    }

    async fn fetch_all(&self) -> FetchResult<Vec<DirectoryUser>> {
        Ok(self.users.read().await.clone())
    }
}

struct Harness {
    entra: Arc<FakeIdentityProvider>,
    store: Arc<InMemoryUserStore>,
    queue: Arc<MemoryWorkQueue>,
    reviews: Arc<MemoryReviewStore>,
    notifier: Arc<RecordingNotifier>,
    runner: ReconciliationRunner,
    worker: QueueWorker,
}

fn schema() -> LocalFieldSchema {
    LocalFieldSchema::default()
        .with_field(LocalFieldDefinition::single("field_first_name"))
        .with_field(LocalFieldDefinition::single("field_phone"))
        .with_field(LocalFieldDefinition::single("field_department"))
}

fn default_mapping() -> FieldMappingConfig {
    FieldMappingConfig {
        fields: vec![
            FieldMapping::new("givenName", "field_first_name"),
            FieldMapping::new("businessPhones", "field_phone"),
        ],
        roles: vec!["editor".to_string()],
        ..FieldMappingConfig::default()
    }
}

fn harness(mapping: FieldMappingConfig) -> Harness {
    let entra = Arc::new(FakeIdentityProvider::default());
    let store = Arc::new(InMemoryUserStore::new(schema()));
    let queue = Arc::new(MemoryWorkQueue::new(QueueConfig {
        max_attempts: 3,
        capacity: 1000,
        retry_base_delay_secs: 0,
    }));
    let reviews = Arc::new(MemoryReviewStore::new());
    let notifier = Arc::new(RecordingNotifier::new());

    let local = Arc::new(LocalDirectory::new(
        store.clone(),
        LocalIdentityField::Mail,
        vec!["admin".to_string()],
    ));
    let runner = ReconciliationRunner::new(
        entra.clone(),
        local,
        Dispatcher::new(queue.clone(), queue.config().max_attempts),
        Arc::new(MemoryRunLock::new()),
    );

    let create = CreateLocalUserProcessor::new(mapping, store.clone(), notifier.clone())
        .with_credentials(CredentialGenerator::with_params(1024, 1, 1).unwrap());
    let router = ProcessorRouter::new()
        .with(Arc::new(create))
        .with(Arc::new(OrphanReviewProcessor::new(reviews.clone())))
        .with(Arc::new(CommonUserProcessor::default()));
    let worker = QueueWorker::new(queue.clone(), Arc::new(router), WorkerConfig::default());

    Harness {
        entra,
        store,
        queue,
        reviews,
        notifier,
        runner,
        worker,
    }
}

fn entra_user(upn: &str) -> DirectoryUser {
    DirectoryUser::new(upn)
        .with_attribute("mail", upn)
        .with_attribute("givenName", "Test")
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn test_user_only_in_identity_provider_gets_account() {
    let h = harness(default_mapping());
    h.entra.set(vec![entra_user("a@x.com")]).await;

    let report = h.runner.run().await.unwrap();

    assert_eq!(report.partition.only_in_source, 1);
    let create_items = h.queue.items_in(WorkCategory::CreateLocalUser).await;
    assert_eq!(create_items.len(), 1);
    assert_eq!(create_items[0].identity_key, "a@x.com");

    let drained = h.worker.drain().await.unwrap();
    assert_eq!(drained.category(WorkCategory::CreateLocalUser).completed, 1);

    assert_eq!(h.store.len().await, 1);
    let account = h.store.find_by_identity("a@x.com").await.unwrap().unwrap();
    assert_eq!(account.name, "a@x.com");
    assert_eq!(account.mail, "a@x.com");
    assert_eq!(account.status, AccountStatus::Blocked);
    assert_eq!(account.roles, vec!["editor".to_string()]);
}

#[tokio::test]
async fn test_user_on_both_sides_creates_nothing() {
    let h = harness(default_mapping());
    h.store.insert("alice", "a@x.com").await;
    h.entra.set(vec![entra_user("A@X.com")]).await;

    let report = h.runner.run().await.unwrap();

    assert_eq!(report.partition.in_both, 1);
    assert_eq!(report.partition.only_in_source, 0);
    assert!(h.queue.items_in(WorkCategory::CreateLocalUser).await.is_empty());

    let common = h.queue.items_in(WorkCategory::ReconcileCommonUser).await;
    assert_eq!(common.len(), 1);
    assert!(matches!(common[0].payload, WorkPayload::Pair(_)));

    h.worker.drain().await.unwrap();
    assert_eq!(h.store.len().await, 1);
}

#[tokio::test]
async fn test_orphaned_local_account_is_flagged_not_removed() {
    let h = harness(default_mapping());
    h.store.insert("admin", "admin@site.local").await;
    h.store.insert("gone", "gone@x.com").await;

    let report = h.runner.run().await.unwrap();

    assert_eq!(report.target.fetched, 1);
    assert_eq!(report.partition.only_in_target, 1);

    h.worker.drain().await.unwrap();
    let entries = h.reviews.list().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].identity_key, "gone@x.com");
    assert_eq!(h.store.len().await, 2);
}

#[tokio::test]
async fn test_missing_mandatory_field_dead_letters_and_others_proceed() {
    let mut mapping = default_mapping();
    mapping
        .fields
        .push(FieldMapping::required("department", "field_department"));
    let h = harness(mapping);
    h.entra
        .set(vec![
            entra_user("nodept@x.com"),
            entra_user("b@x.com").with_attribute("department", "Sales"),
        ])
        .await;

    h.runner.run().await.unwrap();
    let drained = h.worker.drain().await.unwrap();

    let outcomes = drained.category(WorkCategory::CreateLocalUser);
    assert_eq!(outcomes.dead_lettered, 1);
    assert_eq!(outcomes.completed, 1);
    assert_eq!(outcomes.retried, 0);

    let dead = h.queue.dead_letters(None, 10).await.unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].identity_key, "nodept@x.com");
    assert_eq!(dead[0].attempt_count, 1);
    assert_eq!(dead[0].state, ItemState::DeadLettered);

    assert!(h.store.find_by_identity("nodept@x.com").await.unwrap().is_none());
    let created = h.store.find_by_identity("b@x.com").await.unwrap().unwrap();
    assert_eq!(
        created.fields.get("field_department"),
        Some(&AttributeValue::Single("Sales".into()))
    );
}

#[tokio::test]
async fn test_dispatching_twice_creates_one_account() {
    let h = harness(default_mapping());
    h.entra.set(vec![entra_user("a@x.com")]).await;

    let first = h.runner.run().await.unwrap();
    let second = h.runner.run().await.unwrap();

    assert_eq!(first.dispatch.category(WorkCategory::CreateLocalUser).enqueued, 1);
    assert_eq!(second.dispatch.category(WorkCategory::CreateLocalUser).duplicates, 1);

    h.worker.drain().await.unwrap();
    assert_eq!(h.store.len().await, 1);

    // Once created, the next run sees the user on both sides.
    let third = h.runner.run().await.unwrap();
    assert_eq!(third.partition.in_both, 1);
    assert_eq!(third.dispatch.category(WorkCategory::CreateLocalUser).enqueued, 0);
}

#[tokio::test]
async fn test_stale_replay_does_not_duplicate_account() {
    let h = harness(default_mapping());
    h.entra.set(vec![entra_user("a@x.com")]).await;
    h.runner.run().await.unwrap();

    // A worker claims the item and dies before acknowledging it.
    let claimed = h.queue.claim(None, 10).await.unwrap();
    assert_eq!(claimed.len(), 1);
    h.store.insert("a@x.com", "a@x.com").await;
    h.queue.release_stale(0).await.unwrap();

    let drained = h.worker.drain().await.unwrap();
    assert_eq!(drained.category(WorkCategory::CreateLocalUser).completed, 1);
    assert_eq!(h.store.len().await, 1);
}

#[tokio::test]
async fn test_empty_identity_provider_flags_every_local_account() {
    let h = harness(default_mapping());
    h.store.insert("one", "one@x.com").await;
    h.store.insert("two", "two@x.com").await;

    let report = h.runner.run().await.unwrap();

    assert_eq!(report.source.fetched, 0);
    assert_eq!(report.partition.only_in_target, 2);
    assert_eq!(report.partition.only_in_source, 0);
    assert_eq!(report.partition.in_both, 0);
}

#[tokio::test]
async fn test_empty_local_store_creates_every_user() {
    let h = harness(default_mapping());
    h.entra
        .set(vec![entra_user("a@x.com"), entra_user("b@x.com"), entra_user("c@x.com")])
        .await;

    let report = h.runner.run().await.unwrap();
    assert_eq!(report.partition.only_in_source, 3);

    h.worker.drain().await.unwrap();
    assert_eq!(h.store.len().await, 3);
}

#[tokio::test]
async fn test_multi_valued_attribute_is_joined() {
    let h = harness(default_mapping());
    h.entra
        .set(vec![entra_user("a@x.com").with_attribute(
            "businessPhones",
            vec!["+47 111".to_string(), "+47 222".to_string()],
        )])
        .await;

    h.runner.run().await.unwrap();
    h.worker.drain().await.unwrap();

    let account = h.store.find_by_identity("a@x.com").await.unwrap().unwrap();
    assert_eq!(
        account.fields.get("field_phone"),
        Some(&AttributeValue::Single("+47 111, +47 222".into()))
    );
}

#[tokio::test]
async fn test_transient_store_failure_is_retried_to_success() {
    let h = harness(default_mapping());
    h.store.fail_next_creates(2);
    h.entra.set(vec![entra_user("a@x.com")]).await;

    h.runner.run().await.unwrap();
    let drained = h.worker.drain().await.unwrap();

    let outcomes = drained.category(WorkCategory::CreateLocalUser);
    assert_eq!(outcomes.retried, 2);
    assert_eq!(outcomes.completed, 1);
    assert_eq!(h.store.len().await, 1);
}

#[tokio::test]
async fn test_active_accounts_are_announced() {
    let h = harness(FieldMappingConfig {
        initial_status: AccountStatus::Active,
        notify_on_activation: true,
        ..default_mapping()
    });
    h.entra.set(vec![entra_user("a@x.com")]).await;

    h.runner.run().await.unwrap();
    h.worker.drain().await.unwrap();

    assert_eq!(h.notifier.sent().await, vec!["a@x.com".to_string()]);
}

#[tokio::test]
async fn test_queue_outage_is_reported_per_item() {
    let h = harness(default_mapping());
    h.entra.set(vec![entra_user("a@x.com"), entra_user("b@x.com")]).await;
    h.queue.set_available(false);

    let report = h.runner.run().await.unwrap();

    assert!(!report.is_success());
    assert_eq!(report.dispatch.category(WorkCategory::CreateLocalUser).failed, 2);
    assert_eq!(report.dispatch.errors.len(), 2);
}
