//! Local account creation for users only the identity provider knows.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info, instrument, warn};

use entrasync_connector::account::{validate_email, LocalAccount, NewLocalAccount};
use entrasync_connector::directory::DirectoryUser;
use entrasync_connector::error::StoreError;
use entrasync_connector::mapping::FieldMappingConfig;
use entrasync_connector::traits::{AccountNotifier, FieldSetter, LocalUserStore};

use crate::credential::CredentialGenerator;
use crate::queue::{WorkCategory, WorkItem, WorkPayload};

use super::{KeyLocks, ProcessOutcome, ProcessorError, ProcessorResult, WorkItemProcessor};

/// Attribute holding the user's email address.
const MAIL_ATTRIBUTE: &str = "mail";

/// Creates a local account from an identity provider record.
///
/// The account's username is the identity key and its email the `mail`
/// attribute (the identity key when absent). Field mappings, roles and the
/// initial status come from the injected [`FieldMappingConfig`]. Creation
/// is skipped when the identity already has an account, so replays of the
/// same item are harmless.
pub struct CreateLocalUserProcessor {
    mapping: FieldMappingConfig,
    store: Arc<dyn LocalUserStore>,
    notifier: Arc<dyn AccountNotifier>,
    credentials: CredentialGenerator,
    locks: KeyLocks,
}

impl CreateLocalUserProcessor {
    pub fn new(
        mapping: FieldMappingConfig,
        store: Arc<dyn LocalUserStore>,
        notifier: Arc<dyn AccountNotifier>,
    ) -> Self {
        Self {
            mapping,
            store,
            notifier,
            credentials: CredentialGenerator::default(),
            locks: KeyLocks::new(),
        }
    }

    /// Replace the credential generator (e.g. cheaper hashing in tests).
    #[must_use]
    pub fn with_credentials(mut self, credentials: CredentialGenerator) -> Self {
        self.credentials = credentials;
        self
    }

    #[must_use]
    pub fn mapping(&self) -> &FieldMappingConfig {
        &self.mapping
    }

    async fn find_existing(&self, user: &DirectoryUser) -> ProcessorResult<Option<LocalAccount>> {
        if let Some(account) = self.store.find_by_identity(user.identity_key()).await? {
            return Ok(Some(account));
        }
        let mail = mail_of(user);
        if !mail.eq_ignore_ascii_case(user.identity_key().trim()) {
            return Ok(self.store.find_by_identity(&mail).await?);
        }
        Ok(None)
    }

    /// Build the new account from the record and the mapping.
    fn build_account(&self, user: &DirectoryUser) -> ProcessorResult<NewLocalAccount> {
        let identity_key = user.identity_key().trim();
        let mail = mail_of(user);
        if !validate_email(&mail) {
            return Err(ProcessorError::validation(
                identity_key,
                format!("invalid email address '{mail}'"),
            ));
        }

        let mut account = NewLocalAccount::new(
            identity_key,
            mail,
            self.store.schema().clone(),
            self.mapping.multi_value_separator.as_str(),
        );
        account.set_password_hash(self.credentials.generate_hash()?);

        for mapping in &self.mapping.fields {
            let Some(value) = user.attribute(&mapping.source).filter(|v| !v.is_empty()) else {
                if mapping.required {
                    return Err(ProcessorError::validation(
                        identity_key,
                        format!("mandatory field '{}' is empty", mapping.source),
                    ));
                }
                continue;
            };

            if !account.supports_field(&mapping.target) {
                error!(
                    source_field = %mapping.source,
                    target_field = %mapping.target,
                    "Mapped local field does not exist, skipping"
                );
                continue;
            }
            account.set_field(&mapping.target, value.clone())?;
        }

        account.set_status(self.mapping.initial_status);
        for role in &self.mapping.roles {
            account.add_role(role.as_str());
        }
        Ok(account)
    }

    async fn notify(&self, account: &LocalAccount) {
        if !self.mapping.should_notify() {
            return;
        }
        // The account exists at this point; a retry would find it and skip.
        if let Err(e) = self.notifier.account_created(account).await {
            warn!(account_id = account.id, error = %e, "Account-created notification failed");
        }
    }
}

fn mail_of(user: &DirectoryUser) -> String {
    user.attribute(MAIL_ATTRIBUTE)
        .and_then(|v| v.values().first().map(|s| s.trim().to_string()))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| user.identity_key().trim().to_string())
}

#[async_trait]
impl WorkItemProcessor for CreateLocalUserProcessor {
    fn category(&self) -> WorkCategory {
        WorkCategory::CreateLocalUser
    }

    #[instrument(skip(self, item), fields(
        item_id = %item.id,
        identity_key = %item.identity_key,
        attempt = item.attempt_count,
    ))]
    async fn process(&self, item: &WorkItem) -> ProcessorResult<ProcessOutcome> {
        let WorkPayload::User(user) = &item.payload else {
            return Err(ProcessorError::InvalidPayload {
                message: "account creation expects a single user".to_string(),
            });
        };

        let _guard = self.locks.lock(&item.identity_key).await;

        if let Some(existing) = self.find_existing(user).await? {
            info!(account_id = existing.id, "Local account already exists, skipping");
            return Ok(ProcessOutcome::AlreadyExists {
                account_id: Some(existing.id),
            });
        }

        let account = self.build_account(user)?;
        debug!(
            fields = account.fields().len(),
            roles = account.roles().len(),
            status = %account.status(),
            "Creating local account"
        );

        match self.store.create_if_absent(account).await {
            Ok(Some(created)) => {
                info!(account_id = created.id, status = %created.status, "Local account created");
                self.notify(&created).await;
                Ok(ProcessOutcome::Created {
                    account_id: created.id,
                })
            }
            Ok(None) | Err(StoreError::AlreadyExists { .. }) => {
                info!("Local account created concurrently, skipping");
                Ok(ProcessOutcome::AlreadyExists { account_id: None })
            }
            Err(StoreError::Validation(message)) => {
                Err(ProcessorError::validation(&item.identity_key, message))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use entrasync_connector::directory::AttributeValue;
    use entrasync_connector::mapping::{
        AccountStatus, FieldMapping, LocalFieldDefinition, LocalFieldSchema,
    };
    use entrasync_connector::memory::{InMemoryUserStore, RecordingNotifier};

    fn schema() -> LocalFieldSchema {
        LocalFieldSchema::default()
            .with_field(LocalFieldDefinition::single("field_first_name"))
            .with_field(LocalFieldDefinition::single("field_phone"))
            .with_field(LocalFieldDefinition::multi("field_phones"))
            .with_field(LocalFieldDefinition::single("field_department"))
    }

    fn mapping() -> FieldMappingConfig {
        FieldMappingConfig {
            fields: vec![
                FieldMapping::new("givenName", "field_first_name"),
                FieldMapping::new("businessPhones", "field_phone"),
                FieldMapping::new("businessPhones", "field_phones"),
            ],
            roles: vec!["editor".to_string()],
            ..FieldMappingConfig::default()
        }
    }

    struct Fixture {
        store: Arc<InMemoryUserStore>,
        notifier: Arc<RecordingNotifier>,
        processor: CreateLocalUserProcessor,
    }

    fn fixture(mapping: FieldMappingConfig) -> Fixture {
        let store = Arc::new(InMemoryUserStore::new(schema()));
        let notifier = Arc::new(RecordingNotifier::new());
        let processor = CreateLocalUserProcessor::new(mapping, store.clone(), notifier.clone())
            .with_credentials(CredentialGenerator::with_params(1024, 1, 1).unwrap());
        Fixture {
            store,
            notifier,
            processor,
        }
    }

    fn item(user: DirectoryUser) -> WorkItem {
        WorkItem::new(WorkCategory::CreateLocalUser, WorkPayload::User(user), 3)
    }

    fn alice() -> DirectoryUser {
        DirectoryUser::new("Alice@Example.com")
            .with_attribute("mail", "alice@example.com")
            .with_attribute("givenName", "Alice")
            .with_attribute(
                "businessPhones",
                vec!["+47 111".to_string(), "+47 222".to_string()],
            )
    }

    #[tokio::test]
    async fn test_creates_account_with_mapped_fields() {
        let f = fixture(mapping());
        let outcome = f.processor.process(&item(alice())).await.unwrap();
        let ProcessOutcome::Created { account_id } = outcome else {
            panic!("expected creation, got {outcome:?}");
        };

        let account = f
            .store
            .find_by_identity("alice@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(account.id, account_id);
        assert_eq!(account.name, "Alice@Example.com");
        assert_eq!(account.mail, "alice@example.com");
        assert_eq!(account.status, AccountStatus::Blocked);
        assert_eq!(account.roles, vec!["editor".to_string()]);
        assert_eq!(
            account.fields.get("field_first_name"),
            Some(&AttributeValue::Single("Alice".into()))
        );
        assert_eq!(
            account.fields.get("field_phone"),
            Some(&AttributeValue::Single("+47 111, +47 222".into()))
        );
        assert_eq!(
            account.fields.get("field_phones"),
            Some(&AttributeValue::Multi(vec!["+47 111".into(), "+47 222".into()]))
        );
        assert!(f.notifier.sent().await.is_empty());
    }

    #[tokio::test]
    async fn test_custom_separator() {
        let f = fixture(FieldMappingConfig {
            multi_value_separator: " | ".to_string(),
            ..mapping()
        });
        f.processor.process(&item(alice())).await.unwrap();

        let account = f.store.find_by_identity("alice@example.com").await.unwrap().unwrap();
        assert_eq!(
            account.fields.get("field_phone"),
            Some(&AttributeValue::Single("+47 111 | +47 222".into()))
        );
    }

    #[tokio::test]
    async fn test_existing_account_is_left_alone() {
        let f = fixture(mapping());
        let existing = f.store.insert("alice", "ALICE@example.com").await;

        let outcome = f.processor.process(&item(alice())).await.unwrap();

        assert_eq!(
            outcome,
            ProcessOutcome::AlreadyExists {
                account_id: Some(existing.id)
            }
        );
        assert_eq!(f.store.len().await, 1);
    }

    #[tokio::test]
    async fn test_processing_twice_creates_one_account() {
        let f = fixture(mapping());
        let item = item(alice());
        f.processor.process(&item).await.unwrap();
        let second = f.processor.process(&item).await.unwrap();

        assert!(matches!(second, ProcessOutcome::AlreadyExists { .. }));
        assert_eq!(f.store.len().await, 1);
    }

    #[tokio::test]
    async fn test_mail_falls_back_to_identity_key() {
        let f = fixture(FieldMappingConfig::default());
        f.processor
            .process(&item(DirectoryUser::new("bob@example.com")))
            .await
            .unwrap();

        let account = f.store.find_by_identity("bob@example.com").await.unwrap().unwrap();
        assert_eq!(account.mail, "bob@example.com");
        assert_eq!(account.name, "bob@example.com");
    }

    #[tokio::test]
    async fn test_missing_required_field_is_terminal() {
        let mut config = mapping();
        config
            .fields
            .push(FieldMapping::required("department", "field_department"));
        let f = fixture(config);

        let err = f.processor.process(&item(alice())).await.unwrap_err();

        assert!(matches!(err, ProcessorError::Validation { ref message, .. } if message.contains("department")));
        assert!(err.is_terminal());
        assert!(f.store.is_empty().await);
    }

    #[tokio::test]
    async fn test_blank_optional_field_is_skipped() {
        let f = fixture(mapping());
        let user = alice().with_attribute("givenName", "   ");
        f.processor.process(&item(user)).await.unwrap();

        let account = f.store.find_by_identity("alice@example.com").await.unwrap().unwrap();
        assert!(!account.fields.contains_key("field_first_name"));
    }

    #[tokio::test]
    async fn test_unknown_local_field_is_skipped() {
        let mut config = mapping();
        config.fields.push(FieldMapping::new("jobTitle", "field_missing"));
        let f = fixture(config);

        let user = alice().with_attribute("jobTitle", "Engineer");
        let outcome = f.processor.process(&item(user)).await.unwrap();

        assert!(matches!(outcome, ProcessOutcome::Created { .. }));
        let account = f.store.find_by_identity("alice@example.com").await.unwrap().unwrap();
        assert!(!account.fields.contains_key("field_missing"));
    }

    #[tokio::test]
    async fn test_invalid_email_is_terminal() {
        let f = fixture(mapping());
        let user = DirectoryUser::new("not-an-email");
        let err = f.processor.process(&item(user)).await.unwrap_err();
        assert!(matches!(err, ProcessorError::Validation { .. }));
        assert!(err.is_terminal());
    }

    #[tokio::test]
    async fn test_transient_store_failure_is_retryable() {
        let f = fixture(mapping());
        f.store.fail_next_creates(1);

        let err = f.processor.process(&item(alice())).await.unwrap_err();
        assert!(err.is_retryable());

        let outcome = f.processor.process(&item(alice())).await.unwrap();
        assert!(matches!(outcome, ProcessOutcome::Created { .. }));
    }

    #[tokio::test]
    async fn test_active_account_notifies_when_enabled() {
        let f = fixture(FieldMappingConfig {
            initial_status: AccountStatus::Active,
            notify_on_activation: true,
            ..mapping()
        });
        f.processor.process(&item(alice())).await.unwrap();
        assert_eq!(f.notifier.sent().await, vec!["Alice@Example.com".to_string()]);
    }

    #[tokio::test]
    async fn test_active_account_without_notify_flag_is_silent() {
        let f = fixture(FieldMappingConfig {
            initial_status: AccountStatus::Active,
            notify_on_activation: false,
            ..mapping()
        });
        f.processor.process(&item(alice())).await.unwrap();
        assert!(f.notifier.sent().await.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_creates_produce_one_account() {
        let f = fixture(mapping());
        let processor = Arc::new(f.processor);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let processor = processor.clone();
                tokio::spawn(async move { processor.process(&item(alice())).await })
            })
            .collect();

        let mut created = 0;
        for handle in handles {
            if matches!(handle.await.unwrap().unwrap(), ProcessOutcome::Created { .. }) {
                created += 1;
            }
        }
        assert_eq!(created, 1);
        assert_eq!(f.store.len().await, 1);
    }
}
