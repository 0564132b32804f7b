//! In-memory local store and notifiers.
//!
//! Used by the `memory` backend and throughout the test suites.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::account::{LocalAccount, NewLocalAccount};
use crate::directory::normalize_identity_key;
use crate::error::{StoreError, StoreResult};
use crate::mapping::LocalFieldSchema;
use crate::traits::{AccountNotifier, LocalUserStore};

/// Local user store backed by a vector behind a lock.
///
/// Create-if-absent holds the write lock across the existence check and the
/// insert, so concurrent creates for one identity produce one account.
#[derive(Debug)]
pub struct InMemoryUserStore {
    schema: LocalFieldSchema,
    accounts: RwLock<Vec<LocalAccount>>,
    fail_next_creates: AtomicU32,
}

impl InMemoryUserStore {
    #[must_use]
    pub fn new(schema: LocalFieldSchema) -> Self {
        Self {
            schema,
            accounts: RwLock::new(Vec::new()),
            fail_next_creates: AtomicU32::new(0),
        }
    }

    /// Seed an existing account, as if it had been created by hand.
    pub async fn insert(&self, name: &str, mail: &str) -> LocalAccount {
        let mut accounts = self.accounts.write().await;
        let mut builder = NewLocalAccount::new(name, mail, self.schema.clone(), ", ");
        builder.set_status(crate::mapping::AccountStatus::Active);
        let account = builder.into_account(next_id(&accounts), Utc::now());
        accounts.push(account.clone());
        account
    }

    /// Make the next `n` creates fail with a transient error.
    pub fn fail_next_creates(&self, n: u32) {
        self.fail_next_creates.store(n, Ordering::SeqCst);
    }

    /// Number of stored accounts.
    pub async fn len(&self) -> usize {
        self.accounts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.accounts.read().await.is_empty()
    }

    fn take_injected_failure(&self) -> bool {
        self.fail_next_creates
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

fn next_id(accounts: &[LocalAccount]) -> i64 {
    accounts.iter().map(|a| a.id).max().unwrap_or(1) + 1
}

#[async_trait]
impl LocalUserStore for InMemoryUserStore {
    fn schema(&self) -> &LocalFieldSchema {
        &self.schema
    }

    async fn list_accounts(&self) -> StoreResult<Vec<LocalAccount>> {
        Ok(self.accounts.read().await.clone())
    }

    async fn find_by_identity(&self, identity_key: &str) -> StoreResult<Option<LocalAccount>> {
        let accounts = self.accounts.read().await;
        Ok(accounts
            .iter()
            .find(|a| a.matches_identity(identity_key))
            .cloned())
    }

    async fn create_if_absent(
        &self,
        account: NewLocalAccount,
    ) -> StoreResult<Option<LocalAccount>> {
        if self.take_injected_failure() {
            return Err(StoreError::Transient("injected failure".to_string()));
        }
        account.validate()?;

        let mut accounts = self.accounts.write().await;
        let name = normalize_identity_key(account.name());
        let mail = normalize_identity_key(account.mail());
        let exists = accounts.iter().any(|a| {
            normalize_identity_key(&a.name) == name || normalize_identity_key(&a.mail) == mail
        });
        if exists {
            debug!(name = %account.name(), "Account already present, skipping insert");
            return Ok(None);
        }

        let created = account.into_account(next_id(&accounts), Utc::now());
        accounts.push(created.clone());
        Ok(Some(created))
    }
}

/// Notifier that only logs.
#[derive(Debug, Default, Clone)]
pub struct LoggingNotifier;

#[async_trait]
impl AccountNotifier for LoggingNotifier {
    async fn account_created(&self, account: &LocalAccount) -> StoreResult<()> {
        info!(
            account_id = account.id,
            name = %account.name,
            "Account-created notification sent"
        );
        Ok(())
    }
}

/// Notifier that remembers which accounts it was called for.
#[derive(Debug, Default, Clone)]
pub struct RecordingNotifier {
    sent: Arc<RwLock<Vec<String>>>,
}

impl RecordingNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of accounts notified so far.
    pub async fn sent(&self) -> Vec<String> {
        self.sent.read().await.clone()
    }
}

#[async_trait]
impl AccountNotifier for RecordingNotifier {
    async fn account_created(&self, account: &LocalAccount) -> StoreResult<()> {
        self.sent.write().await.push(account.name.clone());
        Ok(())
    }
}
