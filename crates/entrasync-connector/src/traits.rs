//! Directory adapter traits
//!
//! Capability-based trait definitions for the two directories and the
//! side effects account creation can trigger.

use async_trait::async_trait;

use crate::account::{LocalAccount, NewLocalAccount};
use crate::directory::{AttributeValue, DirectoryUser};
use crate::error::{FetchResult, StoreResult};
use crate::mapping::LocalFieldSchema;

/// A directory that can list every user it holds.
#[async_trait]
pub trait DirectorySource: Send + Sync {
    /// Short name used in logs and reports (e.g. "entra", "local").
    fn name(&self) -> &str;

    /// Fetch every user, following pagination until exhausted.
    ///
    /// Failure part-way through is an error; no partial listing is
    /// returned. Two calls with no backing change yield equal content, in
    /// any order.
    async fn fetch_all(&self) -> FetchResult<Vec<DirectoryUser>>;
}

/// Typed write target for field-mapping-driven account construction.
pub trait FieldSetter {
    /// Whether `name` is a field this target can hold.
    fn supports_field(&self, name: &str) -> bool;

    /// Write a value, adapting its shape to the field definition.
    fn set_field(&mut self, name: &str, value: AttributeValue) -> StoreResult<()>;
}

/// The application's own user accounts.
#[async_trait]
pub trait LocalUserStore: Send + Sync {
    /// Custom fields accounts carry.
    fn schema(&self) -> &LocalFieldSchema;

    /// Every account, in id order.
    async fn list_accounts(&self) -> StoreResult<Vec<LocalAccount>>;

    /// Find an account whose name or mail equals `identity_key`,
    /// case-insensitively.
    async fn find_by_identity(&self, identity_key: &str) -> StoreResult<Option<LocalAccount>>;

    /// Persist `account` unless one with the same name or mail exists.
    ///
    /// Returns `None` when an account already held the identity. The check
    /// and the insert are atomic.
    async fn create_if_absent(&self, account: NewLocalAccount)
        -> StoreResult<Option<LocalAccount>>;
}

/// Sends the standard account-created notification.
#[async_trait]
pub trait AccountNotifier: Send + Sync {
    async fn account_created(&self, account: &LocalAccount) -> StoreResult<()>;
}
