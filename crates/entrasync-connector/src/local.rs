//! Local user store exposed as a directory source.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::account::LocalIdentityField;
use crate::directory::{normalize_identity_key, DirectoryUser};
use crate::error::FetchResult;
use crate::traits::{DirectorySource, LocalUserStore};

/// Reads every local account and keys it on the configured identity field.
///
/// Accounts whose name is in the exclusion list (the site administrator by
/// default) never take part in reconciliation.
pub struct LocalDirectory {
    store: Arc<dyn LocalUserStore>,
    identity_field: LocalIdentityField,
    excluded_names: Vec<String>,
}

impl LocalDirectory {
    pub fn new(
        store: Arc<dyn LocalUserStore>,
        identity_field: LocalIdentityField,
        excluded_names: Vec<String>,
    ) -> Self {
        Self {
            store,
            identity_field,
            excluded_names: excluded_names
                .iter()
                .map(|n| normalize_identity_key(n))
                .collect(),
        }
    }

    fn is_excluded(&self, name: &str) -> bool {
        self.excluded_names
            .iter()
            .any(|n| *n == normalize_identity_key(name))
    }
}

#[async_trait]
impl DirectorySource for LocalDirectory {
    fn name(&self) -> &str {
        "local"
    }

    #[instrument(skip(self))]
    async fn fetch_all(&self) -> FetchResult<Vec<DirectoryUser>> {
        let accounts = self.store.list_accounts().await?;
        let total = accounts.len();

        let users: Vec<DirectoryUser> = accounts
            .iter()
            .filter(|a| {
                let excluded = self.is_excluded(&a.name);
                if excluded {
                    debug!(name = %a.name, "Excluding account from reconciliation");
                }
                !excluded
            })
            .map(|a| a.to_directory_user(self.identity_field))
            .collect();

        info!(
            total,
            returned = users.len(),
            "Fetched local accounts"
        );
        Ok(users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::LocalFieldSchema;
    use crate::memory::InMemoryUserStore;

    #[tokio::test]
    async fn test_fetch_all_excludes_configured_names() {
        let store = Arc::new(InMemoryUserStore::new(LocalFieldSchema::default()));
        store.insert("admin", "admin@x.com").await;
        store.insert("jdoe", "jdoe@x.com").await;

        let directory =
            LocalDirectory::new(store, LocalIdentityField::Mail, vec!["Admin".to_string()]);
        let users = directory.fetch_all().await.unwrap();

        assert_eq!(users.len(), 1);
        assert_eq!(users[0].identity_key(), "jdoe@x.com");
    }

    #[tokio::test]
    async fn test_fetch_all_keys_on_name() {
        let store = Arc::new(InMemoryUserStore::new(LocalFieldSchema::default()));
        store.insert("jdoe", "jdoe@x.com").await;

        let directory = LocalDirectory::new(store, LocalIdentityField::Name, Vec::new());
        let users = directory.fetch_all().await.unwrap();
        assert_eq!(users[0].identity_key(), "jdoe");
        assert_eq!(users[0].attribute_str("mail"), Some("jdoe@x.com"));
    }

    #[tokio::test]
    async fn test_fetch_all_empty_store() {
        let store = Arc::new(InMemoryUserStore::new(LocalFieldSchema::default()));
        let directory = LocalDirectory::new(store, LocalIdentityField::Mail, Vec::new());
        assert!(directory.fetch_all().await.unwrap().is_empty());
    }
}
