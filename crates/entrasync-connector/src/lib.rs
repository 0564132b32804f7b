//! # Directory Connector Framework
//!
//! Core abstractions shared by every entrasync directory adapter.
//!
//! This crate defines the normalized user record both directories are
//! reduced to, the traits adapters and the local user store implement, and
//! the field mapping that drives account creation.
//!
//! ## Architecture
//!
//! - [`DirectorySource`] - Yields every user of one directory as a [`DirectoryUser`]
//! - [`LocalUserStore`] - The application's own accounts, with atomic create-if-absent
//! - [`FieldSetter`] - Typed target for field-mapping-driven writes
//! - [`AccountNotifier`] - Account-created notification side effect
//!
//! ## Example
//!
//! ```
//! use entrasync_connector::prelude::*;
//!
//! let user = DirectoryUser::new("Jane.Doe@Example.com")
//!     .with_attribute("givenName", "Jane")
//!     .with_attribute(
//!         "businessPhones",
//!         AttributeValue::Multi(vec!["+47 1".into(), "+47 2".into()]),
//!     );
//!
//! assert_eq!(user.normalized_key(), "jane.doe@example.com");
//! assert_eq!(
//!     user.attribute("businessPhones").map(|v| v.flatten(", ")),
//!     Some("+47 1, +47 2".to_string())
//! );
//! ```
//!
//! ## Crate Organization
//!
//! - [`directory`] - `DirectoryUser`, `AttributeValue`, key normalization
//! - [`account`] - Local accounts and the new-account builder
//! - [`mapping`] - Field mapping configuration and local field schema
//! - [`traits`] - Adapter and store traits
//! - [`local`] - Local store exposed as a directory source
//! - [`memory`] - In-memory store and notifier implementations
//! - [`error`] - Fetch and store errors with retry classification

pub mod account;
pub mod directory;
pub mod error;
pub mod local;
pub mod mapping;
pub mod memory;
pub mod traits;

/// Prelude module for convenient imports.
///
/// ```
/// use entrasync_connector::prelude::*;
/// ```
pub mod prelude {
    pub use crate::account::{validate_email, LocalAccount, LocalIdentityField, NewLocalAccount};
    pub use crate::directory::{normalize_identity_key, AttributeValue, DirectoryUser};
    pub use crate::error::{FetchError, FetchResult, StoreError, StoreResult};
    pub use crate::local::LocalDirectory;
    pub use crate::mapping::{
        AccountStatus, FieldMapping, FieldMappingConfig, LocalFieldDefinition, LocalFieldSchema,
        MappingError,
    };
    pub use crate::memory::{InMemoryUserStore, LoggingNotifier, RecordingNotifier};
    pub use crate::traits::{AccountNotifier, DirectorySource, FieldSetter, LocalUserStore};
}

// Re-export async_trait for adapter implementors
pub use async_trait::async_trait;

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn test_prelude_imports() {
        let _user = DirectoryUser::new("a@x.com");
        let _status = AccountStatus::Blocked;
        let _field = LocalIdentityField::Mail;
        let _schema = LocalFieldSchema::default();
        let _value = AttributeValue::from("x");
    }
}
