//! Local account model.
//!
//! [`LocalAccount`] is what the local user store holds. [`NewLocalAccount`]
//! is the builder processors fill through the [`FieldSetter`] interface
//! before handing it to [`LocalUserStore::create_if_absent`].
//!
//! [`LocalUserStore::create_if_absent`]: crate::traits::LocalUserStore::create_if_absent

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::directory::{normalize_identity_key, AttributeValue, DirectoryUser};
use crate::error::{StoreError, StoreResult};
use crate::mapping::{AccountStatus, LocalFieldSchema};
use crate::traits::FieldSetter;

/// Which local account field correlates with the provider identity key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalIdentityField {
    /// The account email address.
    #[default]
    Mail,
    /// The account username.
    Name,
}

/// An account in the local user store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalAccount {
    pub id: i64,
    pub name: String,
    pub mail: String,
    pub status: AccountStatus,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub fields: BTreeMap<String, AttributeValue>,
    pub created_at: DateTime<Utc>,
}

impl LocalAccount {
    /// Value of the field used for correlation.
    #[must_use]
    pub fn identity_value(&self, field: LocalIdentityField) -> &str {
        match field {
            LocalIdentityField::Mail => &self.mail,
            LocalIdentityField::Name => &self.name,
        }
    }

    /// Whether the account answers to `identity_key` by name or mail.
    #[must_use]
    pub fn matches_identity(&self, identity_key: &str) -> bool {
        let key = normalize_identity_key(identity_key);
        normalize_identity_key(&self.name) == key || normalize_identity_key(&self.mail) == key
    }

    /// Convert into a directory record keyed on `field`.
    ///
    /// Custom fields become attributes alongside `name` and `mail`.
    #[must_use]
    pub fn to_directory_user(&self, field: LocalIdentityField) -> DirectoryUser {
        let mut attributes = self.fields.clone();
        attributes.insert("name".to_string(), AttributeValue::from(self.name.as_str()));
        attributes.insert("mail".to_string(), AttributeValue::from(self.mail.as_str()));
        attributes.insert(
            "status".to_string(),
            AttributeValue::from(self.status.as_str()),
        );
        DirectoryUser::with_attributes(self.identity_value(field), attributes)
    }
}

/// A minimal structural email check.
///
/// Exactly one `@`, a non-empty local part, and a dotted domain without
/// whitespace.
#[must_use]
pub fn validate_email(mail: &str) -> bool {
    let mut parts = mail.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    !local.is_empty()
        && !mail.chars().any(char::is_whitespace)
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

/// Account under construction.
///
/// Custom field writes are checked against the schema the builder was
/// created with. Multi-valued values written to a single-valued field are
/// joined with the configured separator; single values written to a
/// multi-valued field are wrapped.
#[derive(Debug, Clone)]
pub struct NewLocalAccount {
    name: String,
    mail: String,
    password_hash: String,
    status: AccountStatus,
    roles: Vec<String>,
    fields: BTreeMap<String, AttributeValue>,
    schema: LocalFieldSchema,
    separator: String,
}

impl NewLocalAccount {
    /// Start a new account with its identity fields.
    pub fn new(
        name: impl Into<String>,
        mail: impl Into<String>,
        schema: LocalFieldSchema,
        separator: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            mail: mail.into(),
            password_hash: String::new(),
            status: AccountStatus::Blocked,
            roles: Vec::new(),
            fields: BTreeMap::new(),
            schema,
            separator: separator.into(),
        }
    }

    pub fn set_password_hash(&mut self, hash: impl Into<String>) {
        self.password_hash = hash.into();
    }

    pub fn set_status(&mut self, status: AccountStatus) {
        self.status = status;
    }

    /// Grant a role. Duplicates are ignored.
    pub fn add_role(&mut self, role: impl Into<String>) {
        let role = role.into();
        if !self.roles.contains(&role) {
            self.roles.push(role);
        }
    }

    /// Check the identity fields before persisting.
    pub fn validate(&self) -> StoreResult<()> {
        if self.name.trim().is_empty() {
            return Err(StoreError::Validation("username is empty".to_string()));
        }
        if !validate_email(&self.mail) {
            return Err(StoreError::Validation(format!(
                "invalid email address '{}'",
                self.mail
            )));
        }
        if self.password_hash.is_empty() {
            return Err(StoreError::Validation("no credential set".to_string()));
        }
        Ok(())
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn mail(&self) -> &str {
        &self.mail
    }

    #[must_use]
    pub fn password_hash(&self) -> &str {
        &self.password_hash
    }

    #[must_use]
    pub fn status(&self) -> AccountStatus {
        self.status
    }

    #[must_use]
    pub fn roles(&self) -> &[String] {
        &self.roles
    }

    #[must_use]
    pub fn fields(&self) -> &BTreeMap<String, AttributeValue> {
        &self.fields
    }

    /// Materialize a stored account with the given id.
    #[must_use]
    pub fn into_account(self, id: i64, created_at: DateTime<Utc>) -> LocalAccount {
        LocalAccount {
            id,
            name: self.name,
            mail: self.mail,
            status: self.status,
            roles: self.roles,
            fields: self.fields,
            created_at,
        }
    }
}

impl FieldSetter for NewLocalAccount {
    fn supports_field(&self, name: &str) -> bool {
        self.schema.contains(name)
    }

    fn set_field(&mut self, name: &str, value: AttributeValue) -> StoreResult<()> {
        let Some(definition) = self.schema.get(name) else {
            return Err(StoreError::UnknownField(name.to_string()));
        };
        let stored = match (definition.multi_valued, value) {
            (true, value) => AttributeValue::Multi(
                value
                    .into_multi()
                    .into_iter()
                    .filter(|v| !v.trim().is_empty())
                    .collect(),
            ),
            (false, value) => AttributeValue::Single(value.flatten(&self.separator)),
        };
        self.fields.insert(name.to_string(), stored);
        Ok(())
    }
}
