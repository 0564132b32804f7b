//! Field mapping types for account creation.
//!
//! Defines how identity-provider attributes map to local account fields,
//! which roles new accounts receive and which status they start in. The
//! configuration is validated against the local field schema at load time so
//! a typo in a target field is caught before any work item runs.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Initial status applied to newly created local accounts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    /// Account can log in immediately.
    Active,
    /// Account exists but cannot log in until an administrator unblocks it.
    #[default]
    Blocked,
}

impl AccountStatus {
    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Blocked => "blocked",
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AccountStatus {
    type Err = MappingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(AccountStatus::Active),
            "blocked" => Ok(AccountStatus::Blocked),
            other => Err(MappingError::UnknownStatus(other.to_string())),
        }
    }
}

/// Errors detected while validating a mapping configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingError {
    #[error("mapping target '{target}' (from '{source_field}') is not a local field")]
    UnknownTarget {
        source_field: String,
        target: String,
    },

    #[error("local field '{0}' is the target of more than one mapping")]
    DuplicateTarget(String),

    #[error("mapping source field must not be empty")]
    EmptySource,

    #[error("local field '{0}' is reserved for the identity fields")]
    ReservedTarget(String),

    #[error("unknown account status: {0}")]
    UnknownStatus(String),
}

/// A single provider-field to local-field mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    /// Source attribute name on the identity provider (e.g. `givenName`).
    pub source: String,

    /// Target field name on the local account.
    pub target: String,

    /// Whether an empty source value is a validation failure.
    #[serde(default)]
    pub required: bool,
}

impl FieldMapping {
    /// Create an optional mapping.
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            required: false,
        }
    }

    /// Create a required mapping.
    pub fn required(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            required: true,
            ..Self::new(source, target)
        }
    }
}

/// A field the local user store knows about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalFieldDefinition {
    pub name: String,
    #[serde(default)]
    pub multi_valued: bool,
}

impl LocalFieldDefinition {
    pub fn single(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            multi_valued: false,
        }
    }

    pub fn multi(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            multi_valued: true,
        }
    }
}

/// The set of custom fields local accounts carry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalFieldSchema {
    fields: Vec<LocalFieldDefinition>,
}

impl LocalFieldSchema {
    #[must_use]
    pub fn new(fields: Vec<LocalFieldDefinition>) -> Self {
        Self { fields }
    }

    /// Adds a field using builder pattern.
    #[must_use]
    pub fn with_field(mut self, field: LocalFieldDefinition) -> Self {
        self.fields.push(field);
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&LocalFieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    #[must_use]
    pub fn is_multi_valued(&self, name: &str) -> bool {
        self.get(name).is_some_and(|f| f.multi_valued)
    }

    #[must_use]
    pub fn fields(&self) -> &[LocalFieldDefinition] {
        &self.fields
    }
}

/// Identity fields every local account has outside the custom schema.
pub const RESERVED_FIELDS: &[&str] = &["name", "mail", "status", "roles", "password"];

/// Resolved field mapping snapshot handed to processors at construction time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMappingConfig {
    /// Provider-field to local-field mappings, applied in order.
    #[serde(default)]
    pub fields: Vec<FieldMapping>,

    /// Roles granted to every created account.
    #[serde(default)]
    pub roles: Vec<String>,

    /// Status new accounts start in.
    #[serde(default)]
    pub initial_status: AccountStatus,

    /// Send the account-created notification when the account starts active.
    #[serde(default)]
    pub notify_on_activation: bool,

    /// Separator used when a multi-valued attribute lands in a single-valued field.
    #[serde(default = "default_separator")]
    pub multi_value_separator: String,
}

fn default_separator() -> String {
    ", ".to_string()
}

impl Default for FieldMappingConfig {
    fn default() -> Self {
        Self {
            fields: Vec::new(),
            roles: Vec::new(),
            initial_status: AccountStatus::default(),
            notify_on_activation: false,
            multi_value_separator: default_separator(),
        }
    }
}

impl FieldMappingConfig {
    /// Check every mapping against the local schema.
    ///
    /// Returns every problem found rather than stopping at the first.
    pub fn validate(&self, schema: &LocalFieldSchema) -> Result<(), Vec<MappingError>> {
        let mut errors = Vec::new();
        let mut seen = HashSet::new();

        for mapping in &self.fields {
            if mapping.source.trim().is_empty() {
                errors.push(MappingError::EmptySource);
            }
            if RESERVED_FIELDS.contains(&mapping.target.as_str()) {
                errors.push(MappingError::ReservedTarget(mapping.target.clone()));
                continue;
            }
            if !schema.contains(&mapping.target) {
                errors.push(MappingError::UnknownTarget {
                    source_field: mapping.source.clone(),
                    target: mapping.target.clone(),
                });
            }
            if !seen.insert(mapping.target.as_str()) {
                errors.push(MappingError::DuplicateTarget(mapping.target.clone()));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Whether a freshly created account triggers the account-created notification.
    #[must_use]
    pub fn should_notify(&self) -> bool {
        self.initial_status == AccountStatus::Active && self.notify_on_activation
    }

    /// Source attribute names the mapping reads.
    #[must_use]
    pub fn source_fields(&self) -> Vec<&str> {
        self.fields.iter().map(|m| m.source.as_str()).collect()
    }
}
