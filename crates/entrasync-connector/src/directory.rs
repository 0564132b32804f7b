//! Normalized directory records.
//!
//! Every adapter reduces its native user representation to a
//! [`DirectoryUser`]: an identity key used for cross-directory matching and
//! a bag of attributes. Multi-valued attributes keep every value in order.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Normalizes an identity key for comparison.
///
/// Both sides of a reconciliation must use this function; any divergence
/// produces false mismatches.
#[must_use]
pub fn normalize_identity_key(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Value of a directory attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// A single string value.
    Single(String),
    /// An ordered list of values (phone numbers, proxy addresses, ...).
    Multi(Vec<String>),
}

impl AttributeValue {
    /// Returns true when the value carries no non-blank content.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Single(s) => s.trim().is_empty(),
            Self::Multi(values) => values.iter().all(|v| v.trim().is_empty()),
        }
    }

    /// Returns the value when it is single-valued.
    #[must_use]
    pub fn as_single(&self) -> Option<&str> {
        match self {
            Self::Single(s) => Some(s),
            Self::Multi(_) => None,
        }
    }

    /// Returns every value in order.
    #[must_use]
    pub fn values(&self) -> Vec<&str> {
        match self {
            Self::Single(s) => vec![s.as_str()],
            Self::Multi(values) => values.iter().map(String::as_str).collect(),
        }
    }

    /// Joins the non-blank values with `separator`.
    ///
    /// Single values are returned trimmed. Blank entries of a multi-valued
    /// attribute are dropped so `["a", "", "b"]` becomes `"a, b"`.
    #[must_use]
    pub fn flatten(&self, separator: &str) -> String {
        match self {
            Self::Single(s) => s.trim().to_string(),
            Self::Multi(values) => values
                .iter()
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .collect::<Vec<_>>()
                .join(separator),
        }
    }

    /// Converts to a multi-valued representation.
    #[must_use]
    pub fn into_multi(self) -> Vec<String> {
        match self {
            Self::Single(s) => vec![s],
            Self::Multi(values) => values,
        }
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        Self::Single(s)
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        Self::Single(s.to_string())
    }
}

impl From<Vec<String>> for AttributeValue {
    fn from(values: Vec<String>) -> Self {
        Self::Multi(values)
    }
}

/// A user record from either directory.
///
/// Built fresh on every reconciliation run and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryUser {
    identity_key: String,
    #[serde(default)]
    attributes: BTreeMap<String, AttributeValue>,
}

impl DirectoryUser {
    /// Creates a user with the given identity key and no attributes.
    pub fn new(identity_key: impl Into<String>) -> Self {
        Self {
            identity_key: identity_key.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Creates a user from an identity key and a full attribute map.
    pub fn with_attributes(
        identity_key: impl Into<String>,
        attributes: BTreeMap<String, AttributeValue>,
    ) -> Self {
        Self {
            identity_key: identity_key.into(),
            attributes,
        }
    }

    /// Adds an attribute using builder pattern.
    #[must_use]
    pub fn with_attribute(
        mut self,
        name: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Identity key as supplied by the source.
    #[must_use]
    pub fn identity_key(&self) -> &str {
        &self.identity_key
    }

    /// Identity key after normalization.
    #[must_use]
    pub fn normalized_key(&self) -> String {
        normalize_identity_key(&self.identity_key)
    }

    /// Looks up an attribute by source field name.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    /// Returns a single-valued attribute as a string slice.
    #[must_use]
    pub fn attribute_str(&self, name: &str) -> Option<&str> {
        self.attribute(name).and_then(AttributeValue::as_single)
    }

    /// All attributes, ordered by name.
    #[must_use]
    pub fn attributes(&self) -> &BTreeMap<String, AttributeValue> {
        &self.attributes
    }
}
