//! Idempotency keys for work items.
//!
//! Two dispatches of the same record into the same category produce the
//! same key, so a queue can refuse the second while the first is still
//! outstanding.

use sha2::{Digest, Sha256};

use entrasync_connector::directory::normalize_identity_key;

use crate::queue::WorkCategory;

/// SHA-256 over the category name and the normalized identity key,
/// hex-encoded (64 characters).
#[must_use]
pub fn idempotency_key(category: WorkCategory, identity_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(category.as_str().as_bytes());
    hasher.update(b":");
    hasher.update(normalize_identity_key(identity_key).as_bytes());
    hex::encode(hasher.finalize())
}
