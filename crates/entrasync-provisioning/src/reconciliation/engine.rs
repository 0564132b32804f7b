//! Three-way partition of two directories by identity key.
//!
//! Classification looks at nothing but the normalized key: attributes never
//! influence which bucket a record lands in.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use entrasync_connector::directory::{normalize_identity_key, DirectoryUser};

/// How repeated identity keys on one side are handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateKeyPolicy {
    /// Keep the last occurrence; earlier ones are reported as superseded.
    #[default]
    LastWins,
    /// Fail the partition naming every repeated key.
    Reject,
}

impl std::fmt::Display for DuplicateKeyPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LastWins => write!(f, "last_wins"),
            Self::Reject => write!(f, "reject"),
        }
    }
}

impl std::str::FromStr for DuplicateKeyPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "last_wins" => Ok(Self::LastWins),
            "reject" => Ok(Self::Reject),
            _ => Err(format!("Invalid duplicate key policy: {s}")),
        }
    }
}

/// Which input a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Source,
    Target,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Source => write!(f, "source"),
            Self::Target => write!(f, "target"),
        }
    }
}

/// The same identity seen on both sides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedPair {
    pub source: DirectoryUser,
    pub target: DirectoryUser,
}

/// A record left out of classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRecord {
    pub side: Side,
    pub user: DirectoryUser,
}

/// Repeated identity keys under [`DuplicateKeyPolicy::Reject`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Duplicate identity keys in {side} directory: {}", .keys.join(", "))]
pub struct DuplicateKeyError {
    pub side: Side,
    /// Normalized keys, sorted.
    pub keys: Vec<String>,
}

/// Outcome of [`partition`].
///
/// Every input record lands in exactly one of the five lists; a matched
/// pair accounts for one record from each side.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionResult {
    pub only_in_source: Vec<DirectoryUser>,
    pub only_in_target: Vec<DirectoryUser>,
    pub in_both: Vec<MatchedPair>,
    /// Earlier records shadowed by a later one with the same key.
    pub superseded: Vec<SkippedRecord>,
    /// Records whose key normalizes to the empty string.
    pub rejected: Vec<SkippedRecord>,
}

impl PartitionResult {
    #[must_use]
    pub fn summary(&self) -> PartitionSummary {
        PartitionSummary {
            only_in_source: self.only_in_source.len(),
            only_in_target: self.only_in_target.len(),
            in_both: self.in_both.len(),
            superseded: self.superseded.len(),
            rejected: self.rejected.len(),
        }
    }

    /// Whether the two sides hold exactly the same identities.
    #[must_use]
    pub fn is_in_sync(&self) -> bool {
        self.only_in_source.is_empty() && self.only_in_target.is_empty()
    }
}

/// Bucket sizes of a partition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionSummary {
    pub only_in_source: usize,
    pub only_in_target: usize,
    pub in_both: usize,
    pub superseded: usize,
    pub rejected: usize,
}

/// Partition using each record's own identity key.
pub fn partition(
    source: Vec<DirectoryUser>,
    target: Vec<DirectoryUser>,
    policy: DuplicateKeyPolicy,
) -> Result<PartitionResult, DuplicateKeyError> {
    partition_by(
        source,
        target,
        |u| u.identity_key().to_string(),
        |u| u.identity_key().to_string(),
        policy,
    )
}

/// Partition with explicit key extractors for each side.
///
/// Both extractors' output goes through the same normalization, so the
/// sides may use different fields (a principal name on one, an email on
/// the other). Runs in O(n + m). Input order is kept within each bucket.
pub fn partition_by<FS, FT>(
    source: Vec<DirectoryUser>,
    target: Vec<DirectoryUser>,
    source_key: FS,
    target_key: FT,
    policy: DuplicateKeyPolicy,
) -> Result<PartitionResult, DuplicateKeyError>
where
    FS: Fn(&DirectoryUser) -> String,
    FT: Fn(&DirectoryUser) -> String,
{
    let mut result = PartitionResult::default();
    let source = KeyedSide::build(source, source_key, Side::Source, policy, &mut result)?;
    let mut target = KeyedSide::build(target, target_key, Side::Target, policy, &mut result)?;

    for (key, user) in source.entries.into_iter().flatten() {
        match target.take(&key) {
            Some(matched) => result.in_both.push(MatchedPair {
                source: user,
                target: matched,
            }),
            None => result.only_in_source.push(user),
        }
    }
    result.only_in_target = target
        .entries
        .into_iter()
        .flatten()
        .map(|(_, user)| user)
        .collect();

    Ok(result)
}

/// One side with unique keys, in first-seen order.
struct KeyedSide {
    entries: Vec<Option<(String, DirectoryUser)>>,
    index: HashMap<String, usize>,
}

impl KeyedSide {
    fn build<F>(
        users: Vec<DirectoryUser>,
        key_of: F,
        side: Side,
        policy: DuplicateKeyPolicy,
        result: &mut PartitionResult,
    ) -> Result<Self, DuplicateKeyError>
    where
        F: Fn(&DirectoryUser) -> String,
    {
        let mut entries: Vec<Option<(String, DirectoryUser)>> = Vec::with_capacity(users.len());
        let mut index: HashMap<String, usize> = HashMap::with_capacity(users.len());
        let mut duplicates = BTreeSet::new();

        for user in users {
            let key = normalize_identity_key(&key_of(&user));
            if key.is_empty() {
                result.rejected.push(SkippedRecord { side, user });
                continue;
            }

            if let Some(&slot) = index.get(&key) {
                duplicates.insert(key.clone());
                if let Some((_, previous)) = entries[slot].replace((key, user)) {
                    result.superseded.push(SkippedRecord {
                        side,
                        user: previous,
                    });
                }
            } else {
                index.insert(key.clone(), entries.len());
                entries.push(Some((key, user)));
            }
        }

        if policy == DuplicateKeyPolicy::Reject && !duplicates.is_empty() {
            return Err(DuplicateKeyError {
                side,
                keys: duplicates.into_iter().collect(),
            });
        }

        Ok(Self { entries, index })
    }

    fn take(&mut self, key: &str) -> Option<DirectoryUser> {
        let slot = *self.index.get(key)?;
        self.entries[slot].take().map(|(_, user)| user)
    }
}
