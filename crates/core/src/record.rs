//! Metadata record model: content hash lists, determinism and versioned records.

use crate::hash::ContentHash;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;

/// Ordered output hashes of a build step. Order maps to output slots.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHashList(Vec<ContentHash>);

impl ContentHashList {
    pub fn new(hashes: Vec<ContentHash>) -> Self {
        Self(hashes)
    }

    pub fn hashes(&self) -> &[ContentHash] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ContentHash> {
        self.0.iter()
    }

    pub fn into_inner(self) -> Vec<ContentHash> {
        self.0
    }
}

impl From<Vec<ContentHash>> for ContentHashList {
    fn from(hashes: Vec<ContentHash>) -> Self {
        Self(hashes)
    }
}

impl<'a> IntoIterator for &'a ContentHashList {
    type Item = &'a ContentHash;
    type IntoIter = std::slice::Iter<'a, ContentHash>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Reproducibility guarantee attached to a stored record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Determinism {
    /// Unknown or non-deterministic.
    #[default]
    None,
    /// The producing tool is known to be deterministic.
    Tool,
    /// Valid only within a single build phase; never trusted across machines.
    SinglePhaseNonDeterministic,
}

impl Determinism {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Tool => "tool",
            Self::SinglePhaseNonDeterministic => "single_phase_non_deterministic",
        }
    }

    /// Relative strength of the guarantee.
    fn strength(&self) -> u8 {
        match self {
            Self::SinglePhaseNonDeterministic => 0,
            Self::None => 1,
            Self::Tool => 2,
        }
    }

    /// Whether a record carrying `self` may be overwritten by one carrying `incoming`
    /// even though their content differs.
    ///
    /// Single-phase records are always replaceable. Otherwise only a strictly
    /// stronger guarantee wins.
    pub fn should_be_replaced_with(&self, incoming: Determinism) -> bool {
        if *self == Self::SinglePhaseNonDeterministic {
            return true;
        }
        incoming.strength() > self.strength()
    }

    /// Two records with this pairing and different content are a data-integrity error.
    pub fn is_hard_conflict_with(&self, incoming: Determinism) -> bool {
        *self == Self::None && incoming == Self::None
    }
}

impl fmt::Display for Determinism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Determinism {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "none" => Ok(Self::None),
            "tool" => Ok(Self::Tool),
            "single_phase_non_deterministic" => Ok(Self::SinglePhaseNonDeterministic),
            other => Err(crate::Error::InvalidDeterminism(other.to_string())),
        }
    }
}

/// A content hash list together with its determinism tag.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentHashListWithDeterminism {
    pub content_hash_list: ContentHashList,
    #[serde(default)]
    pub determinism: Determinism,
}

impl ContentHashListWithDeterminism {
    pub fn new(content_hash_list: ContentHashList, determinism: Determinism) -> Self {
        Self {
            content_hash_list,
            determinism,
        }
    }
}

/// Opaque version of a stored record, produced by the backend (an ETag).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionToken(String);

impl VersionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The payload persisted for one strong fingerprint.
///
/// This is the exact unit written by a compare-exchange; there is no way to
/// update one field without rewriting the whole body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordBody {
    #[serde(flatten)]
    pub value: ContentHashListWithDeterminism,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_content_pinned_time: Option<OffsetDateTime>,
}

impl RecordBody {
    pub fn new(
        value: ContentHashListWithDeterminism,
        last_content_pinned_time: Option<OffsetDateTime>,
    ) -> Self {
        Self {
            value,
            last_content_pinned_time,
        }
    }

    pub fn to_json(&self) -> crate::Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| crate::Error::Serialization(e.to_string()))
    }

    pub fn from_json(data: &[u8]) -> crate::Result<Self> {
        serde_json::from_slice(data).map_err(|e| crate::Error::Serialization(e.to_string()))
    }
}

/// A stored record as observed by a reader, including its version.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    #[serde(flatten)]
    pub body: RecordBody,
    pub version: VersionToken,
}

impl Record {
    pub fn value(&self) -> &ContentHashListWithDeterminism {
        &self.body.value
    }

    pub fn content_hash_list(&self) -> &ContentHashList {
        &self.body.value.content_hash_list
    }

    pub fn determinism(&self) -> Determinism {
        self.body.value.determinism
    }

    pub fn last_content_pinned_time(&self) -> Option<OffsetDateTime> {
        self.body.last_content_pinned_time
    }
}
