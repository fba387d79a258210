//! JSON bodies of the build-cache HTTP API, shared by server and client.

use crate::store::SelectorEntry;
use memo_core::{ContentHashList, Determinism, Record, RecordBody, VersionToken};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Body of `POST /v1/{namespace}/content-hash-lists/{weak}/{selector}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddContentHashListRequest {
    pub content_hash_list: ContentHashList,
    #[serde(default)]
    pub determinism: Determinism,
    /// Overwrite without the optimistic check.
    #[serde(default)]
    pub force_update: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddOutcomeKind {
    Added,
    Replaced,
    Unchanged,
    Existing,
    Forced,
}

/// Response of AddContentHashList. `record` is what is now stored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddContentHashListResponse {
    pub outcome: AddOutcomeKind,
    pub record: Record,
}

/// Body of `POST .../compare-exchange`. `expected: null` means the record must not exist.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompareExchangeRequest {
    #[serde(default)]
    pub expected: Option<VersionToken>,
    pub replacement: RecordBody,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompareExchangeResponse {
    pub version: VersionToken,
}

/// 409 body of a compare-exchange whose precondition failed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictResponse {
    pub current: Option<Record>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorsResponse {
    pub selectors: Vec<SelectorEntry>,
}

/// Query string of `GET /v1/{namespace}/selectors/{weak}`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorsParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_selectors: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_content_bags: Option<usize>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub backend: String,
    #[serde(with = "time::serde::rfc3339")]
    pub checked_at: OffsetDateTime,
}

/// Error body rendered for every non-2xx response other than a compare-exchange conflict.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

pub const CODE_DETERMINISM_CONFLICT: &str = "determinism_conflict";
pub const CODE_RETRIES_EXHAUSTED: &str = "retries_exhausted";
