//! Metadata store trait and shared operation types.

use crate::error::MetadataResult;
use async_trait::async_trait;
use memo_core::{
    ContentHashListWithDeterminism, Record, RecordBody, Selector, StrongFingerprint,
    VersionToken, WeakFingerprint,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Precondition of a compare-exchange.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Expected {
    /// No record may exist yet.
    Absent,
    /// The record must still carry this version.
    Version(VersionToken),
}

impl Expected {
    pub fn from_version(version: Option<VersionToken>) -> Self {
        match version {
            Some(v) => Self::Version(v),
            None => Self::Absent,
        }
    }

    /// Whether `current` still satisfies this precondition.
    pub fn holds_for(&self, current: Option<&Record>) -> bool {
        match (self, current) {
            (Self::Absent, None) => true,
            (Self::Version(version), Some(record)) => record.version == *version,
            _ => false,
        }
    }
}

/// Outcome of a compare-exchange. A failed precondition is a value, not an error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CompareExchange {
    /// The replacement was written and now carries this version.
    Succeeded(VersionToken),
    /// The precondition did not hold. Carries the record as it was re-read.
    Conflict(Option<Record>),
}

impl CompareExchange {
    pub fn succeeded(&self) -> bool {
        matches!(self, Self::Succeeded(_))
    }
}

/// The three ways selectors for a weak fingerprint can be fetched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectorQuery {
    /// Every selector, no content hash lists.
    All,
    /// At most `max_selectors` selectors, no content hash lists.
    SelectorsOnly { max_selectors: usize },
    /// At most `max_selectors` selectors; the first `max_content_bags` of them
    /// also carry their content hash list.
    WithContentBags {
        max_selectors: usize,
        max_content_bags: usize,
    },
}

impl SelectorQuery {
    /// Map optional wire parameters onto a fetch shape.
    pub fn from_limits(max_selectors: Option<usize>, max_content_bags: Option<usize>) -> Self {
        match (max_selectors, max_content_bags) {
            (None, None) => Self::All,
            (Some(max_selectors), None) => Self::SelectorsOnly { max_selectors },
            (max_selectors, Some(max_content_bags)) => Self::WithContentBags {
                max_selectors: max_selectors.unwrap_or(usize::MAX),
                max_content_bags,
            },
        }
    }

    pub fn max_selectors(&self) -> Option<usize> {
        match self {
            Self::All => None,
            Self::SelectorsOnly { max_selectors } | Self::WithContentBags { max_selectors, .. } => {
                Some(*max_selectors)
            }
        }
    }

    pub fn max_content_bags(&self) -> usize {
        match self {
            Self::WithContentBags {
                max_content_bags, ..
            } => *max_content_bags,
            _ => 0,
        }
    }
}

/// One selector found under a weak fingerprint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorEntry {
    pub selector: Selector,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<ContentHashListWithDeterminism>,
}

/// Point lookup and atomic compare-exchange over fingerprint records.
#[async_trait]
pub trait MetadataStore: Send + Sync + 'static {
    /// Get the record stored for `key`, if any.
    async fn get(&self, key: &StrongFingerprint) -> MetadataResult<Option<Record>>;

    /// Write `replacement` only if `expected` still describes the stored record.
    async fn compare_exchange(
        &self,
        key: &StrongFingerprint,
        expected: &Expected,
        replacement: &RecordBody,
    ) -> MetadataResult<CompareExchange>;

    /// Overwrite the record without any precondition.
    ///
    /// Reserved for trusted maintenance paths.
    async fn force_update(
        &self,
        key: &StrongFingerprint,
        replacement: &RecordBody,
    ) -> MetadataResult<VersionToken>;

    /// Selectors stored under a weak fingerprint, ordered by selector.
    async fn get_selectors(
        &self,
        weak: &WeakFingerprint,
        query: &SelectorQuery,
    ) -> MetadataResult<Vec<SelectorEntry>>;

    /// Namespace this store reads and writes.
    fn namespace(&self) -> &str;

    /// A store over the same backends serving another namespace.
    fn with_namespace(&self, namespace: &str) -> MetadataResult<Arc<dyn MetadataStore>>;

    /// Static identifier for logging and metrics.
    fn backend_name(&self) -> &'static str;

    /// Check backend connectivity and health.
    async fn health_check(&self) -> MetadataResult<()> {
        Ok(())
    }
}

/// Apply a fetch shape to a sorted selector list, fetching values as needed.
pub(crate) async fn shape_selectors<F, Fut>(
    selectors: Vec<Selector>,
    query: &SelectorQuery,
    mut fetch: F,
) -> MetadataResult<Vec<SelectorEntry>>
where
    F: FnMut(Selector) -> Fut,
    Fut: std::future::Future<Output = MetadataResult<Option<ContentHashListWithDeterminism>>>,
{
    let limit = query.max_selectors().unwrap_or(usize::MAX);
    let bags = query.max_content_bags();
    let mut entries = Vec::with_capacity(selectors.len().min(limit));
    for (i, selector) in selectors.into_iter().take(limit).enumerate() {
        let value = if i < bags {
            fetch(selector.clone()).await?
        } else {
            None
        };
        entries.push(SelectorEntry { selector, value });
    }
    Ok(entries)
}
