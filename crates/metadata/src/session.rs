//! Caller-facing memoization session.

use crate::content::ContentSession;
use crate::database::{AddOutcome, MemoizationDatabase};
use crate::error::{MetadataError, MetadataResult};
use crate::store::{SelectorEntry, SelectorQuery};
use bytes::Bytes;
use futures::future::try_join_all;
use memo_core::{
    ContentHashList, ContentHashListWithDeterminism, StrongFingerprint, WeakFingerprint,
};
use std::sync::Arc;
use tracing::{instrument, warn};

/// Result of a session lookup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Lookup {
    Hit(ContentHashListWithDeterminism),
    Miss,
}

impl Lookup {
    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit(_))
    }
}

/// A named session binding a memoization database to a content session.
#[derive(Clone)]
pub struct MemoizationSession {
    name: String,
    database: Arc<MemoizationDatabase>,
    content: Arc<dyn ContentSession>,
}

impl std::fmt::Debug for MemoizationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoizationSession")
            .field("name", &self.name)
            .field("database", &self.database)
            .finish_non_exhaustive()
    }
}

impl MemoizationSession {
    pub fn new(
        name: impl Into<String>,
        database: Arc<MemoizationDatabase>,
        content: Arc<dyn ContentSession>,
    ) -> Self {
        Self {
            name: name.into(),
            database,
            content,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn database(&self) -> &Arc<MemoizationDatabase> {
        &self.database
    }

    pub fn content(&self) -> &Arc<dyn ContentSession> {
        &self.content
    }

    #[instrument(skip(self), fields(session = %self.name, fingerprint = %key))]
    pub async fn get_or_none(&self, key: &StrongFingerprint) -> MetadataResult<Lookup> {
        let result = self
            .database
            .get_and_refresh(key, self.content.as_ref())
            .await?;
        if let Some(warning) = &result.warning {
            warn!(%warning, "serving memoization hit with unrefreshed content");
        }
        Ok(match result.record {
            Some(record) => Lookup::Hit(record.body.value),
            None => Lookup::Miss,
        })
    }

    pub async fn add_or_replace(
        &self,
        key: &StrongFingerprint,
        value: &ContentHashListWithDeterminism,
    ) -> MetadataResult<AddOutcome> {
        self.database.add_or_replace(key, value).await
    }

    pub async fn get_selectors(
        &self,
        weak: &WeakFingerprint,
        query: &SelectorQuery,
    ) -> MetadataResult<Vec<SelectorEntry>> {
        self.database.get_selectors(weak, query).await
    }

    /// Fetch the bytes of every entry of `list`, in list order.
    #[instrument(skip(self, list), fields(session = %self.name, len = list.len()))]
    pub async fn materialize(&self, list: &ContentHashList) -> MetadataResult<Vec<Bytes>> {
        try_join_all(list.iter().map(|hash| async move {
            self.content.get(hash).await?.ok_or_else(|| {
                MetadataError::Content(format!("content {hash} is not available"))
            })
        }))
        .await
    }
}
