//! Metadata store doubles that misbehave on the write path.

use async_trait::async_trait;
use memo_core::{Record, RecordBody, StrongFingerprint, VersionToken, WeakFingerprint};
use memo_metadata::{
    CompareExchange, Expected, MetadataResult, MetadataStore, SelectorEntry, SelectorQuery,
};
use memo_storage::StorageError;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// How a [`FaultyStore`] treats compare-exchanges.
#[allow(dead_code)]
#[derive(Clone, Copy, Debug)]
pub enum WriteFault {
    /// Apply the first write, then report a transient error for it.
    LoseFirstAck,
    /// Apply the first write, then stall past any sane timeout.
    StallAfterFirstWrite,
    /// Never apply a write; always report a transient error.
    AlwaysFail,
}

/// Wraps a working store and injects [`WriteFault`]s into compare-exchanges.
#[allow(dead_code)]
pub struct FaultyStore {
    inner: Arc<dyn MetadataStore>,
    fault: WriteFault,
    writes: AtomicUsize,
}

#[allow(dead_code)]
impl FaultyStore {
    pub fn new(inner: Arc<dyn MetadataStore>, fault: WriteFault) -> Self {
        Self {
            inner,
            fault,
            writes: AtomicUsize::new(0),
        }
    }

    /// Compare-exchanges received, including failed ones.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

fn throttled() -> memo_metadata::MetadataError {
    StorageError::Io(std::io::Error::other("throttled")).into()
}

#[async_trait]
impl MetadataStore for FaultyStore {
    async fn get(&self, key: &StrongFingerprint) -> MetadataResult<Option<Record>> {
        self.inner.get(key).await
    }

    async fn compare_exchange(
        &self,
        key: &StrongFingerprint,
        expected: &Expected,
        replacement: &RecordBody,
    ) -> MetadataResult<CompareExchange> {
        let first = self.writes.fetch_add(1, Ordering::SeqCst) == 0;
        match self.fault {
            WriteFault::AlwaysFail => Err(throttled()),
            WriteFault::LoseFirstAck if first => {
                self.inner
                    .compare_exchange(key, expected, replacement)
                    .await?;
                Err(throttled())
            }
            WriteFault::StallAfterFirstWrite if first => {
                self.inner
                    .compare_exchange(key, expected, replacement)
                    .await?;
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(throttled())
            }
            _ => self.inner.compare_exchange(key, expected, replacement).await,
        }
    }

    async fn force_update(
        &self,
        key: &StrongFingerprint,
        replacement: &RecordBody,
    ) -> MetadataResult<VersionToken> {
        self.inner.force_update(key, replacement).await
    }

    async fn get_selectors(
        &self,
        weak: &WeakFingerprint,
        query: &SelectorQuery,
    ) -> MetadataResult<Vec<SelectorEntry>> {
        self.inner.get_selectors(weak, query).await
    }

    fn namespace(&self) -> &str {
        self.inner.namespace()
    }

    fn with_namespace(&self, namespace: &str) -> MetadataResult<Arc<dyn MetadataStore>> {
        self.inner.with_namespace(namespace)
    }

    fn backend_name(&self) -> &'static str {
        "faulty"
    }
}
