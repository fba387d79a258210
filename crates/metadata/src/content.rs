//! Content session: the byte-store collaborator the memoization layer pins through.

use crate::error::{MetadataError, MetadataResult};
use async_trait::async_trait;
use bytes::Bytes;
use memo_core::ContentHash;
use memo_storage::{ObjectStore, StorageError};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Outcome of pinning one content hash.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PinResult {
    Success,
    NotFound,
    Error(String),
}

impl PinResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Access to the content store backing memoized outputs.
#[async_trait]
pub trait ContentSession: Send + Sync + 'static {
    /// Extend the lifetime of `hash` in the content store.
    async fn pin(&self, hash: &ContentHash) -> PinResult;

    /// Store `data` and return its hash.
    async fn put(&self, data: Bytes) -> MetadataResult<ContentHash>;

    /// Fetch the bytes for `hash`, if present.
    async fn get(&self, hash: &ContentHash) -> MetadataResult<Option<Bytes>>;
}

/// Content session over an object store, one blob per hash at `content/{hex}`.
#[derive(Clone)]
pub struct ObjectStoreContentSession {
    store: Arc<dyn ObjectStore>,
}

impl ObjectStoreContentSession {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    fn key(hash: &ContentHash) -> String {
        format!("content/{}", hash.to_hex())
    }
}

impl std::fmt::Debug for ObjectStoreContentSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStoreContentSession")
            .field("backend", &self.store.backend_name())
            .finish()
    }
}

#[async_trait]
impl ContentSession for ObjectStoreContentSession {
    #[instrument(skip(self), fields(hash = %hash))]
    async fn pin(&self, hash: &ContentHash) -> PinResult {
        // Object stores have no TTL of their own; presence is the pin.
        match self.store.exists(&Self::key(hash)).await {
            Ok(true) => PinResult::Success,
            Ok(false) => PinResult::NotFound,
            Err(e) => PinResult::Error(e.to_string()),
        }
    }

    #[instrument(skip(self, data), fields(size = data.len()))]
    async fn put(&self, data: Bytes) -> MetadataResult<ContentHash> {
        let hash = ContentHash::compute(&data);
        let key = Self::key(&hash);
        if self.store.exists(&key).await? {
            debug!(hash = %hash, "content already present");
            return Ok(hash);
        }
        self.store.put(&key, data).await?;
        Ok(hash)
    }

    #[instrument(skip(self), fields(hash = %hash))]
    async fn get(&self, hash: &ContentHash) -> MetadataResult<Option<Bytes>> {
        match self.store.get(&Self::key(hash)).await {
            Ok(object) => {
                if ContentHash::compute(&object.data) != *hash {
                    return Err(MetadataError::Content(format!(
                        "content for {hash} does not match its hash"
                    )));
                }
                Ok(Some(object.data))
            }
            Err(StorageError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memo_storage::MemoryBackend;

    #[tokio::test]
    async fn test_put_get_pin() {
        let session = ObjectStoreContentSession::new(Arc::new(MemoryBackend::new()));
        let hash = session.put(Bytes::from_static(b"output")).await.unwrap();
        assert_eq!(hash, ContentHash::compute(b"output"));
        assert_eq!(
            session.get(&hash).await.unwrap(),
            Some(Bytes::from_static(b"output"))
        );
        assert_eq!(session.pin(&hash).await, PinResult::Success);

        let missing = ContentHash::compute(b"missing");
        assert_eq!(session.pin(&missing).await, PinResult::NotFound);
        assert_eq!(session.get(&missing).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_get_detects_mismatched_content() {
        let backend = Arc::new(MemoryBackend::new());
        let hash = ContentHash::compute(b"expected");
        backend
            .put(
                &format!("content/{}", hash.to_hex()),
                Bytes::from_static(b"tampered"),
            )
            .await
            .unwrap();
        let session = ObjectStoreContentSession::new(backend);
        assert!(matches!(
            session.get(&hash).await,
            Err(MetadataError::Content(_))
        ));
    }
}
