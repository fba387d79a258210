//! Storage trait definitions.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;

/// Backend-native version tag of a stored object.
///
/// Opaque to callers: two tags are only ever compared for equality, and only
/// by the backend that issued them.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ETag(String);

impl ETag {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ETag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An object's content together with the tag of that exact content.
#[derive(Clone, Debug)]
pub struct VersionedObject {
    pub data: Bytes,
    pub etag: ETag,
}

/// Precondition for a conditional write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PutCondition {
    /// Succeed only if the object currently carries this tag.
    IfMatch(ETag),
    /// Succeed only if no object exists under the key.
    IfNoneMatch,
}

/// Object store abstraction for metadata records and content blobs.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Check if an object exists.
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Get an object's content and version tag.
    ///
    /// Returns `StorageError::NotFound` if the key is absent.
    async fn get(&self, key: &str) -> StorageResult<VersionedObject>;

    /// Put an object unconditionally, replacing any previous content.
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<ETag>;

    /// Put an object only if `condition` holds at the moment of the write.
    ///
    /// Returns `StorageError::PreconditionFailed` without touching the stored
    /// object when the condition does not hold. A write is either fully
    /// visible or not at all.
    async fn put_conditional(
        &self,
        key: &str,
        data: Bytes,
        condition: &PutCondition,
    ) -> StorageResult<ETag>;

    /// Delete an object.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// List object keys under a prefix.
    ///
    /// Prefixes are expected to end at a `/` boundary.
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// Get the name of this storage backend.
    ///
    /// Returns a static string identifier for the backend type (e.g., "s3", "filesystem").
    /// Used for metrics and logging.
    fn backend_name(&self) -> &'static str;

    /// Verify storage backend connectivity.
    ///
    /// The default implementation returns Ok(()), suitable for backends that
    /// don't require connectivity verification.
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}
