//! Blob storage abstraction and backends for the memo build cache.
//!
//! This crate provides:
//! - An `ObjectStore` trait with ETag-versioned reads and conditional writes
//! - Backends: in-memory, local filesystem and S3-compatible

pub mod backends;
pub mod error;
pub mod traits;

pub use backends::{filesystem::FilesystemBackend, memory::MemoryBackend, s3::S3Backend};
pub use error::{StorageError, StorageResult};
pub use traits::{ETag, ObjectStore, PutCondition, VersionedObject};

use memo_core::config::StorageConfig;
use std::sync::Arc;

/// Create an object store from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn ObjectStore>> {
    config.validate().map_err(StorageError::Config)?;

    match config {
        StorageConfig::Memory => Ok(Arc::new(MemoryBackend::new())),
        StorageConfig::Filesystem { path } => {
            let backend = FilesystemBackend::new(path).await?;
            Ok(Arc::new(backend))
        }
        StorageConfig::S3 {
            bucket,
            endpoint,
            region,
            prefix,
            access_key_id,
            secret_access_key,
            force_path_style,
        } => {
            let backend = S3Backend::new(
                bucket,
                endpoint.clone(),
                region.clone(),
                prefix.clone(),
                access_key_id.clone(),
                secret_access_key.clone(),
                *force_path_style,
            )
            .await?;
            Ok(Arc::new(backend))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_filesystem_store_supports_conditional_writes() {
        let temp = tempdir().unwrap();
        let config = StorageConfig::Filesystem {
            path: temp.path().join("accounts/meta"),
        };

        let store = from_config(&config).await.unwrap();
        assert_eq!(store.backend_name(), "filesystem");
        let etag = store
            .put_conditional("records/w/s", Bytes::from_static(b"{}"), &PutCondition::IfNoneMatch)
            .await
            .unwrap();
        let err = store
            .put_conditional("records/w/s", Bytes::from_static(b"[]"), &PutCondition::IfNoneMatch)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::PreconditionFailed(_)), "{err:?}");
        assert_eq!(store.get("records/w/s").await.unwrap().etag, etag);
    }

    #[tokio::test]
    async fn test_memory_store_is_healthy() {
        let store = from_config(&StorageConfig::Memory).await.unwrap();
        assert_eq!(store.backend_name(), "memory");
        assert!(store.health_check().await.is_ok());
    }

    #[tokio::test]
    async fn test_s3_config_with_half_a_credential_pair_is_rejected() {
        let config = StorageConfig::S3 {
            bucket: "memo-meta".to_string(),
            endpoint: None,
            region: None,
            prefix: Some("universe".to_string()),
            access_key_id: Some("access".to_string()),
            secret_access_key: None,
            force_path_style: false,
        };

        let err = from_config(&config).await.err().expect("partial credentials");
        assert!(matches!(err, StorageError::Config(_)), "{err:?}");
    }
}
