//! In-process storage backend.

use crate::error::{StorageError, StorageResult};
use crate::traits::{ETag, ObjectStore, PutCondition, VersionedObject};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::instrument;

#[derive(Clone, Debug)]
struct StoredObject {
    data: Bytes,
    generation: u64,
}

impl StoredObject {
    fn etag(&self) -> ETag {
        ETag::new(format!("\"{}\"", self.generation))
    }
}

/// Object store kept entirely in memory.
///
/// Conditional writes are decided while holding the map shard lock for the
/// key, so they are atomic with respect to every other writer in the process.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    objects: DashMap<String, StoredObject>,
    generation: AtomicU64,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryBackend {
    #[instrument(skip(self), fields(backend = "memory"))]
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        Ok(self.objects.contains_key(key))
    }

    #[instrument(skip(self), fields(backend = "memory"))]
    async fn get(&self, key: &str) -> StorageResult<VersionedObject> {
        let object = self
            .objects
            .get(key)
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;
        Ok(VersionedObject {
            data: object.data.clone(),
            etag: object.etag(),
        })
    }

    #[instrument(skip(self, data), fields(backend = "memory", size = data.len()))]
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<ETag> {
        let object = StoredObject {
            data,
            generation: self.next_generation(),
        };
        let etag = object.etag();
        self.objects.insert(key.to_string(), object);
        Ok(etag)
    }

    #[instrument(skip(self, data), fields(backend = "memory", size = data.len()))]
    async fn put_conditional(
        &self,
        key: &str,
        data: Bytes,
        condition: &PutCondition,
    ) -> StorageResult<ETag> {
        match (self.objects.entry(key.to_string()), condition) {
            (Entry::Vacant(slot), PutCondition::IfNoneMatch) => {
                let object = StoredObject {
                    data,
                    generation: self.next_generation(),
                };
                let etag = object.etag();
                slot.insert(object);
                Ok(etag)
            }
            (Entry::Occupied(mut slot), PutCondition::IfMatch(expected))
                if slot.get().etag() == *expected =>
            {
                let object = StoredObject {
                    data,
                    generation: self.next_generation(),
                };
                let etag = object.etag();
                slot.insert(object);
                Ok(etag)
            }
            _ => Err(StorageError::PreconditionFailed(key.to_string())),
        }
    }

    #[instrument(skip(self), fields(backend = "memory"))]
    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.objects
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    #[instrument(skip(self), fields(backend = "memory"))]
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let mut keys: Vec<String> = self
            .objects
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
