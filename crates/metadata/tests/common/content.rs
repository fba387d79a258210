//! Content session doubles.

use async_trait::async_trait;
use bytes::Bytes;
use memo_core::ContentHash;
use memo_metadata::{ContentSession, MetadataResult, PinResult};
use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Counts pins and can be told to fail them.
#[allow(dead_code)]
#[derive(Debug, Default)]
pub struct CountingContentSession {
    pins: AtomicUsize,
    fail_pins: AtomicBool,
    missing: Mutex<HashSet<ContentHash>>,
}

#[allow(dead_code)]
impl CountingContentSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pin_count(&self) -> usize {
        self.pins.load(Ordering::SeqCst)
    }

    pub fn fail_pins(&self, fail: bool) {
        self.fail_pins.store(fail, Ordering::SeqCst);
    }

    pub fn mark_missing(&self, hash: ContentHash) {
        self.missing.lock().unwrap().insert(hash);
    }
}

#[async_trait]
impl ContentSession for CountingContentSession {
    async fn pin(&self, hash: &ContentHash) -> PinResult {
        self.pins.fetch_add(1, Ordering::SeqCst);
        if self.fail_pins.load(Ordering::SeqCst) {
            return PinResult::Error("content store unavailable".to_string());
        }
        if self.missing.lock().unwrap().contains(hash) {
            return PinResult::NotFound;
        }
        PinResult::Success
    }

    async fn put(&self, data: Bytes) -> MetadataResult<ContentHash> {
        Ok(ContentHash::compute(&data))
    }

    async fn get(&self, _hash: &ContentHash) -> MetadataResult<Option<Bytes>> {
        Ok(None)
    }
}
