//! Fixtures for building stores, fingerprints and values.

use memo_core::{
    ContentHash, ContentHashList, ContentHashListWithDeterminism, Determinism, ManualClock,
    Selector, ShardAccount, ShardedTopology, ShardingAlgorithm, StrongFingerprint,
    WeakFingerprint,
};
use memo_metadata::{AccountStores, BlobMetadataStore, MetadataStore};
use memo_storage::{FilesystemBackend, MemoryBackend, ObjectStore};
use std::path::Path;
use std::sync::Arc;
use time::macros::datetime;

/// Sharding accounts `md0test`, `md1test`, ...
#[allow(dead_code)]
pub fn sharding_accounts(shards: u32) -> Vec<ShardAccount> {
    (0..shards)
        .map(|i| ShardAccount::sharding("md", i, "test"))
        .collect()
}

/// A blob store over `shards` in-memory accounts, plus the per-account backends.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub fn memory_blob_store(shards: u32) -> (Arc<BlobMetadataStore>, AccountStores) {
    let accounts = sharding_accounts(shards);
    let topology = ShardedTopology::new(
        "universe",
        "default",
        ShardingAlgorithm::JumpHash,
        accounts.clone(),
        Vec::<String>::new(),
    )
    .expect("valid topology");
    let stores: AccountStores = accounts
        .into_iter()
        .map(|account| {
            let backend: Arc<dyn ObjectStore> = Arc::new(MemoryBackend::new());
            (account, backend)
        })
        .collect();
    let store = BlobMetadataStore::new(Arc::new(topology), stores.clone()).expect("valid store");
    (Arc::new(store), stores)
}

/// A blob store over `shards` filesystem accounts rooted under `dir`.
#[allow(dead_code)]
pub async fn filesystem_blob_store(shards: u32, dir: &Path) -> Arc<dyn MetadataStore> {
    let accounts = sharding_accounts(shards);
    let topology = ShardedTopology::new(
        "universe",
        "default",
        ShardingAlgorithm::JumpHash,
        accounts.clone(),
        Vec::<String>::new(),
    )
    .expect("valid topology");
    let mut stores = AccountStores::new();
    for account in accounts {
        let backend: Arc<dyn ObjectStore> = Arc::new(
            FilesystemBackend::new(dir.join(account.name()))
                .await
                .expect("filesystem backend"),
        );
        stores.insert(account, backend);
    }
    Arc::new(BlobMetadataStore::new(Arc::new(topology), stores).expect("valid store"))
}

#[allow(dead_code)]
pub fn fingerprint(weak: &str, selector: &str) -> StrongFingerprint {
    StrongFingerprint::new(
        WeakFingerprint::compute(weak.as_bytes()),
        Selector::new(ContentHash::compute(selector.as_bytes()), None),
    )
}

#[allow(dead_code)]
pub fn hashes(seeds: &[&str]) -> Vec<ContentHash> {
    seeds
        .iter()
        .map(|seed| ContentHash::compute(seed.as_bytes()))
        .collect()
}

#[allow(dead_code)]
pub fn value(seeds: &[&str], determinism: Determinism) -> ContentHashListWithDeterminism {
    ContentHashListWithDeterminism::new(ContentHashList::new(hashes(seeds)), determinism)
}

/// A manual clock starting at a fixed instant.
#[allow(dead_code)]
pub fn manual_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(datetime!(2024-03-01 12:00 UTC)))
}
