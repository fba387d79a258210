//! Metadata store that keeps each record as a blob in sharded object storage.
//!
//! Keys are laid out as `{universe}/{namespace}/{weak-hex}/{selector-key}` in
//! the account the topology routes the strong fingerprint to. Atomicity comes
//! entirely from the backend's conditional writes.

use crate::error::{MetadataError, MetadataResult};
use crate::store::{
    CompareExchange, Expected, MetadataStore, SelectorEntry, SelectorQuery, shape_selectors,
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::future::join_all;
use memo_core::{
    Record, RecordBody, Selector, ShardAccount, ShardedTopology, StrongFingerprint,
    VersionToken, WeakFingerprint,
};
use memo_storage::{ETag, ObjectStore, PutCondition, StorageError};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Object stores keyed by the account they hold.
pub type AccountStores = HashMap<ShardAccount, Arc<dyn ObjectStore>>;

/// Blob-backed metadata store.
#[derive(Clone)]
pub struct BlobMetadataStore {
    topology: Arc<ShardedTopology>,
    accounts: Arc<AccountStores>,
}

impl std::fmt::Debug for BlobMetadataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobMetadataStore")
            .field("universe", &self.topology.universe())
            .field("namespace", &self.topology.namespace())
            .field("accounts", &self.accounts.len())
            .finish()
    }
}

impl BlobMetadataStore {
    /// Create a store. Every account in the topology needs a backend.
    pub fn new(topology: Arc<ShardedTopology>, accounts: AccountStores) -> MetadataResult<Self> {
        for account in topology.all_accounts() {
            if !accounts.contains_key(account) {
                return Err(MetadataError::Config(format!(
                    "no storage backend configured for account {account}"
                )));
            }
        }
        Ok(Self {
            topology,
            accounts: Arc::new(accounts),
        })
    }

    pub fn topology(&self) -> &ShardedTopology {
        &self.topology
    }

    fn weak_prefix(&self, weak: &WeakFingerprint) -> String {
        format!(
            "{}/{}/{}/",
            self.topology.universe(),
            self.topology.namespace(),
            weak.to_hex()
        )
    }

    /// Object key of the record for `key`.
    pub fn blob_key(&self, key: &StrongFingerprint) -> String {
        format!("{}{}", self.weak_prefix(&key.weak), key.selector.to_key())
    }

    fn store_for(&self, account: &ShardAccount) -> MetadataResult<&Arc<dyn ObjectStore>> {
        self.accounts.get(account).ok_or_else(|| {
            MetadataError::Config(format!("no storage backend configured for account {account}"))
        })
    }

    fn route(&self, key: &StrongFingerprint) -> MetadataResult<&Arc<dyn ObjectStore>> {
        self.store_for(self.topology.route(key))
    }

    fn decode(blob_key: &str, data: &[u8], etag: ETag) -> MetadataResult<Record> {
        let body = RecordBody::from_json(data).map_err(|e| MetadataError::Corrupt {
            key: blob_key.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Record {
            body,
            version: VersionToken::new(etag.into_string()),
        })
    }

    fn encode(replacement: &RecordBody) -> MetadataResult<Bytes> {
        replacement
            .to_json()
            .map(Bytes::from)
            .map_err(|e| MetadataError::Serialization(e.to_string()))
    }

    async fn read(
        &self,
        store: &Arc<dyn ObjectStore>,
        blob_key: &str,
    ) -> MetadataResult<Option<Record>> {
        match store.get(blob_key).await {
            Ok(object) => Self::decode(blob_key, &object.data, object.etag).map(Some),
            Err(StorageError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl MetadataStore for BlobMetadataStore {
    #[instrument(skip(self), fields(backend = "blob", fingerprint = %key))]
    async fn get(&self, key: &StrongFingerprint) -> MetadataResult<Option<Record>> {
        let store = self.route(key)?;
        self.read(store, &self.blob_key(key)).await
    }

    #[instrument(skip(self, replacement), fields(backend = "blob", fingerprint = %key))]
    async fn compare_exchange(
        &self,
        key: &StrongFingerprint,
        expected: &Expected,
        replacement: &RecordBody,
    ) -> MetadataResult<CompareExchange> {
        let data = Self::encode(replacement)?;
        let store = self.route(key)?;
        let blob_key = self.blob_key(key);
        let condition = match expected {
            Expected::Absent => PutCondition::IfNoneMatch,
            Expected::Version(version) => PutCondition::IfMatch(ETag::new(version.as_str())),
        };

        match store.put_conditional(&blob_key, data, &condition).await {
            Ok(etag) => Ok(CompareExchange::Succeeded(VersionToken::new(
                etag.into_string(),
            ))),
            Err(StorageError::PreconditionFailed(_)) => {
                debug!("compare-exchange precondition failed, re-reading");
                let current = self.read(store, &blob_key).await?;
                Ok(CompareExchange::Conflict(current))
            }
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self, replacement), fields(backend = "blob", fingerprint = %key))]
    async fn force_update(
        &self,
        key: &StrongFingerprint,
        replacement: &RecordBody,
    ) -> MetadataResult<VersionToken> {
        let data = Self::encode(replacement)?;
        let etag = self.route(key)?.put(&self.blob_key(key), data).await?;
        Ok(VersionToken::new(etag.into_string()))
    }

    #[instrument(skip(self), fields(backend = "blob", weak = %weak))]
    async fn get_selectors(
        &self,
        weak: &WeakFingerprint,
        query: &SelectorQuery,
    ) -> MetadataResult<Vec<SelectorEntry>> {
        let prefix = self.weak_prefix(weak);

        // Records for one weak fingerprint may live in any account of the ring.
        let mut stores = Vec::new();
        for account in self.topology.accounts() {
            stores.push(self.store_for(account)?.clone());
        }
        let listings = join_all(stores.iter().map(|store| store.list(&prefix))).await;

        let mut selectors = BTreeSet::new();
        for listing in listings {
            for blob_key in listing? {
                let Some(selector_key) = blob_key.strip_prefix(&prefix) else {
                    continue;
                };
                match Selector::from_key(selector_key) {
                    Ok(selector) => {
                        selectors.insert(selector);
                    }
                    Err(e) => {
                        warn!(key = %blob_key, error = %e, "skipping unparseable selector key")
                    }
                }
            }
        }

        let weak = *weak;
        shape_selectors(selectors.into_iter().collect(), query, |selector| async move {
            let key = StrongFingerprint::new(weak, selector);
            Ok(self.get(&key).await?.map(|record| record.body.value))
        })
        .await
    }

    fn namespace(&self) -> &str {
        self.topology.namespace()
    }

    fn with_namespace(&self, namespace: &str) -> MetadataResult<Arc<dyn MetadataStore>> {
        let topology = self.topology.with_namespace(namespace)?;
        Ok(Arc::new(Self {
            topology: Arc::new(topology),
            accounts: self.accounts.clone(),
        }))
    }

    fn backend_name(&self) -> &'static str {
        "blob"
    }

    async fn health_check(&self) -> MetadataResult<()> {
        for account in self.topology.all_accounts() {
            self.store_for(account)?.health_check().await?;
        }
        Ok(())
    }
}
