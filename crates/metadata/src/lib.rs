//! Metadata layer of the memo build cache.
//!
//! This crate provides:
//! - A `MetadataStore` trait with atomic compare-exchange over fingerprint records
//! - A blob-backed store routed through a sharded topology, and a remote HTTP store
//! - The memoization database (retention and preventive pinning)
//! - The caller-facing memoization session

pub mod blob;
pub mod content;
pub mod database;
pub mod error;
pub mod remote;
pub mod session;
pub mod store;
pub mod wire;

pub use blob::{AccountStores, BlobMetadataStore};
pub use content::{ContentSession, ObjectStoreContentSession, PinResult};
pub use database::{AddOutcome, LookupResult, MemoizationDatabase};
pub use error::{MetadataError, MetadataResult};
pub use remote::RemoteMetadataStore;
pub use session::{Lookup, MemoizationSession};
pub use store::{CompareExchange, Expected, MetadataStore, SelectorEntry, SelectorQuery};

use memo_core::config::MetadataBackendConfig;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Create a metadata store from configuration.
pub async fn from_config(
    config: &MetadataBackendConfig,
) -> MetadataResult<Arc<dyn MetadataStore>> {
    config.validate().map_err(MetadataError::Config)?;

    match config {
        MetadataBackendConfig::Blob(topology_config) => {
            let topology = topology_config.build(&topology_config.namespace)?;
            let mut accounts: AccountStores = HashMap::new();
            for account in &topology_config.accounts {
                let store = memo_storage::from_config(&account.storage).await?;
                accounts.insert(account.account.clone(), store);
            }
            tracing::info!(
                universe = topology.universe(),
                namespace = topology.namespace(),
                accounts = accounts.len(),
                "using blob metadata store"
            );
            let store = BlobMetadataStore::new(Arc::new(topology), accounts)?;
            Ok(Arc::new(store) as Arc<dyn MetadataStore>)
        }
        MetadataBackendConfig::Remote {
            base_url,
            namespace,
            timeout_secs,
        } => {
            tracing::info!(%base_url, %namespace, "using remote metadata store");
            let store =
                RemoteMetadataStore::new(base_url, namespace, Duration::from_secs(*timeout_secs))?;
            Ok(Arc::new(store) as Arc<dyn MetadataStore>)
        }
    }
}
