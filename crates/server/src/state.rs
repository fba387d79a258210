//! Application state shared across handlers.

use crate::error::{ApiError, ApiResult};
use dashmap::DashMap;
use memo_core::config::AppConfig;
use memo_core::{Clock, SystemClock};
use memo_metadata::{ContentSession, MemoizationDatabase, MetadataStore};
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    /// Metadata store for the configured default namespace.
    pub store: Arc<dyn MetadataStore>,
    /// Content used to pin records as they are read.
    pub content: Arc<dyn ContentSession>,
    pub clock: Arc<dyn Clock>,
    /// One database per namespace seen so far, so local caches survive across requests.
    databases: Arc<DashMap<String, Arc<MemoizationDatabase>>>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        store: Arc<dyn MetadataStore>,
        content: Arc<dyn ContentSession>,
    ) -> Self {
        Self::with_clock(config, store, content, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: AppConfig,
        store: Arc<dyn MetadataStore>,
        content: Arc<dyn ContentSession>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            store,
            content,
            clock,
            databases: Arc::new(DashMap::new()),
        }
    }

    /// Database for `namespace`, created on first use.
    ///
    /// At most `server.max_namespaces` databases are opened; requests for
    /// further namespaces are rejected.
    pub fn database(&self, namespace: &str) -> ApiResult<Arc<MemoizationDatabase>> {
        if let Some(database) = self.databases.get(namespace) {
            return Ok(database.clone());
        }

        let max_namespaces = self.config.server.max_namespaces;
        if self.databases.len() >= max_namespaces {
            tracing::warn!(namespace, max_namespaces, "namespace limit reached");
            return Err(ApiError::AtCapacity(format!(
                "namespace limit of {max_namespaces} reached"
            )));
        }

        let store = if namespace == self.store.namespace() {
            self.store.clone()
        } else {
            self.store.with_namespace(namespace)?
        };
        let database = Arc::new(MemoizationDatabase::with_clock(
            store,
            self.config.memoization.clone(),
            self.clock.clone(),
        ));
        Ok(self
            .databases
            .entry(namespace.to_string())
            .or_insert(database)
            .clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memo_metadata::ObjectStoreContentSession;
    use memo_storage::MemoryBackend;

    async fn build_state() -> AppState {
        build_state_with(AppConfig::for_testing()).await
    }

    async fn build_state_with(config: AppConfig) -> AppState {
        let store = memo_metadata::from_config(&config.metadata).await.unwrap();
        let content = Arc::new(ObjectStoreContentSession::new(Arc::new(MemoryBackend::new())));
        AppState::new(config, store, content)
    }

    #[tokio::test]
    async fn test_database_is_reused_per_namespace() {
        let state = build_state().await;
        let first = state.database("nightly").unwrap();
        let second = state.database("nightly").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.namespace(), "nightly");
    }

    #[tokio::test]
    async fn test_default_namespace_shares_the_store() {
        let state = build_state().await;
        let namespace = state.store.namespace().to_string();
        let database = state.database(&namespace).unwrap();
        assert!(Arc::ptr_eq(database.store(), &state.store));
    }

    #[tokio::test]
    async fn test_invalid_namespace_is_rejected() {
        let state = build_state().await;
        assert!(state.database("bad/namespace").is_err());
    }

    #[tokio::test]
    async fn test_namespace_limit_rejects_new_namespaces() {
        let mut config = AppConfig::for_testing();
        config.server.max_namespaces = 2;
        let state = build_state_with(config).await;

        state.database("default").unwrap();
        state.database("nightly").unwrap();
        let err = state.database("weekly").unwrap_err();
        assert!(matches!(err, ApiError::AtCapacity(_)), "{err:?}");

        // Namespaces already open keep working.
        assert_eq!(state.database("nightly").unwrap().namespace(), "nightly");
    }
}
