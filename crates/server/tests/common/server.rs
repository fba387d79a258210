//! Server test utilities.

use bytes::Bytes;
use memo_core::config::AppConfig;
use memo_core::{ContentHash, ManualClock};
use memo_metadata::{ContentSession, ObjectStoreContentSession};
use memo_server::{AppState, create_router};
use memo_storage::{MemoryBackend, ObjectStore};
use std::sync::Arc;
use time::macros::datetime;

/// A test server over in-memory metadata and content, driven by a manual clock.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    pub clock: Arc<ManualClock>,
    pub content: Arc<ObjectStoreContentSession>,
    pub content_backend: Arc<MemoryBackend>,
}

#[allow(dead_code)]
impl TestServer {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server with custom config modifications.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let mut config = AppConfig::for_testing();
        modifier(&mut config);

        let store = memo_metadata::from_config(&config.metadata)
            .await
            .expect("Failed to create metadata store");

        let content_backend = Arc::new(MemoryBackend::new());
        let backend: Arc<dyn ObjectStore> = content_backend.clone();
        let content = Arc::new(ObjectStoreContentSession::new(backend));

        let clock = Arc::new(ManualClock::new(datetime!(2024-03-01 12:00 UTC)));
        let state = AppState::with_clock(config, store, content.clone(), clock.clone());
        let router = create_router(state.clone());

        Self {
            router,
            state,
            clock,
            content,
            content_backend,
        }
    }

    /// Serve the router on an ephemeral local port and return its base URL.
    pub async fn spawn(&self) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let addr = listener.local_addr().expect("listener address");
        let router = self.router.clone();
        tokio::spawn(async move {
            axum::serve(listener, router)
                .await
                .expect("test server failed");
        });
        format!("http://{addr}")
    }

    /// Store a blob in the content store.
    pub async fn put_content(&self, data: &'static str) -> ContentHash {
        self.content
            .put(Bytes::from_static(data.as_bytes()))
            .await
            .expect("Failed to store content")
    }

    /// Remove a blob from the content store.
    pub async fn drop_content(&self, hash: &ContentHash) {
        self.content_backend
            .delete(&format!("content/{}", hash.to_hex()))
            .await
            .expect("Failed to delete content");
    }
}
