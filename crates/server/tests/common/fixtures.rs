//! Fingerprints, values and request helpers shared by the server tests.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use memo_core::{
    ContentHash, ContentHashList, ContentHashListWithDeterminism, Determinism, Selector,
    StrongFingerprint, WeakFingerprint,
};
use serde_json::Value;
use tower::ServiceExt;

/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub fn fingerprint(weak: &str, selector: &str) -> StrongFingerprint {
    StrongFingerprint::new(
        WeakFingerprint::compute(weak.as_bytes()),
        Selector::new(ContentHash::compute(selector.as_bytes()), None),
    )
}

#[allow(dead_code)]
pub fn value(blobs: &[&str], determinism: Determinism) -> ContentHashListWithDeterminism {
    let hashes = blobs
        .iter()
        .map(|blob| ContentHash::compute(blob.as_bytes()))
        .collect();
    ContentHashListWithDeterminism::new(ContentHashList::new(hashes), determinism)
}

/// `/v1/{namespace}/content-hash-lists/{weak}/{selector}`
#[allow(dead_code)]
pub fn record_uri(namespace: &str, key: &StrongFingerprint) -> String {
    format!(
        "/v1/{namespace}/content-hash-lists/{}/{}",
        key.weak.to_hex(),
        key.selector.to_key()
    )
}

/// Send a request and return the status, headers and JSON body (`Null` when empty).
#[allow(dead_code)]
pub async fn send(
    router: &axum::Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, axum::http::HeaderMap, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(v) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(serde_json::to_vec(&v).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    let json = if body_bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
    };
    (status, headers, json)
}
