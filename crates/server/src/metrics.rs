//! Prometheus metrics for the memoization service.
//!
//! The `/metrics` endpoint is unauthenticated. Counters carry outcome labels
//! only, never fingerprints or namespaces.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

/// Point lookups by result: hit, miss or stale (pinning failed).
pub static LOOKUPS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("memo_lookups_total", "Content hash list lookups by result"),
        &["result"],
    )
    .expect("metric creation failed")
});

pub static ADDS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "memo_add_total",
            "AddContentHashList calls by outcome",
        ),
        &["outcome"],
    )
    .expect("metric creation failed")
});

pub static COMPARE_EXCHANGES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "memo_compare_exchange_total",
            "Record compare-exchange calls by outcome",
        ),
        &["outcome"],
    )
    .expect("metric creation failed")
});

pub static SELECTOR_QUERY_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "memo_selector_query_duration_seconds",
            "Time taken to enumerate selectors of a weak fingerprint",
        )
        .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        &["shape"],
    )
    .expect("metric creation failed")
});

pub static ERRORS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("memo_errors_total", "API errors by code"),
        &["code"],
    )
    .expect("metric creation failed")
});

static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(LOOKUPS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(ADDS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(COMPARE_EXCHANGES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(SELECTOR_QUERY_DURATION.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(ERRORS.clone()))
            .expect("metric registration failed");
    });
}

/// GET /metrics - Prometheus metrics endpoint.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}

pub fn record_lookup(result: &str) {
    LOOKUPS.with_label_values(&[result]).inc();
}

pub fn record_add(outcome: &str) {
    ADDS.with_label_values(&[outcome]).inc();
}

pub fn record_compare_exchange(outcome: &str) {
    COMPARE_EXCHANGES.with_label_values(&[outcome]).inc();
}

/// Helper to record API errors by code.
pub fn record_error(code: &str) {
    ERRORS.with_label_values(&[code]).inc();
}
