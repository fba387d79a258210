//! Route configuration.

use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Load balancer and k8s probes
        .route("/v1/health", get(handlers::health_check))
        .route(
            "/v1/{namespace}/content-hash-lists/{weak}/{selector}",
            get(handlers::get_content_hash_list).post(handlers::add_content_hash_list),
        )
        .route(
            "/v1/{namespace}/content-hash-lists/{weak}/{selector}/compare-exchange",
            post(handlers::compare_exchange),
        )
        .route(
            "/v1/{namespace}/selectors/{weak}",
            get(handlers::get_selectors),
        );

    let mut router = Router::new().merge(api_routes);

    if state.config.server.metrics_enabled {
        let metrics_routes = Router::new().route("/metrics", get(metrics_handler));
        router = router.merge(metrics_routes);
    }

    router
        .layer(DefaultBodyLimit::max(state.config.server.max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
