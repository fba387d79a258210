//! Health endpoint.

use crate::error::ApiResult;
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use memo_metadata::wire::HealthResponse;

/// GET /v1/health - Health check endpoint.
///
/// Unauthenticated, for load balancers and readiness probes. Fails when the
/// metadata backend is unreachable.
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    state.store.health_check().await?;

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        backend: state.store.backend_name().to_string(),
        checked_at: state.clock.now(),
    }))
}
