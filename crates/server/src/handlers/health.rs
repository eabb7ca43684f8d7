use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use serde::Serialize;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// GET /health - Health check endpoint.
///
/// Unauthenticated, for load balancers and orchestrator probes. Fails when
/// any store shard or the cache backend is unreachable.
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    state.repository.store().health_check().await?;
    state
        .backends
        .cache
        .health_check()
        .await
        .map_err(|e| ApiError::Internal(format!("cache unavailable: {e}")))?;

    Ok(Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    }))
}
