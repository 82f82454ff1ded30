//! Health check handlers.
//!
//! - `/health`: liveness, returns OK while the process is running
//! - `/ready`: readiness, requires a non-empty verification key set

use crate::models::HealthResponse;
use crate::routes::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use std::sync::Arc;

/// Liveness probe handler.
///
/// Checks no dependencies.
///
/// ```json
/// { "status": "alive" }
/// ```
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "alive".to_string(),
        keys: None,
    })
}

/// Readiness probe handler.
///
/// Returns 200 once at least one verification key is cached, else 503.
/// No request can be authenticated without keys.
///
/// ```json
/// { "status": "ready", "keys": 2 }
/// ```
#[tracing::instrument(skip_all, name = "bff.health.readiness")]
pub async fn readiness_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let keys = state.key_set.key_count().await;

    if keys == 0 {
        tracing::warn!(target: "bff.handlers.health", "Readiness check failed: no verification keys cached");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "not_ready".to_string(),
                keys: Some(0),
            }),
        );
    }

    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ready".to_string(),
            keys: Some(keys),
        }),
    )
}
