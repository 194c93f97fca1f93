use crate::services::get_metrics;
use crate::startup::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

/// Liveness probe; also reports whether the store answers.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.engine.health_check().await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "service": "collections-service",
                "version": env!("CARGO_PKG_VERSION")
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "unhealthy",
                "service": "collections-service",
                "error": e.to_string()
            })),
        ),
    }
}

/// Readiness probe: store and every channel sender must be healthy.
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    if state.engine.health_check().await.is_err() {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    match state.senders.health_check().await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Channel sender not ready");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

pub async fn metrics_endpoint() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        get_metrics(),
    )
}
