use super::extract::UserId;
use crate::models::QuotaStatus;
use crate::startup::AppState;
use axum::{extract::State, Json};
use serde_json::{json, Value};
use service_core::error::AppError;

pub async fn quota_status(
    State(state): State<AppState>,
    UserId(user_id): UserId,
) -> Result<Json<QuotaStatus>, AppError> {
    Ok(Json(state.engine.quota_status(user_id).await?))
}

/// Period-boundary reset, called by the external monthly timer.
#[tracing::instrument(skip(state))]
pub async fn reset_quotas(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let touched = state.engine.reset_quotas().await?;
    Ok(Json(json!({ "counters_reset": touched })))
}
