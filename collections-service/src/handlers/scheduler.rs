use crate::services::TickReport;
use crate::startup::AppState;
use axum::{extract::State, Json};
use service_core::error::AppError;

/// Daily scheduling tick, called by the external timer.
#[tracing::instrument(skip(state))]
pub async fn run_tick(State(state): State<AppState>) -> Result<Json<TickReport>, AppError> {
    Ok(Json(state.engine.run_tick().await?))
}
