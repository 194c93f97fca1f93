use super::extract::UserId;
use crate::models::{Channel, Reminder};
use crate::startup::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use service_core::error::AppError;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct SendReminderRequest {
    pub channel: Channel,
    /// Falls back to the channel's default template.
    pub template_id: Option<Uuid>,
}

/// Manual send. A provider failure answers 502 after logging a failed
/// reminder.
#[tracing::instrument(skip(state, request))]
pub async fn send_reminder(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(debt_id): Path<Uuid>,
    Json(request): Json<SendReminderRequest>,
) -> Result<(StatusCode, Json<Reminder>), AppError> {
    let reminder = state
        .engine
        .send_reminder(user_id, debt_id, request.channel, request.template_id)
        .await?;
    Ok((StatusCode::CREATED, Json(reminder)))
}

pub async fn list_reminders(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(debt_id): Path<Uuid>,
) -> Result<Json<Vec<Reminder>>, AppError> {
    Ok(Json(state.engine.list_reminders(user_id, debt_id).await?))
}

pub async fn mark_delivered(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(reminder_id): Path<Uuid>,
) -> Result<Json<Reminder>, AppError> {
    Ok(Json(
        state
            .engine
            .mark_reminder_delivered(user_id, reminder_id)
            .await?,
    ))
}
