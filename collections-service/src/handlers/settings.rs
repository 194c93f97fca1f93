use super::extract::UserId;
use crate::models::{Channel, CreateTemplate, ReminderSettings, Template, UpdateReminderSettings};
use crate::startup::AppState;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use service_core::error::AppError;
use validator::Validate;

#[derive(Debug, Deserialize)]
pub struct DefaultTemplateQuery {
    pub channel: Channel,
}

#[tracing::instrument(skip(state, request))]
pub async fn create_template(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Json(request): Json<CreateTemplate>,
) -> Result<(StatusCode, Json<Template>), AppError> {
    request.validate()?;
    let template = state.engine.create_template(user_id, request).await?;
    Ok((StatusCode::CREATED, Json(template)))
}

pub async fn default_template(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Query(query): Query<DefaultTemplateQuery>,
) -> Result<Json<Template>, AppError> {
    state
        .engine
        .default_template(user_id, query.channel)
        .await?
        .map(Json)
        .ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!(
                "No default {} template",
                query.channel
            ))
        })
}

pub async fn get_reminder_settings(
    State(state): State<AppState>,
    UserId(user_id): UserId,
) -> Result<Json<ReminderSettings>, AppError> {
    Ok(Json(state.engine.reminder_settings(user_id).await?))
}

#[tracing::instrument(skip(state, request))]
pub async fn put_reminder_settings(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Json(request): Json<UpdateReminderSettings>,
) -> Result<Json<ReminderSettings>, AppError> {
    request.validate()?;
    Ok(Json(
        state.engine.put_reminder_settings(user_id, request).await?,
    ))
}
