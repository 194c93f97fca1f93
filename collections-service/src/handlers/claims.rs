use super::extract::UserId;
use crate::models::{CustomerResponse, Debt, SubmitClaim};
use crate::startup::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use service_core::error::AppError;
use uuid::Uuid;

#[derive(Debug, Default, Deserialize)]
pub struct ResolveClaimRequest {
    pub note: Option<String>,
}

#[tracing::instrument(skip(state, claim))]
pub async fn submit_claim(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(debt_id): Path<Uuid>,
    Json(claim): Json<SubmitClaim>,
) -> Result<(StatusCode, Json<CustomerResponse>), AppError> {
    let response = state.engine.submit_claim(user_id, debt_id, claim).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn get_response(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(response_id): Path<Uuid>,
) -> Result<Json<CustomerResponse>, AppError> {
    Ok(Json(state.engine.get_response(user_id, response_id).await?))
}

#[tracing::instrument(skip(state, request))]
pub async fn verify_claim(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(response_id): Path<Uuid>,
    request: Option<Json<ResolveClaimRequest>>,
) -> Result<Json<Debt>, AppError> {
    let note = request.and_then(|Json(r)| r.note);
    Ok(Json(
        state
            .engine
            .verify_response(user_id, response_id, note)
            .await?,
    ))
}

#[tracing::instrument(skip(state, request))]
pub async fn reject_claim(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(response_id): Path<Uuid>,
    request: Option<Json<ResolveClaimRequest>>,
) -> Result<Json<Debt>, AppError> {
    let note = request.and_then(|Json(r)| r.note);
    Ok(Json(
        state
            .engine
            .reject_response(user_id, response_id, note)
            .await?,
    ))
}
