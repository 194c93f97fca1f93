use super::extract::UserId;
use crate::models::{CreateCustomer, CreateDebt, Customer, Debt, PaymentEvent};
use crate::startup::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize)]
pub struct RecordPaymentRequest {
    /// Signed delta; negative values correct earlier payments.
    pub amount: Decimal,
    /// Defaults to today.
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MarkPaidRequest {
    pub date: Option<NaiveDate>,
}

#[tracing::instrument(skip(state, request))]
pub async fn create_customer(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Json(request): Json<CreateCustomer>,
) -> Result<(StatusCode, Json<Customer>), AppError> {
    request.validate()?;
    let customer = state.engine.create_customer(user_id, request).await?;
    Ok((StatusCode::CREATED, Json(customer)))
}

#[tracing::instrument(skip(state, request))]
pub async fn create_debt(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Json(request): Json<CreateDebt>,
) -> Result<(StatusCode, Json<Debt>), AppError> {
    request.validate()?;
    let debt = state.engine.create_debt(user_id, request).await?;
    Ok((StatusCode::CREATED, Json(debt)))
}

pub async fn get_debt(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(debt_id): Path<Uuid>,
) -> Result<Json<Debt>, AppError> {
    Ok(Json(state.engine.get_debt(user_id, debt_id).await?))
}

#[tracing::instrument(skip(state, request))]
pub async fn record_payment(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(debt_id): Path<Uuid>,
    Json(request): Json<RecordPaymentRequest>,
) -> Result<Json<Debt>, AppError> {
    let event = PaymentEvent {
        amount: request.amount,
        date: request.date.unwrap_or_else(|| state.engine.today()),
    };
    Ok(Json(
        state.engine.record_payment(user_id, debt_id, event).await?,
    ))
}

#[tracing::instrument(skip(state, request))]
pub async fn mark_paid(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(debt_id): Path<Uuid>,
    request: Option<Json<MarkPaidRequest>>,
) -> Result<Json<Debt>, AppError> {
    let date = request.and_then(|Json(r)| r.date);
    Ok(Json(state.engine.mark_paid(user_id, debt_id, date).await?))
}

pub async fn refresh_status(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(debt_id): Path<Uuid>,
) -> Result<Json<Debt>, AppError> {
    Ok(Json(state.engine.refresh_status(user_id, debt_id).await?))
}
