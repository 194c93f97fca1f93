//! Error taxonomy for the collections engine.

use crate::services::providers::ProviderError;
use axum::http::StatusCode;
use rust_decimal::Decimal;
use service_core::error::AppError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CollectionsError {
    #[error("Invalid payment: {0}")]
    InvalidPayment(String),

    #[error("No {channel} template configured")]
    NoTemplateConfigured { channel: String },

    #[error("Customer has no {channel} recipient")]
    MissingRecipient { channel: String },

    #[error("Monthly WhatsApp quota of {limit} messages exhausted")]
    QuotaExceeded { limit: i64 },

    #[error("Plan '{tier}' does not include WhatsApp reminders")]
    PlanNotEligible { tier: String },

    #[error("Response {0} is already resolved")]
    AlreadyResolved(Uuid),

    #[error("Debt {0} already has a pending payment claim")]
    ClaimAlreadyPending(Uuid),

    #[error("Send failed (reminder {reminder_id}): {source}")]
    SendFailed {
        reminder_id: Uuid,
        #[source]
        source: ProviderError,
    },

    #[error("{0} not found")]
    NotFound(String),

    #[error("Concurrent update conflict: {0}")]
    Conflict(String),

    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl CollectionsError {
    pub fn invalid_payment(paid: Decimal, delta: Decimal, amount: Decimal) -> Self {
        CollectionsError::InvalidPayment(format!(
            "applying {} to paid amount {} leaves it outside 0..={}",
            delta, paid, amount
        ))
    }

    /// Stable identifier exposed to API clients and metrics.
    pub fn code(&self) -> &'static str {
        match self {
            CollectionsError::InvalidPayment(_) => "invalid_payment",
            CollectionsError::NoTemplateConfigured { .. } => "no_template_configured",
            CollectionsError::MissingRecipient { .. } => "missing_recipient",
            CollectionsError::QuotaExceeded { .. } => "quota_exceeded",
            CollectionsError::PlanNotEligible { .. } => "plan_not_eligible",
            CollectionsError::AlreadyResolved(_) => "already_resolved",
            CollectionsError::ClaimAlreadyPending(_) => "claim_already_pending",
            CollectionsError::SendFailed { .. } => "send_failed",
            CollectionsError::NotFound(_) => "not_found",
            CollectionsError::Conflict(_) => "conflict",
            CollectionsError::Storage(_) => "storage_error",
        }
    }

    /// Quota denials are reported to the scheduler rather than treated as failures.
    pub fn is_quota_denial(&self) -> bool {
        matches!(
            self,
            CollectionsError::QuotaExceeded { .. } | CollectionsError::PlanNotEligible { .. }
        )
    }
}

impl From<CollectionsError> for AppError {
    fn from(err: CollectionsError) -> Self {
        let status = match &err {
            CollectionsError::InvalidPayment(_) | CollectionsError::MissingRecipient { .. } => {
                StatusCode::BAD_REQUEST
            }
            CollectionsError::NotFound(_) => StatusCode::NOT_FOUND,
            CollectionsError::NoTemplateConfigured { .. }
            | CollectionsError::AlreadyResolved(_)
            | CollectionsError::ClaimAlreadyPending(_)
            | CollectionsError::Conflict(_) => StatusCode::CONFLICT,
            CollectionsError::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            CollectionsError::PlanNotEligible { .. } => StatusCode::FORBIDDEN,
            CollectionsError::SendFailed { .. } => StatusCode::BAD_GATEWAY,
            CollectionsError::Storage(_) => {
                return AppError::DatabaseError(anyhow::anyhow!(err.to_string()));
            }
        };

        AppError::Rejected {
            status,
            code: err.code(),
            message: err.to_string(),
        }
    }
}
