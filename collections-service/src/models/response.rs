//! Customer payment claim.

use super::Channel;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Pending,
    Verified,
    Rejected,
}

impl ResponseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseStatus::Pending => "pending",
            ResponseStatus::Verified => "verified",
            ResponseStatus::Rejected => "rejected",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "verified" => ResponseStatus::Verified,
            "rejected" => ResponseStatus::Rejected,
            _ => ResponseStatus::Pending,
        }
    }
}

impl std::fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CustomerResponse {
    pub response_id: Uuid,
    pub user_id: Uuid,
    pub debt_id: Uuid,
    pub customer_id: Uuid,
    /// Channel the reply arrived on.
    pub response_type: Channel,
    pub response_utc: DateTime<Utc>,
    pub claimed_payment_date: Option<NaiveDate>,
    pub claimed_reference: Option<String>,
    pub claimed_amount: Option<Decimal>,
    pub comments: Option<String>,
    pub status: ResponseStatus,
    pub internal_notes: Option<String>,
    pub resolved_utc: Option<DateTime<Utc>>,
}

impl CustomerResponse {
    pub fn new(user_id: Uuid, debt_id: Uuid, customer_id: Uuid, claim: SubmitClaim) -> Self {
        Self {
            response_id: Uuid::new_v4(),
            user_id,
            debt_id,
            customer_id,
            response_type: claim.response_type,
            response_utc: Utc::now(),
            claimed_payment_date: claim.payment_date,
            claimed_reference: claim.reference,
            claimed_amount: claim.amount,
            comments: claim.comments,
            status: ResponseStatus::Pending,
            internal_notes: None,
            resolved_utc: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == ResponseStatus::Pending
    }
}

/// Inbound claim submitted by a customer.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitClaim {
    pub response_type: Channel,
    pub payment_date: Option<NaiveDate>,
    pub reference: Option<String>,
    pub amount: Option<Decimal>,
    pub comments: Option<String>,
}
