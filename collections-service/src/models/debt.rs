//! Debt model.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Debt status. Always derived, never assigned directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebtStatus {
    Pending,
    Overdue,
    PartiallyPaid,
    Paid,
    PaymentClaimed,
}

impl DebtStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DebtStatus::Pending => "pending",
            DebtStatus::Overdue => "overdue",
            DebtStatus::PartiallyPaid => "partially_paid",
            DebtStatus::Paid => "paid",
            DebtStatus::PaymentClaimed => "payment_claimed",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "overdue" => DebtStatus::Overdue,
            "partially_paid" => DebtStatus::PartiallyPaid,
            "paid" => DebtStatus::Paid,
            "payment_claimed" => DebtStatus::PaymentClaimed,
            _ => DebtStatus::Pending,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DebtStatus::Paid)
    }
}

impl std::fmt::Display for DebtStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An invoice obligation owed by a customer.
///
/// `version` increments on every successful write and guards concurrent
/// payment events against lost updates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Debt {
    pub debt_id: Uuid,
    pub user_id: Uuid,
    pub customer_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub invoice_number: String,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    pub paid_amount: Decimal,
    pub paid_date: Option<NaiveDate>,
    pub status: DebtStatus,
    pub notes: Option<String>,
    pub version: i64,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Debt {
    pub fn new(user_id: Uuid, input: CreateDebt) -> Self {
        let now = Utc::now();
        Self {
            debt_id: Uuid::new_v4(),
            user_id,
            customer_id: input.customer_id,
            amount: input.amount,
            currency: input.currency,
            invoice_number: input.invoice_number,
            invoice_date: input.invoice_date,
            due_date: input.due_date,
            paid_amount: Decimal::ZERO,
            paid_date: None,
            status: DebtStatus::Pending,
            notes: input.notes,
            version: 0,
            created_utc: now,
            updated_utc: now,
        }
    }

    /// Amount still owed.
    pub fn balance(&self) -> Decimal {
        self.amount - self.paid_amount
    }
}

/// Input for creating a debt.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateDebt {
    pub customer_id: Uuid,
    pub amount: Decimal,
    #[validate(length(equal = 3, message = "Currency must be a 3-letter code"))]
    pub currency: String,
    #[validate(length(min = 1, message = "Invoice number cannot be empty"))]
    pub invoice_number: String,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    pub notes: Option<String>,
}

/// A change to the paid amount of a debt.
///
/// `amount` is a signed delta applied to the current paid amount; negative
/// values are corrections.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaymentEvent {
    pub amount: Decimal,
    pub date: NaiveDate,
}
