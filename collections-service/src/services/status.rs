//! Debt status derivation.
//!
//! Status is a pure function of the payment facts, the due date and whether
//! a claim is awaiting review. Every mutation path funnels through
//! [`derive_status`]; nothing assigns a status directly.

use crate::error::CollectionsError;
use crate::models::{Debt, DebtStatus, PaymentEvent};
use chrono::NaiveDate;
use rust_decimal::Decimal;

/// Rules in priority order:
/// 1. nothing paid and a claim pending → `payment_claimed`
/// 2. paid in full → `paid`
/// 3. partly paid → `partially_paid`
/// 4. past due → `overdue`
/// 5. otherwise `pending`
pub fn derive_status(debt: &Debt, has_pending_claim: bool, today: NaiveDate) -> DebtStatus {
    if debt.paid_amount.is_zero() && has_pending_claim {
        DebtStatus::PaymentClaimed
    } else if debt.paid_amount >= debt.amount {
        DebtStatus::Paid
    } else if debt.paid_amount > Decimal::ZERO {
        DebtStatus::PartiallyPaid
    } else if debt.due_date < today {
        DebtStatus::Overdue
    } else {
        DebtStatus::Pending
    }
}

/// Copy of `debt` with its status re-derived.
pub fn reevaluate(debt: &Debt, has_pending_claim: bool, today: NaiveDate) -> Debt {
    let mut next = debt.clone();
    next.status = derive_status(&next, has_pending_claim, today);
    next
}

/// Amounts carry at most this many decimal places.
pub const MONEY_SCALE: u32 = 2;

/// Rejects amounts finer than a cent.
pub fn check_money_scale(value: Decimal) -> Result<(), CollectionsError> {
    if value.normalize().scale() > MONEY_SCALE {
        return Err(CollectionsError::InvalidPayment(format!(
            "amount {} has more than {} decimal places",
            value, MONEY_SCALE
        )));
    }
    Ok(())
}

/// Applies a signed payment delta and re-derives the status.
///
/// The resulting paid amount must stay within `0..=amount`. A positive
/// delta stamps `paid_date`; a correction back to zero clears it.
pub fn apply_payment(
    debt: &Debt,
    event: &PaymentEvent,
    has_pending_claim: bool,
    today: NaiveDate,
) -> Result<Debt, CollectionsError> {
    if event.amount.is_zero() {
        return Err(CollectionsError::InvalidPayment(
            "payment amount must be non-zero".to_string(),
        ));
    }
    check_money_scale(event.amount)?;

    let paid = debt.paid_amount + event.amount;
    if paid < Decimal::ZERO || paid > debt.amount {
        return Err(CollectionsError::invalid_payment(
            debt.paid_amount,
            event.amount,
            debt.amount,
        ));
    }

    let mut next = debt.clone();
    next.paid_amount = paid;
    if paid.is_zero() {
        next.paid_date = None;
    } else if event.amount > Decimal::ZERO {
        next.paid_date = Some(event.date);
    }
    next.status = derive_status(&next, has_pending_claim, today);
    Ok(next)
}
