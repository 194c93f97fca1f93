//! Customer payment claims and their review by staff.

use super::clock::Clock;
use super::debts::DebtLedger;
use super::metrics::CLAIMS_RESOLVED_TOTAL;
use super::status;
use super::store::CollectionsStore;
use crate::error::CollectionsError;
use crate::models::{CustomerResponse, Debt, DebtStatus, PaymentEvent, ResponseStatus, SubmitClaim};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct ResponseReconciliation {
    store: Arc<dyn CollectionsStore>,
    ledger: DebtLedger,
    clock: Arc<dyn Clock>,
}

impl ResponseReconciliation {
    pub fn new(store: Arc<dyn CollectionsStore>, ledger: DebtLedger, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            ledger,
            clock,
        }
    }

    /// Records a pending claim and re-derives the debt. A debt holds at
    /// most one pending claim.
    #[instrument(skip_all, fields(user_id = %user_id, debt_id = %debt_id))]
    pub async fn submit_claim(
        &self,
        user_id: Uuid,
        debt_id: Uuid,
        claim: SubmitClaim,
    ) -> Result<CustomerResponse, CollectionsError> {
        let debt = self.ledger.get_debt(user_id, debt_id).await?;
        if debt.status == DebtStatus::Paid {
            return Err(CollectionsError::InvalidPayment(format!(
                "debt {} is already paid in full",
                debt_id
            )));
        }
        if let Some(amount) = claim.amount {
            if amount <= Decimal::ZERO {
                return Err(CollectionsError::InvalidPayment(format!(
                    "claimed amount must be positive, got {}",
                    amount
                )));
            }
            status::check_money_scale(amount)?;
        }

        let response = CustomerResponse::new(user_id, debt_id, debt.customer_id, claim);
        self.store.insert_claim(&response).await?;
        let debt = self.ledger.refresh_status(user_id, debt_id).await?;

        info!(
            response_id = %response.response_id,
            status = %debt.status,
            "Payment claim submitted"
        );
        Ok(response)
    }

    /// Accepts a claim and applies it as a payment: the claimed amount (or
    /// the remaining balance when none was given) on the claimed date (or
    /// today).
    ///
    /// The payment is checked against the current debt before the claim is
    /// resolved, so an unapplicable claim stays pending. If the debt moves
    /// between the check and the write the claim is reopened, unless another
    /// claim has taken its place.
    #[instrument(skip_all, fields(user_id = %user_id, response_id = %response_id))]
    pub async fn verify(
        &self,
        user_id: Uuid,
        response_id: Uuid,
        note: Option<String>,
    ) -> Result<Debt, CollectionsError> {
        let pending = self.get_response(user_id, response_id).await?;
        if !pending.is_pending() {
            return Err(CollectionsError::AlreadyResolved(response_id));
        }

        let claimed = pending.claimed_amount;
        let paid_on = pending
            .claimed_payment_date
            .unwrap_or_else(|| self.clock.today());
        let settle = move |current: &Debt,
                           has_claim: bool,
                           today: NaiveDate|
              -> Result<Option<Debt>, CollectionsError> {
            let amount = claimed.unwrap_or_else(|| current.balance());
            if amount.is_zero() {
                return Ok(Some(status::reevaluate(current, has_claim, today)));
            }
            let event = PaymentEvent {
                amount,
                date: paid_on,
            };
            status::apply_payment(current, &event, has_claim, today).map(Some)
        };

        let current = self.ledger.get_debt(user_id, pending.debt_id).await?;
        if let Err(e) = settle(&current, false, self.clock.today()) {
            warn!(error = %e, "Claimed payment cannot be applied, claim left pending");
            return Err(e);
        }

        let response = self
            .store
            .resolve_response(
                user_id,
                response_id,
                ResponseStatus::Verified,
                note,
                self.clock.now(),
            )
            .await?;

        match self.ledger.update(user_id, response.debt_id, settle).await {
            Ok(debt) => {
                CLAIMS_RESOLVED_TOTAL.with_label_values(&["verified"]).inc();
                info!(
                    debt_id = %debt.debt_id,
                    paid_amount = %debt.paid_amount,
                    status = %debt.status,
                    "Payment claim verified"
                );
                Ok(debt)
            }
            Err(e) => {
                warn!(error = %e, "Claimed payment could not be applied, reopening claim");
                if let Err(reopen) = self.store.reopen_response(user_id, response_id).await {
                    error!(
                        error = %reopen,
                        debt_id = %response.debt_id,
                        "Failed to reopen claim"
                    );
                }
                self.ledger.refresh_status(user_id, response.debt_id).await?;
                Err(e)
            }
        }
    }

    /// Rejects a claim without applying any payment.
    #[instrument(skip_all, fields(user_id = %user_id, response_id = %response_id))]
    pub async fn reject(
        &self,
        user_id: Uuid,
        response_id: Uuid,
        note: Option<String>,
    ) -> Result<Debt, CollectionsError> {
        let response = self
            .store
            .resolve_response(
                user_id,
                response_id,
                ResponseStatus::Rejected,
                note,
                self.clock.now(),
            )
            .await?;

        let debt = self.ledger.refresh_status(user_id, response.debt_id).await?;
        CLAIMS_RESOLVED_TOTAL.with_label_values(&["rejected"]).inc();
        info!(debt_id = %debt.debt_id, status = %debt.status, "Payment claim rejected");
        Ok(debt)
    }

    pub async fn get_response(
        &self,
        user_id: Uuid,
        response_id: Uuid,
    ) -> Result<CustomerResponse, CollectionsError> {
        self.store
            .get_response(user_id, response_id)
            .await?
            .ok_or_else(|| CollectionsError::NotFound(format!("Response {}", response_id)))
    }
}
