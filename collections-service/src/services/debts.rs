//! Customer and debt bookkeeping.
//!
//! Debt writes are optimistic: each mutation reads the current row, derives
//! the next state and saves it only if the version is unchanged. A stale
//! write re-reads and re-applies its delta.

use super::clock::Clock;
use super::metrics::{DEBT_TRANSITIONS_TOTAL, PAYMENT_AMOUNT_TOTAL};
use super::status;
use super::store::CollectionsStore;
use crate::error::CollectionsError;
use crate::models::{CreateCustomer, CreateDebt, Customer, Debt, PaymentEvent};
use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

const MAX_WRITE_ATTEMPTS: u32 = 8;
const RETRY_BACKOFF: Duration = Duration::from_millis(5);

#[derive(Clone)]
pub struct DebtLedger {
    store: Arc<dyn CollectionsStore>,
    clock: Arc<dyn Clock>,
}

impl DebtLedger {
    pub fn new(store: Arc<dyn CollectionsStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    #[instrument(skip_all, fields(user_id = %user_id))]
    pub async fn create_customer(
        &self,
        user_id: Uuid,
        input: CreateCustomer,
    ) -> Result<Customer, CollectionsError> {
        let customer = Customer::new(user_id, input);
        self.store.insert_customer(&customer).await?;
        info!(customer_id = %customer.customer_id, "Customer created");
        Ok(customer)
    }

    pub async fn get_customer(
        &self,
        user_id: Uuid,
        customer_id: Uuid,
    ) -> Result<Customer, CollectionsError> {
        self.store
            .get_customer(user_id, customer_id)
            .await?
            .ok_or_else(|| CollectionsError::NotFound(format!("Customer {}", customer_id)))
    }

    #[instrument(skip_all, fields(user_id = %user_id, customer_id = %input.customer_id))]
    pub async fn create_debt(
        &self,
        user_id: Uuid,
        input: CreateDebt,
    ) -> Result<Debt, CollectionsError> {
        if input.amount <= Decimal::ZERO {
            return Err(CollectionsError::InvalidPayment(format!(
                "debt amount must be positive, got {}",
                input.amount
            )));
        }
        status::check_money_scale(input.amount)?;
        self.get_customer(user_id, input.customer_id).await?;

        let debt = status::reevaluate(&Debt::new(user_id, input), false, self.clock.today());
        self.store.insert_debt(&debt).await?;

        info!(
            debt_id = %debt.debt_id,
            amount = %debt.amount,
            status = %debt.status,
            "Debt created"
        );
        Ok(debt)
    }

    pub async fn get_debt(&self, user_id: Uuid, debt_id: Uuid) -> Result<Debt, CollectionsError> {
        self.store
            .get_debt(user_id, debt_id)
            .await?
            .ok_or_else(|| CollectionsError::NotFound(format!("Debt {}", debt_id)))
    }

    /// Applies a signed payment delta.
    #[instrument(skip_all, fields(user_id = %user_id, debt_id = %debt_id))]
    pub async fn record_payment(
        &self,
        user_id: Uuid,
        debt_id: Uuid,
        event: PaymentEvent,
    ) -> Result<Debt, CollectionsError> {
        let debt = self
            .update(user_id, debt_id, |current, has_claim, today| {
                status::apply_payment(current, &event, has_claim, today).map(Some)
            })
            .await?;

        if event.amount > Decimal::ZERO {
            if let Some(amount) = event.amount.to_f64() {
                PAYMENT_AMOUNT_TOTAL
                    .with_label_values(&[debt.currency.as_str()])
                    .inc_by(amount);
            }
        }
        info!(delta = %event.amount, paid_amount = %debt.paid_amount, status = %debt.status, "Payment recorded");
        Ok(debt)
    }

    /// Pays the remaining balance. A debt already paid in full is returned
    /// unchanged.
    #[instrument(skip_all, fields(user_id = %user_id, debt_id = %debt_id))]
    pub async fn mark_paid(
        &self,
        user_id: Uuid,
        debt_id: Uuid,
        date: NaiveDate,
    ) -> Result<Debt, CollectionsError> {
        self.update(user_id, debt_id, |current, has_claim, today| {
            let balance = current.balance();
            if balance <= Decimal::ZERO {
                return Ok(None);
            }
            let event = PaymentEvent {
                amount: balance,
                date,
            };
            status::apply_payment(current, &event, has_claim, today).map(Some)
        })
        .await
    }

    /// Re-derives the status against today's date and claim state.
    pub async fn refresh_status(
        &self,
        user_id: Uuid,
        debt_id: Uuid,
    ) -> Result<Debt, CollectionsError> {
        self.update(user_id, debt_id, |current, has_claim, today| {
            Ok(Some(status::reevaluate(current, has_claim, today)))
        })
        .await
    }

    /// Read-derive-save loop. `derive` returns `None` when nothing should
    /// be written.
    pub(crate) async fn update<F>(
        &self,
        user_id: Uuid,
        debt_id: Uuid,
        derive: F,
    ) -> Result<Debt, CollectionsError>
    where
        F: Fn(&Debt, bool, NaiveDate) -> Result<Option<Debt>, CollectionsError> + Send + Sync,
    {
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let current = self.get_debt(user_id, debt_id).await?;
            let has_claim = self.store.has_pending_claim(debt_id).await?;

            let next = match derive(&current, has_claim, self.clock.today())? {
                Some(next) if next != current => next,
                _ => return Ok(current),
            };

            match self.store.save_debt(&next).await {
                Ok(saved) => {
                    if saved.status != current.status {
                        DEBT_TRANSITIONS_TOTAL
                            .with_label_values(&[current.status.as_str(), saved.status.as_str()])
                            .inc();
                        debug!(
                            debt_id = %debt_id,
                            from = %current.status,
                            to = %saved.status,
                            "Debt status changed"
                        );
                    }
                    return Ok(saved);
                }
                Err(CollectionsError::Conflict(reason)) => {
                    debug!(debt_id = %debt_id, attempt, reason = %reason, "Stale debt write, retrying");
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                }
                Err(e) => return Err(e),
            }
        }

        warn!(debt_id = %debt_id, attempts = MAX_WRITE_ATTEMPTS, "Debt write retries exhausted");
        Err(CollectionsError::Conflict(format!(
            "debt {} kept changing after {} attempts",
            debt_id, MAX_WRITE_ATTEMPTS
        )))
    }
}
