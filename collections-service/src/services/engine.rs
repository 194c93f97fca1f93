//! Facade wiring the collections components together.

use super::clock::Clock;
use super::debts::DebtLedger;
use super::dispatch::DispatchCoordinator;
use super::providers::SenderRegistry;
use super::quota::QuotaTracker;
use super::reconciliation::ResponseReconciliation;
use super::scheduler::{DispatchRequest, ReminderScheduler};
use super::store::CollectionsStore;
use super::tenants::TenantDirectory;
use crate::config::DispatchConfig;
use crate::error::CollectionsError;
use crate::models::{
    Channel, CreateCustomer, CreateDebt, CreateTemplate, Customer, CustomerResponse, Debt,
    DebtStatus, PaymentEvent, QuotaStatus, Reminder, ReminderSettings, SubmitClaim, Template,
    UpdateReminderSettings,
};
use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// A scheduled send that completed.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TickSent {
    pub debt_id: Uuid,
    pub offset_days: i32,
    pub reminder_id: Uuid,
}

/// A scheduled send that did not complete. `reminder_id` is set when the
/// provider was called and a failed reminder was logged.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TickFailure {
    pub user_id: Uuid,
    pub debt_id: Uuid,
    pub offset_days: i32,
    pub reminder_id: Option<Uuid>,
    pub code: String,
    pub message: String,
}

/// Outcome of one scheduling tick.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct TickReport {
    pub date: Option<NaiveDate>,
    pub users: usize,
    pub debts_considered: usize,
    pub status_changes: usize,
    pub sent: Vec<TickSent>,
    pub failed: Vec<TickFailure>,
    /// QuotaExceeded / PlanNotEligible refusals. No reminder was logged.
    pub quota_denied: Vec<TickFailure>,
    pub skipped_already_sent: usize,
}

pub struct CollectionsEngine {
    store: Arc<dyn CollectionsStore>,
    clock: Arc<dyn Clock>,
    ledger: DebtLedger,
    quota: QuotaTracker,
    scheduler: ReminderScheduler,
    dispatch: DispatchCoordinator,
    reconciliation: ResponseReconciliation,
    tick_concurrency: usize,
    tick_lock: Mutex<()>,
}

impl CollectionsEngine {
    pub fn new(
        store: Arc<dyn CollectionsStore>,
        tenants: Arc<dyn TenantDirectory>,
        senders: SenderRegistry,
        clock: Arc<dyn Clock>,
        config: DispatchConfig,
    ) -> Self {
        let ledger = DebtLedger::new(store.clone(), clock.clone());
        let quota = QuotaTracker::new(store.clone(), tenants.clone(), clock.clone());
        let scheduler = ReminderScheduler::new(store.clone());
        let tick_concurrency = config.tick_concurrency.max(1);
        let dispatch =
            DispatchCoordinator::new(store.clone(), tenants, senders, quota.clone(), config);
        let reconciliation =
            ResponseReconciliation::new(store.clone(), ledger.clone(), clock.clone());

        Self {
            store,
            clock,
            ledger,
            quota,
            scheduler,
            dispatch,
            reconciliation,
            tick_concurrency,
            tick_lock: Mutex::new(()),
        }
    }

    pub async fn health_check(&self) -> Result<(), CollectionsError> {
        self.store.health_check().await
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    // Customers and debts

    pub async fn create_customer(
        &self,
        user_id: Uuid,
        input: CreateCustomer,
    ) -> Result<Customer, CollectionsError> {
        self.ledger.create_customer(user_id, input).await
    }

    pub async fn create_debt(
        &self,
        user_id: Uuid,
        input: CreateDebt,
    ) -> Result<Debt, CollectionsError> {
        self.ledger.create_debt(user_id, input).await
    }

    pub async fn get_debt(&self, user_id: Uuid, debt_id: Uuid) -> Result<Debt, CollectionsError> {
        self.ledger.get_debt(user_id, debt_id).await
    }

    pub async fn record_payment(
        &self,
        user_id: Uuid,
        debt_id: Uuid,
        event: PaymentEvent,
    ) -> Result<Debt, CollectionsError> {
        self.ledger.record_payment(user_id, debt_id, event).await
    }

    pub async fn mark_paid(
        &self,
        user_id: Uuid,
        debt_id: Uuid,
        date: Option<NaiveDate>,
    ) -> Result<Debt, CollectionsError> {
        let date = date.unwrap_or_else(|| self.clock.today());
        self.ledger.mark_paid(user_id, debt_id, date).await
    }

    pub async fn refresh_status(
        &self,
        user_id: Uuid,
        debt_id: Uuid,
    ) -> Result<Debt, CollectionsError> {
        self.ledger.refresh_status(user_id, debt_id).await
    }

    // Templates and settings

    #[instrument(skip_all, fields(user_id = %user_id, channel = %input.channel))]
    pub async fn create_template(
        &self,
        user_id: Uuid,
        input: CreateTemplate,
    ) -> Result<Template, CollectionsError> {
        let template = Template::new(user_id, input);
        self.store.insert_template(&template).await?;
        info!(
            template_id = %template.template_id,
            is_default = template.is_default,
            "Template created"
        );
        Ok(template)
    }

    pub async fn default_template(
        &self,
        user_id: Uuid,
        channel: Channel,
    ) -> Result<Option<Template>, CollectionsError> {
        self.store.default_template(user_id, channel).await
    }

    /// Stored settings, or disabled defaults for a user who never saved any.
    pub async fn reminder_settings(
        &self,
        user_id: Uuid,
    ) -> Result<ReminderSettings, CollectionsError> {
        Ok(self
            .store
            .get_settings(user_id)
            .await?
            .unwrap_or_else(|| ReminderSettings::disabled(user_id)))
    }

    /// Replaces the user's settings. A default template must exist and
    /// belong to the default channel.
    #[instrument(skip_all, fields(user_id = %user_id))]
    pub async fn put_reminder_settings(
        &self,
        user_id: Uuid,
        update: UpdateReminderSettings,
    ) -> Result<ReminderSettings, CollectionsError> {
        let settings = ReminderSettings::from_update(user_id, update);
        if let Some(template_id) = settings.default_template_id {
            let template = self
                .store
                .get_template(user_id, template_id)
                .await?
                .ok_or_else(|| CollectionsError::NotFound(format!("Template {}", template_id)))?;
            if template.channel != settings.default_channel {
                return Err(CollectionsError::NoTemplateConfigured {
                    channel: settings.default_channel.as_str().to_string(),
                });
            }
        }
        self.store.put_settings(&settings).await?;
        info!(
            enabled = settings.enabled,
            reminder_days = ?settings.reminder_days,
            "Reminder settings saved"
        );
        Ok(settings)
    }

    // Reminders

    /// On-demand send. Bypasses the scheduled-offset duplicate check.
    pub async fn send_reminder(
        &self,
        user_id: Uuid,
        debt_id: Uuid,
        channel: Channel,
        template_id: Option<Uuid>,
    ) -> Result<Reminder, CollectionsError> {
        let debt = self.ledger.get_debt(user_id, debt_id).await?;
        let customer = self.ledger.get_customer(user_id, debt.customer_id).await?;
        self.dispatch
            .send(&debt, &customer, channel, template_id, None)
            .await
    }

    pub async fn list_reminders(
        &self,
        user_id: Uuid,
        debt_id: Uuid,
    ) -> Result<Vec<Reminder>, CollectionsError> {
        self.ledger.get_debt(user_id, debt_id).await?;
        self.store.list_reminders(user_id, debt_id).await
    }

    pub async fn mark_reminder_delivered(
        &self,
        user_id: Uuid,
        reminder_id: Uuid,
    ) -> Result<Reminder, CollectionsError> {
        self.store.mark_reminder_delivered(user_id, reminder_id).await
    }

    // Claims

    pub async fn submit_claim(
        &self,
        user_id: Uuid,
        debt_id: Uuid,
        claim: SubmitClaim,
    ) -> Result<CustomerResponse, CollectionsError> {
        self.reconciliation.submit_claim(user_id, debt_id, claim).await
    }

    pub async fn get_response(
        &self,
        user_id: Uuid,
        response_id: Uuid,
    ) -> Result<CustomerResponse, CollectionsError> {
        self.reconciliation.get_response(user_id, response_id).await
    }

    pub async fn verify_response(
        &self,
        user_id: Uuid,
        response_id: Uuid,
        note: Option<String>,
    ) -> Result<Debt, CollectionsError> {
        self.reconciliation.verify(user_id, response_id, note).await
    }

    pub async fn reject_response(
        &self,
        user_id: Uuid,
        response_id: Uuid,
        note: Option<String>,
    ) -> Result<Debt, CollectionsError> {
        self.reconciliation.reject(user_id, response_id, note).await
    }

    // Quota

    pub fn quota(&self) -> &QuotaTracker {
        &self.quota
    }

    pub async fn quota_status(&self, user_id: Uuid) -> Result<QuotaStatus, CollectionsError> {
        self.quota.status(user_id).await
    }

    pub async fn reset_quotas(&self) -> Result<u64, CollectionsError> {
        self.quota.monthly_reset().await
    }

    // Scheduling

    /// Runs one scheduling pass for today. Ticks never overlap.
    ///
    /// Every open debt of every tenant is re-derived (so `pending` turns
    /// `overdue` once the due date passes). Offsets due today are then
    /// dispatched with bounded concurrency for tenants with reminders
    /// enabled.
    #[instrument(skip(self))]
    pub async fn run_tick(&self) -> Result<TickReport, CollectionsError> {
        let _guard = self.tick_lock.lock().await;
        let today = self.clock.today();
        let mut report = TickReport {
            date: Some(today),
            ..TickReport::default()
        };

        let enabled: HashMap<Uuid, ReminderSettings> = self
            .store
            .list_enabled_settings()
            .await?
            .into_iter()
            .map(|settings| (settings.user_id, settings))
            .collect();
        report.users = enabled.len();

        let mut planned: Vec<(Debt, DispatchRequest)> = Vec::new();
        for debt in self.store.list_open_debts_all().await? {
            report.debts_considered += 1;
            let refreshed = self.ledger.refresh_status(debt.user_id, debt.debt_id).await?;
            if refreshed.status != debt.status {
                report.status_changes += 1;
            }
            if refreshed.status == DebtStatus::Paid {
                continue;
            }
            let Some(settings) = enabled.get(&debt.user_id) else {
                continue;
            };

            let schedule = self
                .scheduler
                .pending_dispatches(settings, &refreshed, today)
                .await?;
            report.skipped_already_sent += schedule.already_sent.len();
            planned.extend(
                schedule
                    .requests
                    .into_iter()
                    .map(|request| (refreshed.clone(), request)),
            );
        }

        let outcomes: Vec<_> = stream::iter(planned)
            .map(|(debt, request)| async move {
                let result = self.dispatch_scheduled(&debt, &request).await;
                (request, result)
            })
            .buffer_unordered(self.tick_concurrency)
            .collect()
            .await;

        for (request, result) in outcomes {
            match result {
                Ok(reminder) => report.sent.push(TickSent {
                    debt_id: request.debt_id,
                    offset_days: request.offset_days,
                    reminder_id: reminder.reminder_id,
                }),
                Err(CollectionsError::Storage(e)) => return Err(CollectionsError::Storage(e)),
                Err(e) => {
                    let reminder_id = match &e {
                        CollectionsError::SendFailed { reminder_id, .. } => Some(*reminder_id),
                        _ => None,
                    };
                    let failure = TickFailure {
                        user_id: request.user_id,
                        debt_id: request.debt_id,
                        offset_days: request.offset_days,
                        reminder_id,
                        code: e.code().to_string(),
                        message: e.to_string(),
                    };
                    if e.is_quota_denial() {
                        warn!(
                            user_id = %request.user_id,
                            debt_id = %request.debt_id,
                            reason = e.code(),
                            "Scheduled reminder refused by quota"
                        );
                        report.quota_denied.push(failure);
                    } else {
                        report.failed.push(failure);
                    }
                }
            }
        }

        info!(
            date = %today,
            users = report.users,
            debts = report.debts_considered,
            sent = report.sent.len(),
            failed = report.failed.len(),
            quota_denied = report.quota_denied.len(),
            skipped = report.skipped_already_sent,
            "Scheduling tick finished"
        );
        Ok(report)
    }

    async fn dispatch_scheduled(
        &self,
        debt: &Debt,
        request: &DispatchRequest,
    ) -> Result<Reminder, CollectionsError> {
        let customer = self
            .ledger
            .get_customer(request.user_id, debt.customer_id)
            .await?;
        self.dispatch
            .send(
                debt,
                &customer,
                request.channel,
                request.template_id,
                Some(request.offset_days),
            )
            .await
    }
}
