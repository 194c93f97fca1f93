use super::{CollectionsStore, StoreResult};
use crate::error::CollectionsError;
use crate::models::{
    Channel, Customer, CustomerResponse, Debt, DebtStatus, QuotaCounter, QuotaPeriod, Reminder,
    ReminderSettings, ReminderStatus, ResponseStatus, Template, TenantAccount,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

type QuotaKey = (Uuid, Channel, QuotaPeriod);

/// In-process store. Every atomic operation runs under a single DashMap
/// shard lock and never holds a guard across an await point.
#[derive(Default)]
pub struct MemoryStore {
    customers: DashMap<Uuid, Customer>,
    debts: DashMap<Uuid, Debt>,
    templates: DashMap<Uuid, Template>,
    default_templates: DashMap<(Uuid, Channel), Uuid>,
    settings: DashMap<Uuid, ReminderSettings>,
    reminders: DashMap<Uuid, Reminder>,
    responses: DashMap<Uuid, CustomerResponse>,
    /// debt_id -> pending response_id
    pending_claims: DashMap<Uuid, Uuid>,
    quotas: DashMap<QuotaKey, QuotaCounter>,
    tenants: DashMap<Uuid, TenantAccount>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CollectionsStore for MemoryStore {
    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn insert_customer(&self, customer: &Customer) -> StoreResult<()> {
        self.customers
            .insert(customer.customer_id, customer.clone());
        Ok(())
    }

    async fn get_customer(
        &self,
        user_id: Uuid,
        customer_id: Uuid,
    ) -> StoreResult<Option<Customer>> {
        Ok(self
            .customers
            .get(&customer_id)
            .filter(|c| c.user_id == user_id)
            .map(|c| c.clone()))
    }

    async fn insert_debt(&self, debt: &Debt) -> StoreResult<()> {
        match self.debts.entry(debt.debt_id) {
            Entry::Occupied(_) => Err(CollectionsError::Conflict(format!(
                "debt {} already exists",
                debt.debt_id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(debt.clone());
                Ok(())
            }
        }
    }

    async fn get_debt(&self, user_id: Uuid, debt_id: Uuid) -> StoreResult<Option<Debt>> {
        Ok(self
            .debts
            .get(&debt_id)
            .filter(|d| d.user_id == user_id)
            .map(|d| d.clone()))
    }

    async fn save_debt(&self, debt: &Debt) -> StoreResult<Debt> {
        let mut stored = self
            .debts
            .get_mut(&debt.debt_id)
            .filter(|d| d.user_id == debt.user_id)
            .ok_or_else(|| CollectionsError::NotFound(format!("Debt {}", debt.debt_id)))?;

        if stored.version != debt.version {
            return Err(CollectionsError::Conflict(format!(
                "debt {} is at version {}, write was based on {}",
                debt.debt_id, stored.version, debt.version
            )));
        }

        let mut next = debt.clone();
        next.version += 1;
        next.updated_utc = Utc::now();
        *stored = next.clone();
        Ok(next)
    }

    async fn list_open_debts_all(&self) -> StoreResult<Vec<Debt>> {
        let mut debts: Vec<Debt> = self
            .debts
            .iter()
            .filter(|d| d.status != DebtStatus::Paid)
            .map(|d| d.clone())
            .collect();
        debts.sort_by_key(|d| (d.user_id, d.due_date, d.debt_id));
        Ok(debts)
    }

    async fn insert_template(&self, template: &Template) -> StoreResult<()> {
        // Insert first so a concurrent default swap can always demote it.
        self.templates
            .insert(template.template_id, template.clone());

        if template.is_default {
            let previous = self
                .default_templates
                .insert((template.user_id, template.channel), template.template_id);
            if let Some(previous) = previous.filter(|id| *id != template.template_id) {
                if let Some(mut old) = self.templates.get_mut(&previous) {
                    old.is_default = false;
                }
            }
        }
        Ok(())
    }

    async fn get_template(
        &self,
        user_id: Uuid,
        template_id: Uuid,
    ) -> StoreResult<Option<Template>> {
        Ok(self
            .templates
            .get(&template_id)
            .filter(|t| t.user_id == user_id)
            .map(|t| t.clone()))
    }

    async fn default_template(
        &self,
        user_id: Uuid,
        channel: Channel,
    ) -> StoreResult<Option<Template>> {
        let Some(template_id) = self.default_templates.get(&(user_id, channel)).map(|id| *id)
        else {
            return Ok(None);
        };
        self.get_template(user_id, template_id).await
    }

    async fn get_tenant(&self, user_id: Uuid) -> StoreResult<Option<TenantAccount>> {
        Ok(self.tenants.get(&user_id).map(|t| t.clone()))
    }

    async fn put_tenant(&self, account: &TenantAccount) -> StoreResult<()> {
        self.tenants.insert(account.user_id, account.clone());
        Ok(())
    }

    async fn get_settings(&self, user_id: Uuid) -> StoreResult<Option<ReminderSettings>> {
        Ok(self.settings.get(&user_id).map(|s| s.clone()))
    }

    async fn put_settings(&self, settings: &ReminderSettings) -> StoreResult<()> {
        self.settings.insert(settings.user_id, settings.clone());
        Ok(())
    }

    async fn list_enabled_settings(&self) -> StoreResult<Vec<ReminderSettings>> {
        Ok(self
            .settings
            .iter()
            .filter(|s| s.enabled)
            .map(|s| s.clone())
            .collect())
    }

    async fn insert_reminder(&self, reminder: &Reminder) -> StoreResult<()> {
        self.reminders
            .insert(reminder.reminder_id, reminder.clone());
        Ok(())
    }

    async fn list_reminders(&self, user_id: Uuid, debt_id: Uuid) -> StoreResult<Vec<Reminder>> {
        let mut reminders: Vec<Reminder> = self
            .reminders
            .iter()
            .filter(|r| r.user_id == user_id && r.debt_id == debt_id)
            .map(|r| r.clone())
            .collect();
        reminders.sort_by_key(|r| r.sent_utc);
        Ok(reminders)
    }

    async fn has_reminder_for_offset(&self, debt_id: Uuid, offset_days: i32) -> StoreResult<bool> {
        Ok(self.reminders.iter().any(|r| {
            r.debt_id == debt_id
                && r.offset_days == Some(offset_days)
                && r.status != ReminderStatus::Failed
        }))
    }

    async fn mark_reminder_delivered(
        &self,
        user_id: Uuid,
        reminder_id: Uuid,
    ) -> StoreResult<Reminder> {
        let mut reminder = self
            .reminders
            .get_mut(&reminder_id)
            .filter(|r| r.user_id == user_id)
            .ok_or_else(|| CollectionsError::NotFound(format!("Reminder {}", reminder_id)))?;

        match reminder.status {
            ReminderStatus::Sent => reminder.status = ReminderStatus::Delivered,
            ReminderStatus::Delivered => {}
            ReminderStatus::Failed => {
                return Err(CollectionsError::Conflict(format!(
                    "reminder {} failed and cannot be delivered",
                    reminder_id
                )));
            }
        }
        Ok(reminder.clone())
    }

    async fn insert_claim(&self, response: &CustomerResponse) -> StoreResult<()> {
        match self.pending_claims.entry(response.debt_id) {
            Entry::Occupied(_) => {
                return Err(CollectionsError::ClaimAlreadyPending(response.debt_id));
            }
            Entry::Vacant(slot) => {
                slot.insert(response.response_id);
            }
        }
        self.responses
            .insert(response.response_id, response.clone());
        Ok(())
    }

    async fn get_response(
        &self,
        user_id: Uuid,
        response_id: Uuid,
    ) -> StoreResult<Option<CustomerResponse>> {
        Ok(self
            .responses
            .get(&response_id)
            .filter(|r| r.user_id == user_id)
            .map(|r| r.clone()))
    }

    async fn has_pending_claim(&self, debt_id: Uuid) -> StoreResult<bool> {
        Ok(self.pending_claims.contains_key(&debt_id))
    }

    async fn resolve_response(
        &self,
        user_id: Uuid,
        response_id: Uuid,
        status: ResponseStatus,
        internal_notes: Option<String>,
        resolved_utc: DateTime<Utc>,
    ) -> StoreResult<CustomerResponse> {
        let resolved = {
            let mut response = self
                .responses
                .get_mut(&response_id)
                .filter(|r| r.user_id == user_id)
                .ok_or_else(|| CollectionsError::NotFound(format!("Response {}", response_id)))?;

            if !response.is_pending() {
                return Err(CollectionsError::AlreadyResolved(response_id));
            }
            response.status = status;
            response.internal_notes = internal_notes;
            response.resolved_utc = Some(resolved_utc);
            response.clone()
        };

        self.pending_claims
            .remove_if(&resolved.debt_id, |_, pending| *pending == response_id);
        Ok(resolved)
    }

    async fn reopen_response(&self, user_id: Uuid, response_id: Uuid) -> StoreResult<()> {
        let debt_id = self
            .responses
            .get(&response_id)
            .filter(|r| r.user_id == user_id)
            .map(|r| r.debt_id)
            .ok_or_else(|| CollectionsError::NotFound(format!("Response {}", response_id)))?;

        match self.pending_claims.entry(debt_id) {
            Entry::Occupied(slot) if *slot.get() != response_id => {
                return Err(CollectionsError::ClaimAlreadyPending(debt_id));
            }
            Entry::Occupied(_) => {}
            Entry::Vacant(slot) => {
                slot.insert(response_id);
            }
        }

        if let Some(mut response) = self.responses.get_mut(&response_id) {
            response.status = ResponseStatus::Pending;
            response.resolved_utc = None;
        }
        Ok(())
    }

    async fn try_reserve_quota(
        &self,
        user_id: Uuid,
        channel: Channel,
        period: QuotaPeriod,
        limit: i64,
    ) -> StoreResult<bool> {
        if limit <= 0 {
            return Ok(false);
        }
        let mut counter = self
            .quotas
            .entry((user_id, channel, period))
            .or_insert_with(|| QuotaCounter::empty(user_id, channel, period));

        if counter.used + counter.reserved >= limit {
            return Ok(false);
        }
        counter.reserved += 1;
        Ok(true)
    }

    async fn commit_quota(
        &self,
        user_id: Uuid,
        channel: Channel,
        period: QuotaPeriod,
    ) -> StoreResult<()> {
        let mut counter = self
            .quotas
            .entry((user_id, channel, period))
            .or_insert_with(|| QuotaCounter::empty(user_id, channel, period));
        counter.reserved = (counter.reserved - 1).max(0);
        counter.used += 1;
        Ok(())
    }

    async fn release_quota(
        &self,
        user_id: Uuid,
        channel: Channel,
        period: QuotaPeriod,
    ) -> StoreResult<()> {
        if let Some(mut counter) = self.quotas.get_mut(&(user_id, channel, period)) {
            counter.reserved = (counter.reserved - 1).max(0);
        }
        Ok(())
    }

    async fn quota_counter(
        &self,
        user_id: Uuid,
        channel: Channel,
        period: QuotaPeriod,
    ) -> StoreResult<QuotaCounter> {
        Ok(self
            .quotas
            .get(&(user_id, channel, period))
            .map(|c| *c)
            .unwrap_or_else(|| QuotaCounter::empty(user_id, channel, period)))
    }

    async fn reset_quotas(&self, period: QuotaPeriod) -> StoreResult<u64> {
        let before = self.quotas.len();
        self.quotas.retain(|(_, _, p), _| *p >= period);
        let mut touched = before.saturating_sub(self.quotas.len()) as u64;

        for mut counter in self.quotas.iter_mut() {
            if counter.period == period && counter.used > 0 {
                counter.used = 0;
                touched += 1;
            }
        }
        Ok(touched)
    }
}
