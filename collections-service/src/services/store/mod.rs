//! Persistence collaborator for the collections engine.
//!
//! Besides plain CRUD the trait exposes the atomic primitives the engine
//! relies on under concurrency: versioned debt writes, single pending claim
//! per debt, one-shot claim resolution and compare-and-increment quota
//! reservation.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::error::CollectionsError;
use crate::models::{
    Channel, Customer, CustomerResponse, Debt, QuotaCounter, QuotaPeriod, Reminder,
    ReminderSettings, ResponseStatus, Template, TenantAccount,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub type StoreResult<T> = Result<T, CollectionsError>;

#[async_trait]
pub trait CollectionsStore: Send + Sync {
    async fn health_check(&self) -> StoreResult<()>;

    // Customers

    async fn insert_customer(&self, customer: &Customer) -> StoreResult<()>;
    async fn get_customer(&self, user_id: Uuid, customer_id: Uuid)
        -> StoreResult<Option<Customer>>;

    // Debts

    async fn insert_debt(&self, debt: &Debt) -> StoreResult<()>;
    async fn get_debt(&self, user_id: Uuid, debt_id: Uuid) -> StoreResult<Option<Debt>>;

    /// Writes `debt` if the stored version still equals `debt.version`.
    /// Returns the stored row with its version bumped, or `Conflict` when
    /// another writer got there first.
    async fn save_debt(&self, debt: &Debt) -> StoreResult<Debt>;

    /// Debts not yet paid in full, across every tenant.
    async fn list_open_debts_all(&self) -> StoreResult<Vec<Debt>>;

    // Templates

    /// Inserts a template. A default template demotes the previous default
    /// for the same (user, channel).
    async fn insert_template(&self, template: &Template) -> StoreResult<()>;
    async fn get_template(&self, user_id: Uuid, template_id: Uuid)
        -> StoreResult<Option<Template>>;
    async fn default_template(&self, user_id: Uuid, channel: Channel)
        -> StoreResult<Option<Template>>;

    // Tenants

    async fn get_tenant(&self, user_id: Uuid) -> StoreResult<Option<TenantAccount>>;
    async fn put_tenant(&self, account: &TenantAccount) -> StoreResult<()>;

    // Reminder settings

    async fn get_settings(&self, user_id: Uuid) -> StoreResult<Option<ReminderSettings>>;
    async fn put_settings(&self, settings: &ReminderSettings) -> StoreResult<()>;
    async fn list_enabled_settings(&self) -> StoreResult<Vec<ReminderSettings>>;

    // Reminders

    async fn insert_reminder(&self, reminder: &Reminder) -> StoreResult<()>;
    async fn list_reminders(&self, user_id: Uuid, debt_id: Uuid) -> StoreResult<Vec<Reminder>>;

    /// Whether a non-failed reminder exists for the scheduled offset.
    async fn has_reminder_for_offset(&self, debt_id: Uuid, offset_days: i32) -> StoreResult<bool>;

    /// Moves a reminder from `sent` to `delivered`.
    async fn mark_reminder_delivered(&self, user_id: Uuid, reminder_id: Uuid)
        -> StoreResult<Reminder>;

    // Customer responses

    /// Inserts a pending claim, failing with `ClaimAlreadyPending` if the
    /// debt already has one.
    async fn insert_claim(&self, response: &CustomerResponse) -> StoreResult<()>;
    async fn get_response(&self, user_id: Uuid, response_id: Uuid)
        -> StoreResult<Option<CustomerResponse>>;
    async fn has_pending_claim(&self, debt_id: Uuid) -> StoreResult<bool>;

    /// Moves a pending response to `status`. Exactly one caller wins; the
    /// others get `AlreadyResolved`.
    async fn resolve_response(
        &self,
        user_id: Uuid,
        response_id: Uuid,
        status: ResponseStatus,
        internal_notes: Option<String>,
        resolved_utc: DateTime<Utc>,
    ) -> StoreResult<CustomerResponse>;

    /// Returns a verified response to `pending` after its payment could not
    /// be applied. Fails with `ClaimAlreadyPending` if another claim was
    /// submitted for the debt in the meantime.
    async fn reopen_response(&self, user_id: Uuid, response_id: Uuid) -> StoreResult<()>;

    // Quota counters

    /// Atomically reserves one unit if `used + reserved < limit`.
    async fn try_reserve_quota(
        &self,
        user_id: Uuid,
        channel: Channel,
        period: QuotaPeriod,
        limit: i64,
    ) -> StoreResult<bool>;

    /// Converts one reserved unit into a used one.
    async fn commit_quota(&self, user_id: Uuid, channel: Channel, period: QuotaPeriod)
        -> StoreResult<()>;

    /// Returns one reserved unit without consuming it.
    async fn release_quota(&self, user_id: Uuid, channel: Channel, period: QuotaPeriod)
        -> StoreResult<()>;

    async fn quota_counter(
        &self,
        user_id: Uuid,
        channel: Channel,
        period: QuotaPeriod,
    ) -> StoreResult<QuotaCounter>;

    /// Zeroes usage for `period` and discards older counters. Returns the
    /// number of counters touched.
    async fn reset_quotas(&self, period: QuotaPeriod) -> StoreResult<u64>;
}
