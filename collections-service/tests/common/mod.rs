#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use collections_service::config::DispatchConfig;
use collections_service::models::{
    Channel, CreateCustomer, CreateDebt, CreateTemplate, Customer, CustomerResponse, Debt,
    PlanInfo, PlanTier, QuotaCounter, QuotaPeriod, Reminder, ReminderSettings, ResponseStatus,
    Template, TenantAccount, TenantProfile, UpdateReminderSettings,
};
use collections_service::services::store::StoreResult;
use collections_service::services::{
    CollectionsEngine, CollectionsStore, FixedClock, MemoryStore, MockSender, SenderRegistry,
};
use collections_service::CollectionsError;
use collections_service::startup::{AppState, Application};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn money(value: &str) -> Decimal {
    Decimal::from_str(value).unwrap()
}

pub const ADMIN_KEY: &str = "test-admin-key";

pub fn dispatch_config(send_timeout: Duration, date_format: &str) -> DispatchConfig {
    DispatchConfig {
        send_timeout,
        date_format: date_format.to_string(),
        tick_concurrency: 4,
    }
}

fn profile() -> TenantProfile {
    TenantProfile {
        user_name: "Asha".to_string(),
        company_name: "Acme Traders".to_string(),
    }
}

/// Engine over the in-memory store with mock senders and a pinned clock.
pub struct Harness {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub email: Arc<MockSender>,
    pub whatsapp: Arc<MockSender>,
    pub clock: Arc<FixedClock>,
    pub user_id: Uuid,
}

impl Harness {
    pub async fn on(today: NaiveDate) -> Self {
        Self::with_timeout(today, Duration::from_secs(5)).await
    }

    pub async fn with_timeout(today: NaiveDate, send_timeout: Duration) -> Self {
        Self::with_config(today, dispatch_config(send_timeout, "%d/%m/%Y")).await
    }

    pub async fn with_config(today: NaiveDate, config: DispatchConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self::build(today, config, store.clone(), store).await
    }

    /// `engine_store` is what the engine talks to; `store` is the memory
    /// store underneath it, exposed for direct inspection.
    pub async fn build(
        today: NaiveDate,
        config: DispatchConfig,
        store: Arc<MemoryStore>,
        engine_store: Arc<dyn CollectionsStore>,
    ) -> Self {
        let email = Arc::new(MockSender::new(Channel::Email));
        let whatsapp = Arc::new(MockSender::new(Channel::Whatsapp));
        let clock = Arc::new(FixedClock::on(today));
        let senders = SenderRegistry::new()
            .with(email.clone())
            .with(whatsapp.clone());

        let state = AppState::new(
            engine_store,
            senders,
            clock.clone(),
            config,
            Some(ADMIN_KEY.to_string()),
        );

        let user_id = Uuid::new_v4();
        state
            .tenants
            .upsert(user_id, PlanInfo::default(), profile())
            .await
            .expect("Failed to save tenant");

        Self {
            state,
            store,
            email,
            whatsapp,
            clock,
            user_id,
        }
    }

    pub fn engine(&self) -> &CollectionsEngine {
        &self.state.engine
    }

    pub async fn set_plan(&self, tier: PlanTier, whatsapp_limit_override: Option<i64>) {
        self.state
            .tenants
            .upsert(
                self.user_id,
                PlanInfo {
                    tier,
                    whatsapp_limit_override,
                },
                profile(),
            )
            .await
            .expect("Failed to save tenant plan");
    }

    pub async fn customer(&self, email: Option<&str>, phone: Option<&str>) -> Customer {
        self.engine()
            .create_customer(
                self.user_id,
                CreateCustomer {
                    name: "Ravi Kumar".to_string(),
                    email: email.map(str::to_string),
                    phone: phone.map(str::to_string),
                    notes: None,
                },
            )
            .await
            .expect("Failed to create customer")
    }

    pub async fn debt(&self, customer: &Customer, amount: &str, due: NaiveDate) -> Debt {
        self.engine()
            .create_debt(
                self.user_id,
                CreateDebt {
                    customer_id: customer.customer_id,
                    amount: money(amount),
                    currency: "INR".to_string(),
                    invoice_number: "INV-042".to_string(),
                    invoice_date: due - chrono::Duration::days(30),
                    due_date: due,
                    notes: None,
                },
            )
            .await
            .expect("Failed to create debt")
    }

    pub async fn template(&self, channel: Channel, body: &str, is_default: bool) -> Template {
        self.engine()
            .create_template(
                self.user_id,
                CreateTemplate {
                    name: format!("{} reminder", channel),
                    channel,
                    subject: Some("Invoice {{invoiceNumber}}".to_string()),
                    body: body.to_string(),
                    is_default,
                },
            )
            .await
            .expect("Failed to create template")
    }

    pub async fn enable_reminders(&self, channel: Channel, days: Vec<i32>) {
        self.engine()
            .put_reminder_settings(
                self.user_id,
                UpdateReminderSettings {
                    enabled: true,
                    reminder_days: days,
                    default_template_id: None,
                    default_channel: channel,
                },
            )
            .await
            .expect("Failed to save reminder settings");
    }
}

/// HTTP server on a random port backed by a [`Harness`].
pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
    pub harness: Harness,
}

impl TestApp {
    pub async fn spawn(today: NaiveDate) -> Self {
        let harness = Harness::on(today).await;
        let app = Application::build_with_state(0, harness.state.clone())
            .await
            .expect("Failed to build test application");
        let address = format!("http://127.0.0.1:{}", app.port());

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        let client = reqwest::Client::new();
        for _ in 0..50 {
            if client
                .get(format!("{}/health", address))
                .send()
                .await
                .is_ok()
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        Self {
            address,
            client,
            harness,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    pub fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .post(self.url(path))
            .header("x-user-id", self.harness.user_id.to_string())
    }

    pub fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .get(self.url(path))
            .header("x-user-id", self.harness.user_id.to_string())
    }

    pub fn put(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .put(self.url(path))
            .header("x-user-id", self.harness.user_id.to_string())
    }

    pub fn admin_post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .post(self.url(path))
            .header("x-admin-api-key", ADMIN_KEY)
    }

    pub fn admin_put(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .put(self.url(path))
            .header("x-admin-api-key", ADMIN_KEY)
    }
}

/// Memory store whose next `insert_reminder` calls fail.
pub struct FlakyReminderStore {
    inner: Arc<MemoryStore>,
    failures_left: AtomicUsize,
    pub insert_attempts: AtomicUsize,
}

impl FlakyReminderStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            failures_left: AtomicUsize::new(0),
            insert_attempts: AtomicUsize::new(0),
        }
    }

    pub fn fail_next_inserts(&self, count: usize) {
        self.failures_left.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl CollectionsStore for FlakyReminderStore {
    async fn health_check(&self) -> StoreResult<()> {
        self.inner.health_check().await
    }

    async fn insert_customer(&self, customer: &Customer) -> StoreResult<()> {
        self.inner.insert_customer(customer).await
    }

    async fn get_customer(
        &self,
        user_id: Uuid,
        customer_id: Uuid,
    ) -> StoreResult<Option<Customer>> {
        self.inner.get_customer(user_id, customer_id).await
    }

    async fn insert_debt(&self, debt: &Debt) -> StoreResult<()> {
        self.inner.insert_debt(debt).await
    }

    async fn get_debt(&self, user_id: Uuid, debt_id: Uuid) -> StoreResult<Option<Debt>> {
        self.inner.get_debt(user_id, debt_id).await
    }

    async fn save_debt(&self, debt: &Debt) -> StoreResult<Debt> {
        self.inner.save_debt(debt).await
    }

    async fn list_open_debts_all(&self) -> StoreResult<Vec<Debt>> {
        self.inner.list_open_debts_all().await
    }

    async fn insert_template(&self, template: &Template) -> StoreResult<()> {
        self.inner.insert_template(template).await
    }

    async fn get_template(
        &self,
        user_id: Uuid,
        template_id: Uuid,
    ) -> StoreResult<Option<Template>> {
        self.inner.get_template(user_id, template_id).await
    }

    async fn default_template(
        &self,
        user_id: Uuid,
        channel: Channel,
    ) -> StoreResult<Option<Template>> {
        self.inner.default_template(user_id, channel).await
    }

    async fn get_tenant(&self, user_id: Uuid) -> StoreResult<Option<TenantAccount>> {
        self.inner.get_tenant(user_id).await
    }

    async fn put_tenant(&self, account: &TenantAccount) -> StoreResult<()> {
        self.inner.put_tenant(account).await
    }

    async fn get_settings(&self, user_id: Uuid) -> StoreResult<Option<ReminderSettings>> {
        self.inner.get_settings(user_id).await
    }

    async fn put_settings(&self, settings: &ReminderSettings) -> StoreResult<()> {
        self.inner.put_settings(settings).await
    }

    async fn list_enabled_settings(&self) -> StoreResult<Vec<ReminderSettings>> {
        self.inner.list_enabled_settings().await
    }

    async fn insert_reminder(&self, reminder: &Reminder) -> StoreResult<()> {
        self.insert_attempts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(CollectionsError::Storage(anyhow::anyhow!(
                "connection reset while inserting reminder"
            )));
        }
        self.inner.insert_reminder(reminder).await
    }

    async fn list_reminders(&self, user_id: Uuid, debt_id: Uuid) -> StoreResult<Vec<Reminder>> {
        self.inner.list_reminders(user_id, debt_id).await
    }

    async fn has_reminder_for_offset(&self, debt_id: Uuid, offset_days: i32) -> StoreResult<bool> {
        self.inner.has_reminder_for_offset(debt_id, offset_days).await
    }

    async fn mark_reminder_delivered(
        &self,
        user_id: Uuid,
        reminder_id: Uuid,
    ) -> StoreResult<Reminder> {
        self.inner.mark_reminder_delivered(user_id, reminder_id).await
    }

    async fn insert_claim(&self, response: &CustomerResponse) -> StoreResult<()> {
        self.inner.insert_claim(response).await
    }

    async fn get_response(
        &self,
        user_id: Uuid,
        response_id: Uuid,
    ) -> StoreResult<Option<CustomerResponse>> {
        self.inner.get_response(user_id, response_id).await
    }

    async fn has_pending_claim(&self, debt_id: Uuid) -> StoreResult<bool> {
        self.inner.has_pending_claim(debt_id).await
    }

    async fn resolve_response(
        &self,
        user_id: Uuid,
        response_id: Uuid,
        status: ResponseStatus,
        internal_notes: Option<String>,
        resolved_utc: DateTime<Utc>,
    ) -> StoreResult<CustomerResponse> {
        self.inner
            .resolve_response(user_id, response_id, status, internal_notes, resolved_utc)
            .await
    }

    async fn reopen_response(&self, user_id: Uuid, response_id: Uuid) -> StoreResult<()> {
        self.inner.reopen_response(user_id, response_id).await
    }

    async fn try_reserve_quota(
        &self,
        user_id: Uuid,
        channel: Channel,
        period: QuotaPeriod,
        limit: i64,
    ) -> StoreResult<bool> {
        self.inner
            .try_reserve_quota(user_id, channel, period, limit)
            .await
    }

    async fn commit_quota(
        &self,
        user_id: Uuid,
        channel: Channel,
        period: QuotaPeriod,
    ) -> StoreResult<()> {
        self.inner.commit_quota(user_id, channel, period).await
    }

    async fn release_quota(
        &self,
        user_id: Uuid,
        channel: Channel,
        period: QuotaPeriod,
    ) -> StoreResult<()> {
        self.inner.release_quota(user_id, channel, period).await
    }

    async fn quota_counter(
        &self,
        user_id: Uuid,
        channel: Channel,
        period: QuotaPeriod,
    ) -> StoreResult<QuotaCounter> {
        self.inner.quota_counter(user_id, channel, period).await
    }

    async fn reset_quotas(&self, period: QuotaPeriod) -> StoreResult<u64> {
        self.inner.reset_quotas(period).await
    }
}
