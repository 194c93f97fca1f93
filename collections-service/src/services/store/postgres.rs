use super::{CollectionsStore, StoreResult};
use crate::error::CollectionsError;
use crate::models::{
    Channel, Customer, CustomerResponse, Debt, DebtStatus, QuotaCounter, QuotaPeriod, Reminder,
    PlanInfo, PlanTier, ReminderSettings, ReminderStatus, ResponseStatus, Template,
    TenantAccount, TenantProfile,
};
use crate::services::metrics::DB_QUERY_DURATION;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

/// PostgreSQL-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

fn db_error(context: &str, e: sqlx::Error) -> CollectionsError {
    CollectionsError::Storage(anyhow::anyhow!("{}: {}", context, e))
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

const DEBT_COLUMNS: &str = "debt_id, user_id, customer_id, amount, currency, invoice_number, \
     invoice_date, due_date, paid_amount, paid_date, status, notes, version, created_utc, updated_utc";

const RESPONSE_COLUMNS: &str = "response_id, user_id, debt_id, customer_id, response_type, \
     response_utc, claimed_payment_date, claimed_reference, claimed_amount, comments, status, \
     internal_notes, resolved_utc";

const REMINDER_COLUMNS: &str = "reminder_id, user_id, debt_id, customer_id, channel, template_id, \
     offset_days, sent_utc, status, provider_message_id, error_message, response";

const TEMPLATE_COLUMNS: &str =
    "template_id, user_id, name, channel, subject, body, is_default, created_utc";

const TENANT_COLUMNS: &str =
    "user_id, plan_tier, whatsapp_limit_override, user_name, company_name, updated_utc";

const SETTINGS_COLUMNS: &str =
    "user_id, enabled, reminder_days, default_template_id, default_channel, updated_utc";

#[derive(FromRow)]
struct CustomerRow {
    customer_id: Uuid,
    user_id: Uuid,
    name: String,
    email: Option<String>,
    phone: Option<String>,
    notes: Option<String>,
    created_utc: DateTime<Utc>,
    updated_utc: DateTime<Utc>,
}

impl From<CustomerRow> for Customer {
    fn from(r: CustomerRow) -> Self {
        Self {
            customer_id: r.customer_id,
            user_id: r.user_id,
            name: r.name,
            email: r.email,
            phone: r.phone,
            notes: r.notes,
            created_utc: r.created_utc,
            updated_utc: r.updated_utc,
        }
    }
}

#[derive(FromRow)]
struct DebtRow {
    debt_id: Uuid,
    user_id: Uuid,
    customer_id: Uuid,
    amount: Decimal,
    currency: String,
    invoice_number: String,
    invoice_date: NaiveDate,
    due_date: NaiveDate,
    paid_amount: Decimal,
    paid_date: Option<NaiveDate>,
    status: String,
    notes: Option<String>,
    version: i64,
    created_utc: DateTime<Utc>,
    updated_utc: DateTime<Utc>,
}

impl From<DebtRow> for Debt {
    fn from(r: DebtRow) -> Self {
        Self {
            debt_id: r.debt_id,
            user_id: r.user_id,
            customer_id: r.customer_id,
            amount: r.amount,
            currency: r.currency,
            invoice_number: r.invoice_number,
            invoice_date: r.invoice_date,
            due_date: r.due_date,
            paid_amount: r.paid_amount,
            paid_date: r.paid_date,
            status: DebtStatus::from_string(&r.status),
            notes: r.notes,
            version: r.version,
            created_utc: r.created_utc,
            updated_utc: r.updated_utc,
        }
    }
}

#[derive(FromRow)]
struct TemplateRow {
    template_id: Uuid,
    user_id: Uuid,
    name: String,
    channel: String,
    subject: Option<String>,
    body: String,
    is_default: bool,
    created_utc: DateTime<Utc>,
}

impl From<TemplateRow> for Template {
    fn from(r: TemplateRow) -> Self {
        Self {
            template_id: r.template_id,
            user_id: r.user_id,
            name: r.name,
            channel: Channel::from_string(&r.channel),
            subject: r.subject,
            body: r.body,
            is_default: r.is_default,
            created_utc: r.created_utc,
        }
    }
}

#[derive(FromRow)]
struct TenantRow {
    user_id: Uuid,
    plan_tier: String,
    whatsapp_limit_override: Option<i64>,
    user_name: String,
    company_name: String,
    updated_utc: DateTime<Utc>,
}

impl From<TenantRow> for TenantAccount {
    fn from(r: TenantRow) -> Self {
        Self {
            user_id: r.user_id,
            plan: PlanInfo {
                tier: PlanTier::from_string(&r.plan_tier),
                whatsapp_limit_override: r.whatsapp_limit_override,
            },
            profile: TenantProfile {
                user_name: r.user_name,
                company_name: r.company_name,
            },
            updated_utc: r.updated_utc,
        }
    }
}

#[derive(FromRow)]
struct SettingsRow {
    user_id: Uuid,
    enabled: bool,
    reminder_days: Vec<i32>,
    default_template_id: Option<Uuid>,
    default_channel: String,
    updated_utc: DateTime<Utc>,
}

impl From<SettingsRow> for ReminderSettings {
    fn from(r: SettingsRow) -> Self {
        Self {
            user_id: r.user_id,
            enabled: r.enabled,
            reminder_days: r.reminder_days,
            default_template_id: r.default_template_id,
            default_channel: Channel::from_string(&r.default_channel),
            updated_utc: r.updated_utc,
        }
    }
}

#[derive(FromRow)]
struct ReminderRow {
    reminder_id: Uuid,
    user_id: Uuid,
    debt_id: Uuid,
    customer_id: Uuid,
    channel: String,
    template_id: Uuid,
    offset_days: Option<i32>,
    sent_utc: DateTime<Utc>,
    status: String,
    provider_message_id: Option<String>,
    error_message: Option<String>,
    response: Option<String>,
}

impl From<ReminderRow> for Reminder {
    fn from(r: ReminderRow) -> Self {
        Self {
            reminder_id: r.reminder_id,
            user_id: r.user_id,
            debt_id: r.debt_id,
            customer_id: r.customer_id,
            channel: Channel::from_string(&r.channel),
            template_id: r.template_id,
            offset_days: r.offset_days,
            sent_utc: r.sent_utc,
            status: ReminderStatus::from_string(&r.status),
            provider_message_id: r.provider_message_id,
            error_message: r.error_message,
            response: r.response,
        }
    }
}

#[derive(FromRow)]
struct ResponseRow {
    response_id: Uuid,
    user_id: Uuid,
    debt_id: Uuid,
    customer_id: Uuid,
    response_type: String,
    response_utc: DateTime<Utc>,
    claimed_payment_date: Option<NaiveDate>,
    claimed_reference: Option<String>,
    claimed_amount: Option<Decimal>,
    comments: Option<String>,
    status: String,
    internal_notes: Option<String>,
    resolved_utc: Option<DateTime<Utc>>,
}

impl From<ResponseRow> for CustomerResponse {
    fn from(r: ResponseRow) -> Self {
        Self {
            response_id: r.response_id,
            user_id: r.user_id,
            debt_id: r.debt_id,
            customer_id: r.customer_id,
            response_type: Channel::from_string(&r.response_type),
            response_utc: r.response_utc,
            claimed_payment_date: r.claimed_payment_date,
            claimed_reference: r.claimed_reference,
            claimed_amount: r.claimed_amount,
            comments: r.comments,
            status: ResponseStatus::from_string(&r.status),
            internal_notes: r.internal_notes,
            resolved_utc: r.resolved_utc,
        }
    }
}

#[derive(FromRow)]
struct QuotaRow {
    used: i64,
    reserved: i64,
}

impl PgStore {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "collections-service"))]
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, CollectionsError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| db_error("Failed to connect", e))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), CollectionsError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| CollectionsError::Storage(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    async fn fetch_debt_version(&self, debt_id: Uuid, user_id: Uuid) -> StoreResult<Option<i64>> {
        sqlx::query_scalar::<_, i64>("SELECT version FROM debts WHERE debt_id = $1 AND user_id = $2")
            .bind(debt_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to read debt version", e))
    }
}

#[async_trait]
impl CollectionsStore for PgStore {
    #[instrument(skip(self))]
    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("Health check failed", e))?;
        Ok(())
    }

    #[instrument(skip(self, customer), fields(customer_id = %customer.customer_id))]
    async fn insert_customer(&self, customer: &Customer) -> StoreResult<()> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_customer"])
            .start_timer();

        sqlx::query(
            r#"
            INSERT INTO customers (customer_id, user_id, name, email, phone, notes, created_utc, updated_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(customer.customer_id)
        .bind(customer.user_id)
        .bind(&customer.name)
        .bind(&customer.email)
        .bind(&customer.phone)
        .bind(&customer.notes)
        .bind(customer.created_utc)
        .bind(customer.updated_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to insert customer", e))?;

        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_customer(
        &self,
        user_id: Uuid,
        customer_id: Uuid,
    ) -> StoreResult<Option<Customer>> {
        let row = sqlx::query_as::<_, CustomerRow>(
            r#"
            SELECT customer_id, user_id, name, email, phone, notes, created_utc, updated_utc
            FROM customers
            WHERE user_id = $1 AND customer_id = $2
            "#,
        )
        .bind(user_id)
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to get customer", e))?;

        Ok(row.map(Customer::from))
    }

    #[instrument(skip(self, debt), fields(debt_id = %debt.debt_id))]
    async fn insert_debt(&self, debt: &Debt) -> StoreResult<()> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_debt"])
            .start_timer();

        sqlx::query(
            r#"
            INSERT INTO debts (
                debt_id, user_id, customer_id, amount, currency, invoice_number, invoice_date,
                due_date, paid_amount, paid_date, status, notes, version, created_utc, updated_utc
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(debt.debt_id)
        .bind(debt.user_id)
        .bind(debt.customer_id)
        .bind(debt.amount)
        .bind(&debt.currency)
        .bind(&debt.invoice_number)
        .bind(debt.invoice_date)
        .bind(debt.due_date)
        .bind(debt.paid_amount)
        .bind(debt.paid_date)
        .bind(debt.status.as_str())
        .bind(&debt.notes)
        .bind(debt.version)
        .bind(debt.created_utc)
        .bind(debt.updated_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                CollectionsError::Conflict(format!("debt {} already exists", debt.debt_id))
            } else {
                db_error("Failed to insert debt", e)
            }
        })?;

        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_debt(&self, user_id: Uuid, debt_id: Uuid) -> StoreResult<Option<Debt>> {
        let row = sqlx::query_as::<_, DebtRow>(&format!(
            "SELECT {} FROM debts WHERE user_id = $1 AND debt_id = $2",
            DEBT_COLUMNS
        ))
        .bind(user_id)
        .bind(debt_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to get debt", e))?;

        Ok(row.map(Debt::from))
    }

    #[instrument(skip(self, debt), fields(debt_id = %debt.debt_id, version = debt.version))]
    async fn save_debt(&self, debt: &Debt) -> StoreResult<Debt> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["save_debt"])
            .start_timer();

        let row = sqlx::query_as::<_, DebtRow>(&format!(
            r#"
            UPDATE debts
            SET paid_amount = $3, paid_date = $4, status = $5, notes = $6,
                version = version + 1, updated_utc = NOW()
            WHERE debt_id = $1 AND user_id = $2 AND version = $7
            RETURNING {}
            "#,
            DEBT_COLUMNS
        ))
        .bind(debt.debt_id)
        .bind(debt.user_id)
        .bind(debt.paid_amount)
        .bind(debt.paid_date)
        .bind(debt.status.as_str())
        .bind(&debt.notes)
        .bind(debt.version)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to save debt", e))?;

        timer.observe_duration();

        match row {
            Some(row) => Ok(Debt::from(row)),
            None => match self.fetch_debt_version(debt.debt_id, debt.user_id).await? {
                Some(current) => Err(CollectionsError::Conflict(format!(
                    "debt {} is at version {}, write was based on {}",
                    debt.debt_id, current, debt.version
                ))),
                None => Err(CollectionsError::NotFound(format!("Debt {}", debt.debt_id))),
            },
        }
    }

    #[instrument(skip(self))]
    async fn list_open_debts_all(&self) -> StoreResult<Vec<Debt>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_open_debts_all"])
            .start_timer();

        let rows = sqlx::query_as::<_, DebtRow>(&format!(
            "SELECT {} FROM debts WHERE status <> 'paid' ORDER BY user_id, due_date, debt_id",
            DEBT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list open debts", e))?;

        timer.observe_duration();
        Ok(rows.into_iter().map(Debt::from).collect())
    }

    #[instrument(skip(self, template), fields(template_id = %template.template_id))]
    async fn insert_template(&self, template: &Template) -> StoreResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin transaction", e))?;

        if template.is_default {
            sqlx::query(
                "UPDATE templates SET is_default = FALSE WHERE user_id = $1 AND channel = $2 AND is_default",
            )
            .bind(template.user_id)
            .bind(template.channel.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("Failed to demote default template", e))?;
        }

        sqlx::query(
            r#"
            INSERT INTO templates (template_id, user_id, name, channel, subject, body, is_default, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(template.template_id)
        .bind(template.user_id)
        .bind(&template.name)
        .bind(template.channel.as_str())
        .bind(&template.subject)
        .bind(&template.body)
        .bind(template.is_default)
        .bind(template.created_utc)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                CollectionsError::Conflict(format!(
                    "another default {} template was created concurrently",
                    template.channel
                ))
            } else {
                db_error("Failed to insert template", e)
            }
        })?;

        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit transaction", e))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_template(
        &self,
        user_id: Uuid,
        template_id: Uuid,
    ) -> StoreResult<Option<Template>> {
        let row = sqlx::query_as::<_, TemplateRow>(&format!(
            "SELECT {} FROM templates WHERE user_id = $1 AND template_id = $2",
            TEMPLATE_COLUMNS
        ))
        .bind(user_id)
        .bind(template_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to get template", e))?;

        Ok(row.map(Template::from))
    }

    #[instrument(skip(self))]
    async fn default_template(
        &self,
        user_id: Uuid,
        channel: Channel,
    ) -> StoreResult<Option<Template>> {
        let row = sqlx::query_as::<_, TemplateRow>(&format!(
            "SELECT {} FROM templates WHERE user_id = $1 AND channel = $2 AND is_default",
            TEMPLATE_COLUMNS
        ))
        .bind(user_id)
        .bind(channel.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to get default template", e))?;

        Ok(row.map(Template::from))
    }

    #[instrument(skip(self))]
    async fn get_tenant(&self, user_id: Uuid) -> StoreResult<Option<TenantAccount>> {
        let row = sqlx::query_as::<_, TenantRow>(&format!(
            "SELECT {} FROM tenants WHERE user_id = $1",
            TENANT_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to fetch tenant", e))?;

        Ok(row.map(TenantAccount::from))
    }

    #[instrument(skip(self, account), fields(user_id = %account.user_id))]
    async fn put_tenant(&self, account: &TenantAccount) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO tenants (user_id, plan_tier, whatsapp_limit_override, user_name, company_name, updated_utc)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (user_id) DO UPDATE
            SET plan_tier = EXCLUDED.plan_tier,
                whatsapp_limit_override = EXCLUDED.whatsapp_limit_override,
                user_name = EXCLUDED.user_name,
                company_name = EXCLUDED.company_name,
                updated_utc = EXCLUDED.updated_utc
            "#,
        )
        .bind(account.user_id)
        .bind(account.plan.tier.as_str())
        .bind(account.plan.whatsapp_limit_override)
        .bind(&account.profile.user_name)
        .bind(&account.profile.company_name)
        .bind(account.updated_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to save tenant", e))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_settings(&self, user_id: Uuid) -> StoreResult<Option<ReminderSettings>> {
        let row = sqlx::query_as::<_, SettingsRow>(&format!(
            "SELECT {} FROM reminder_settings WHERE user_id = $1",
            SETTINGS_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to get reminder settings", e))?;

        Ok(row.map(ReminderSettings::from))
    }

    #[instrument(skip(self, settings), fields(user_id = %settings.user_id))]
    async fn put_settings(&self, settings: &ReminderSettings) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO reminder_settings (user_id, enabled, reminder_days, default_template_id, default_channel, updated_utc)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (user_id) DO UPDATE
            SET enabled = EXCLUDED.enabled,
                reminder_days = EXCLUDED.reminder_days,
                default_template_id = EXCLUDED.default_template_id,
                default_channel = EXCLUDED.default_channel,
                updated_utc = EXCLUDED.updated_utc
            "#,
        )
        .bind(settings.user_id)
        .bind(settings.enabled)
        .bind(&settings.reminder_days)
        .bind(settings.default_template_id)
        .bind(settings.default_channel.as_str())
        .bind(settings.updated_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to save reminder settings", e))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_enabled_settings(&self) -> StoreResult<Vec<ReminderSettings>> {
        let rows = sqlx::query_as::<_, SettingsRow>(&format!(
            "SELECT {} FROM reminder_settings WHERE enabled ORDER BY user_id",
            SETTINGS_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list reminder settings", e))?;

        Ok(rows.into_iter().map(ReminderSettings::from).collect())
    }

    #[instrument(skip(self, reminder), fields(reminder_id = %reminder.reminder_id, debt_id = %reminder.debt_id))]
    async fn insert_reminder(&self, reminder: &Reminder) -> StoreResult<()> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_reminder"])
            .start_timer();

        sqlx::query(
            r#"
            INSERT INTO reminders (
                reminder_id, user_id, debt_id, customer_id, channel, template_id, offset_days,
                sent_utc, status, provider_message_id, error_message, response
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (reminder_id) DO NOTHING
            "#,
        )
        .bind(reminder.reminder_id)
        .bind(reminder.user_id)
        .bind(reminder.debt_id)
        .bind(reminder.customer_id)
        .bind(reminder.channel.as_str())
        .bind(reminder.template_id)
        .bind(reminder.offset_days)
        .bind(reminder.sent_utc)
        .bind(reminder.status.as_str())
        .bind(&reminder.provider_message_id)
        .bind(&reminder.error_message)
        .bind(&reminder.response)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to insert reminder", e))?;

        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_reminders(&self, user_id: Uuid, debt_id: Uuid) -> StoreResult<Vec<Reminder>> {
        let rows = sqlx::query_as::<_, ReminderRow>(&format!(
            "SELECT {} FROM reminders WHERE user_id = $1 AND debt_id = $2 ORDER BY sent_utc",
            REMINDER_COLUMNS
        ))
        .bind(user_id)
        .bind(debt_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list reminders", e))?;

        Ok(rows.into_iter().map(Reminder::from).collect())
    }

    #[instrument(skip(self))]
    async fn has_reminder_for_offset(&self, debt_id: Uuid, offset_days: i32) -> StoreResult<bool> {
        sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM reminders
                WHERE debt_id = $1 AND offset_days = $2 AND status <> 'failed'
            )
            "#,
        )
        .bind(debt_id)
        .bind(offset_days)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("Failed to check reminder offset", e))
    }

    #[instrument(skip(self))]
    async fn mark_reminder_delivered(
        &self,
        user_id: Uuid,
        reminder_id: Uuid,
    ) -> StoreResult<Reminder> {
        let row = sqlx::query_as::<_, ReminderRow>(&format!(
            r#"
            UPDATE reminders SET status = 'delivered'
            WHERE user_id = $1 AND reminder_id = $2 AND status IN ('sent', 'delivered')
            RETURNING {}
            "#,
            REMINDER_COLUMNS
        ))
        .bind(user_id)
        .bind(reminder_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to mark reminder delivered", e))?;

        if let Some(row) = row {
            return Ok(Reminder::from(row));
        }

        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM reminders WHERE user_id = $1 AND reminder_id = $2)",
        )
        .bind(user_id)
        .bind(reminder_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("Failed to read reminder", e))?;

        if exists {
            Err(CollectionsError::Conflict(format!(
                "reminder {} failed and cannot be delivered",
                reminder_id
            )))
        } else {
            Err(CollectionsError::NotFound(format!("Reminder {}", reminder_id)))
        }
    }

    #[instrument(skip(self, response), fields(response_id = %response.response_id, debt_id = %response.debt_id))]
    async fn insert_claim(&self, response: &CustomerResponse) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO customer_responses (
                response_id, user_id, debt_id, customer_id, response_type, response_utc,
                claimed_payment_date, claimed_reference, claimed_amount, comments, status,
                internal_notes, resolved_utc
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(response.response_id)
        .bind(response.user_id)
        .bind(response.debt_id)
        .bind(response.customer_id)
        .bind(response.response_type.as_str())
        .bind(response.response_utc)
        .bind(response.claimed_payment_date)
        .bind(&response.claimed_reference)
        .bind(response.claimed_amount)
        .bind(&response.comments)
        .bind(response.status.as_str())
        .bind(&response.internal_notes)
        .bind(response.resolved_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                CollectionsError::ClaimAlreadyPending(response.debt_id)
            } else {
                db_error("Failed to insert claim", e)
            }
        })?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_response(
        &self,
        user_id: Uuid,
        response_id: Uuid,
    ) -> StoreResult<Option<CustomerResponse>> {
        let row = sqlx::query_as::<_, ResponseRow>(&format!(
            "SELECT {} FROM customer_responses WHERE user_id = $1 AND response_id = $2",
            RESPONSE_COLUMNS
        ))
        .bind(user_id)
        .bind(response_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to get response", e))?;

        Ok(row.map(CustomerResponse::from))
    }

    #[instrument(skip(self))]
    async fn has_pending_claim(&self, debt_id: Uuid) -> StoreResult<bool> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM customer_responses WHERE debt_id = $1 AND status = 'pending')",
        )
        .bind(debt_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("Failed to check pending claim", e))
    }

    #[instrument(skip(self, internal_notes))]
    async fn resolve_response(
        &self,
        user_id: Uuid,
        response_id: Uuid,
        status: ResponseStatus,
        internal_notes: Option<String>,
        resolved_utc: DateTime<Utc>,
    ) -> StoreResult<CustomerResponse> {
        let row = sqlx::query_as::<_, ResponseRow>(&format!(
            r#"
            UPDATE customer_responses
            SET status = $3, internal_notes = $4, resolved_utc = $5
            WHERE user_id = $1 AND response_id = $2 AND status = 'pending'
            RETURNING {}
            "#,
            RESPONSE_COLUMNS
        ))
        .bind(user_id)
        .bind(response_id)
        .bind(status.as_str())
        .bind(&internal_notes)
        .bind(resolved_utc)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to resolve response", e))?;

        match row {
            Some(row) => Ok(CustomerResponse::from(row)),
            None => match self.get_response(user_id, response_id).await? {
                Some(_) => Err(CollectionsError::AlreadyResolved(response_id)),
                None => Err(CollectionsError::NotFound(format!("Response {}", response_id))),
            },
        }
    }

    #[instrument(skip(self))]
    async fn reopen_response(&self, user_id: Uuid, response_id: Uuid) -> StoreResult<()> {
        let debt_id = sqlx::query_scalar::<_, Uuid>(
            "SELECT debt_id FROM customer_responses WHERE user_id = $1 AND response_id = $2",
        )
        .bind(user_id)
        .bind(response_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to fetch response", e))?
        .ok_or_else(|| CollectionsError::NotFound(format!("Response {}", response_id)))?;

        // The partial unique index allows one pending claim per debt.
        sqlx::query(
            r#"
            UPDATE customer_responses
            SET status = 'pending', resolved_utc = NULL
            WHERE user_id = $1 AND response_id = $2
            "#,
        )
        .bind(user_id)
        .bind(response_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                CollectionsError::ClaimAlreadyPending(debt_id)
            } else {
                db_error("Failed to reopen response", e)
            }
        })?;
        Ok(())
    }

    #[instrument(skip(self))]
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

        let timer = DB_QUERY_DURATION
            .with_label_values(&["try_reserve_quota"])
            .start_timer();

        // Single statement: the conditional upsert is the compare-and-increment.
        let reserved = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO quota_counters (user_id, channel, period, used, reserved)
            VALUES ($1, $2, $3, 0, 1)
            ON CONFLICT (user_id, channel, period) DO UPDATE
            SET reserved = quota_counters.reserved + 1
            WHERE quota_counters.used + quota_counters.reserved < $4
            RETURNING reserved
            "#,
        )
        .bind(user_id)
        .bind(channel.as_str())
        .bind(period.key())
        .bind(limit)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to reserve quota", e))?;

        timer.observe_duration();
        Ok(reserved.is_some())
    }

    #[instrument(skip(self))]
    async fn commit_quota(
        &self,
        user_id: Uuid,
        channel: Channel,
        period: QuotaPeriod,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE quota_counters
            SET used = used + 1, reserved = GREATEST(reserved - 1, 0)
            WHERE user_id = $1 AND channel = $2 AND period = $3
            "#,
        )
        .bind(user_id)
        .bind(channel.as_str())
        .bind(period.key())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to commit quota", e))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn release_quota(
        &self,
        user_id: Uuid,
        channel: Channel,
        period: QuotaPeriod,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE quota_counters
            SET reserved = GREATEST(reserved - 1, 0)
            WHERE user_id = $1 AND channel = $2 AND period = $3
            "#,
        )
        .bind(user_id)
        .bind(channel.as_str())
        .bind(period.key())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to release quota", e))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn quota_counter(
        &self,
        user_id: Uuid,
        channel: Channel,
        period: QuotaPeriod,
    ) -> StoreResult<QuotaCounter> {
        let row = sqlx::query_as::<_, QuotaRow>(
            "SELECT used, reserved FROM quota_counters WHERE user_id = $1 AND channel = $2 AND period = $3",
        )
        .bind(user_id)
        .bind(channel.as_str())
        .bind(period.key())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to read quota", e))?;

        let mut counter = QuotaCounter::empty(user_id, channel, period);
        if let Some(row) = row {
            counter.used = row.used;
            counter.reserved = row.reserved;
        }
        Ok(counter)
    }

    #[instrument(skip(self))]
    async fn reset_quotas(&self, period: QuotaPeriod) -> StoreResult<u64> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin transaction", e))?;

        // Period keys are zero-padded, so text order is chronological.
        let removed = sqlx::query("DELETE FROM quota_counters WHERE period < $1")
            .bind(period.key())
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("Failed to drop old quota counters", e))?
            .rows_affected();

        let zeroed = sqlx::query("UPDATE quota_counters SET used = 0 WHERE period = $1 AND used > 0")
            .bind(period.key())
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("Failed to reset quota counters", e))?
            .rows_affected();

        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit transaction", e))?;

        info!(period = %period, removed, zeroed, "Quota counters reset");
        Ok(removed + zeroed)
    }
}
