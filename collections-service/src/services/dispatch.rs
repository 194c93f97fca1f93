//! Sends one reminder: template → recipient → quota → render → provider →
//! reminder log.
//!
//! Manual and scheduled sends share this path. Every provider attempt,
//! successful or not, leaves exactly one `Reminder` row behind; refusals
//! before the provider is called (no template, no recipient, no quota)
//! leave none.

use super::metrics::{REMINDERS_TOTAL, SEND_DURATION};
use super::providers::{OutboundMessage, ProviderError, ProviderResponse, SenderRegistry};
use super::quota::{QuotaReservation, QuotaTracker};
use super::renderer::{render_template, TemplateContext};
use super::store::CollectionsStore;
use super::tenants::TenantDirectory;
use crate::config::DispatchConfig;
use crate::error::CollectionsError;
use crate::models::{Channel, Customer, Debt, Reminder, Template};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct DispatchCoordinator {
    store: Arc<dyn CollectionsStore>,
    tenants: Arc<dyn TenantDirectory>,
    senders: SenderRegistry,
    quota: QuotaTracker,
    config: DispatchConfig,
}

impl DispatchCoordinator {
    pub fn new(
        store: Arc<dyn CollectionsStore>,
        tenants: Arc<dyn TenantDirectory>,
        senders: SenderRegistry,
        quota: QuotaTracker,
        config: DispatchConfig,
    ) -> Self {
        Self {
            store,
            tenants,
            senders,
            quota,
            config,
        }
    }

    /// Explicit template if given, otherwise the channel default.
    pub async fn resolve_template(
        &self,
        user_id: Uuid,
        channel: Channel,
        template_id: Option<Uuid>,
    ) -> Result<Template, CollectionsError> {
        let template = match template_id {
            Some(id) => self
                .store
                .get_template(user_id, id)
                .await?
                .filter(|t| t.channel == channel),
            None => self.store.default_template(user_id, channel).await?,
        };
        template.ok_or_else(|| CollectionsError::NoTemplateConfigured {
            channel: channel.as_str().to_string(),
        })
    }

    /// Sends a reminder for `debt`. `offset_days` is set for scheduled
    /// sends and `None` for manual ones.
    #[instrument(
        skip_all,
        fields(user_id = %debt.user_id, debt_id = %debt.debt_id, channel = %channel)
    )]
    pub async fn send(
        &self,
        debt: &Debt,
        customer: &Customer,
        channel: Channel,
        template_id: Option<Uuid>,
        offset_days: Option<i32>,
    ) -> Result<Reminder, CollectionsError> {
        let template = self
            .resolve_template(debt.user_id, channel, template_id)
            .await?;

        let recipient = match channel {
            Channel::Email => customer.email_address(),
            Channel::Whatsapp => customer.phone_number(),
        }
        .ok_or_else(|| CollectionsError::MissingRecipient {
            channel: channel.as_str().to_string(),
        })?
        .to_string();

        let profile = self.tenants.profile(debt.user_id).await?;
        let reservation = self.quota.check_and_reserve(debt.user_id, channel).await?;

        let context = TemplateContext::new(debt, customer, &profile, &self.config.date_format);
        let rendered = render_template(&template, &context);
        let message = OutboundMessage {
            channel,
            to: recipient,
            subject: rendered.subject,
            body: rendered.body,
        };

        let outcome = self.deliver(&message).await;

        let reminder = Reminder::record(
            debt.user_id,
            debt.debt_id,
            customer.customer_id,
            channel,
            template.template_id,
            offset_days,
            outcome
                .as_ref()
                .map(|r| r.message_id.clone())
                .map_err(|e| e.to_string()),
        );

        match outcome {
            Ok(_) => {
                let stored = self.store_sent(&reminder).await;
                if let Err(e) = self.quota.commit(reservation).await {
                    error!(error = %e, reminder_id = %reminder.reminder_id, "Failed to commit quota after send");
                }
                stored?;
                REMINDERS_TOTAL
                    .with_label_values(&[channel.as_str(), "sent"])
                    .inc();
                info!(
                    reminder_id = %reminder.reminder_id,
                    template_id = %template.template_id,
                    offset_days = ?offset_days,
                    "Reminder sent"
                );
                Ok(reminder)
            }
            Err(source) => {
                self.release(reservation).await;
                self.store.insert_reminder(&reminder).await?;
                REMINDERS_TOTAL
                    .with_label_values(&[channel.as_str(), "failed"])
                    .inc();
                warn!(
                    reminder_id = %reminder.reminder_id,
                    error = %source,
                    "Reminder send failed"
                );
                Err(CollectionsError::SendFailed {
                    reminder_id: reminder.reminder_id,
                    source,
                })
            }
        }
    }

    /// Logs a reminder the provider already accepted. The insert is retried
    /// once; if both attempts fail the provider message id is logged so the
    /// delivered message can be traced.
    async fn store_sent(&self, reminder: &Reminder) -> Result<(), CollectionsError> {
        let first = match self.store.insert_reminder(reminder).await {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };
        warn!(
            error = %first,
            reminder_id = %reminder.reminder_id,
            "Failed to log sent reminder, retrying"
        );

        self.store.insert_reminder(reminder).await.map_err(|e| {
            error!(
                error = %e,
                reminder_id = %reminder.reminder_id,
                provider_message_id = ?reminder.provider_message_id,
                "Sent reminder could not be logged"
            );
            e
        })
    }

    /// Provider call bounded by the configured send timeout.
    async fn deliver(
        &self,
        message: &OutboundMessage,
    ) -> Result<ProviderResponse, ProviderError> {
        let sender = self.senders.get(message.channel)?;
        let started = Instant::now();

        let result = tokio::time::timeout(self.config.send_timeout, sender.send(message))
            .await
            .unwrap_or(Err(ProviderError::Timeout(self.config.send_timeout)));

        SEND_DURATION
            .with_label_values(&[message.channel.as_str()])
            .observe(started.elapsed().as_secs_f64());
        result
    }

    async fn release(&self, reservation: QuotaReservation) {
        if let Err(e) = self.quota.release(reservation).await {
            error!(error = %e, "Failed to release quota reservation");
        }
    }
}
