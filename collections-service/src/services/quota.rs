//! Per-tenant monthly WhatsApp quota.
//!
//! Sends reserve a unit before calling the provider. A successful send
//! commits the reservation, a failed or timed-out one releases it, so only
//! delivered-to-provider messages consume quota.

use super::clock::Clock;
use super::metrics::QUOTA_DENIALS_TOTAL;
use super::store::CollectionsStore;
use super::tenants::TenantDirectory;
use crate::error::CollectionsError;
use crate::models::{Channel, PlanTier, QuotaPeriod, QuotaStatus};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Outcome of a successful `check_and_reserve`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaReservation {
    /// Channel is not metered; nothing to commit or release.
    Unmetered,
    Reserved {
        user_id: Uuid,
        channel: Channel,
        period: QuotaPeriod,
    },
}

#[derive(Clone)]
pub struct QuotaTracker {
    store: Arc<dyn CollectionsStore>,
    tenants: Arc<dyn TenantDirectory>,
    clock: Arc<dyn Clock>,
}

impl QuotaTracker {
    pub fn new(
        store: Arc<dyn CollectionsStore>,
        tenants: Arc<dyn TenantDirectory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            tenants,
            clock,
        }
    }

    /// Reserves one send. Email is always allowed; WhatsApp requires a paid
    /// plan and a free unit in the current month.
    #[instrument(skip(self))]
    pub async fn check_and_reserve(
        &self,
        user_id: Uuid,
        channel: Channel,
    ) -> Result<QuotaReservation, CollectionsError> {
        if !channel.is_metered() {
            return Ok(QuotaReservation::Unmetered);
        }

        let plan = self.tenants.plan(user_id).await?;
        if plan.tier == PlanTier::Free {
            QUOTA_DENIALS_TOTAL
                .with_label_values(&["plan_not_eligible"])
                .inc();
            return Err(CollectionsError::PlanNotEligible {
                tier: plan.tier.as_str().to_string(),
            });
        }

        let limit = plan.whatsapp_limit();
        let period = QuotaPeriod::containing(self.clock.today());
        if !self
            .store
            .try_reserve_quota(user_id, channel, period, limit)
            .await?
        {
            QUOTA_DENIALS_TOTAL
                .with_label_values(&["quota_exceeded"])
                .inc();
            warn!(user_id = %user_id, limit, period = %period, "WhatsApp quota exhausted");
            return Err(CollectionsError::QuotaExceeded { limit });
        }

        Ok(QuotaReservation::Reserved {
            user_id,
            channel,
            period,
        })
    }

    /// Turns a reservation into consumed quota.
    pub async fn commit(&self, reservation: QuotaReservation) -> Result<(), CollectionsError> {
        match reservation {
            QuotaReservation::Unmetered => Ok(()),
            QuotaReservation::Reserved {
                user_id,
                channel,
                period,
            } => self.store.commit_quota(user_id, channel, period).await,
        }
    }

    /// Hands a reservation back without consuming quota.
    pub async fn release(&self, reservation: QuotaReservation) -> Result<(), CollectionsError> {
        match reservation {
            QuotaReservation::Unmetered => Ok(()),
            QuotaReservation::Reserved {
                user_id,
                channel,
                period,
            } => self.store.release_quota(user_id, channel, period).await,
        }
    }

    /// Period-boundary reset, triggered externally. Zeroes usage for the
    /// current month and drops counters of earlier months.
    #[instrument(skip(self))]
    pub async fn monthly_reset(&self) -> Result<u64, CollectionsError> {
        let period = QuotaPeriod::containing(self.clock.today());
        let touched = self.store.reset_quotas(period).await?;
        info!(period = %period, touched, "Monthly quota reset");
        Ok(touched)
    }

    pub async fn status(&self, user_id: Uuid) -> Result<QuotaStatus, CollectionsError> {
        let plan = self.tenants.plan(user_id).await?;
        let period = QuotaPeriod::containing(self.clock.today());
        let counter = self
            .store
            .quota_counter(user_id, Channel::Whatsapp, period)
            .await?;

        let limit = if plan.tier == PlanTier::Free {
            0
        } else {
            plan.whatsapp_limit()
        };

        Ok(QuotaStatus {
            user_id,
            tier: plan.tier,
            period: period.key(),
            whatsapp_limit: limit,
            whatsapp_used: counter.used,
            whatsapp_reserved: counter.reserved,
            whatsapp_remaining: (limit - counter.used - counter.reserved).max(0),
            email_unmetered: true,
        })
    }
}
