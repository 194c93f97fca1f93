//! Decides which scheduled reminders are due on a tick.

use super::store::CollectionsStore;
use crate::error::CollectionsError;
use crate::models::{Channel, Debt, DebtStatus, ReminderSettings};
use chrono::NaiveDate;
use std::sync::Arc;
use uuid::Uuid;

/// A reminder the dispatch coordinator should send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchRequest {
    pub user_id: Uuid,
    pub debt_id: Uuid,
    pub channel: Channel,
    pub template_id: Option<Uuid>,
    pub offset_days: i32,
}

/// Scheduling result for one debt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DebtSchedule {
    pub requests: Vec<DispatchRequest>,
    /// Offsets due today that already have a reminder.
    pub already_sent: Vec<i32>,
}

/// Offsets whose target date `due_date + offset` is `today`.
pub fn due_offsets(due_date: NaiveDate, reminder_days: &[i32], today: NaiveDate) -> Vec<i32> {
    let days_from_due = (today - due_date).num_days();
    let mut offsets: Vec<i32> = reminder_days
        .iter()
        .copied()
        .filter(|offset| i64::from(*offset) == days_from_due)
        .collect();
    offsets.dedup();
    offsets
}

#[derive(Clone)]
pub struct ReminderScheduler {
    store: Arc<dyn CollectionsStore>,
}

impl ReminderScheduler {
    pub fn new(store: Arc<dyn CollectionsStore>) -> Self {
        Self { store }
    }

    /// Dispatch requests for `debt` on `today`. Disabled settings and paid
    /// debts yield nothing; offsets that already fired are reported in
    /// `already_sent` instead of being requested again.
    pub async fn pending_dispatches(
        &self,
        settings: &ReminderSettings,
        debt: &Debt,
        today: NaiveDate,
    ) -> Result<DebtSchedule, CollectionsError> {
        let mut schedule = DebtSchedule::default();
        if !settings.enabled || debt.status == DebtStatus::Paid {
            return Ok(schedule);
        }

        for offset in due_offsets(debt.due_date, &settings.reminder_days, today) {
            if self
                .store
                .has_reminder_for_offset(debt.debt_id, offset)
                .await?
            {
                schedule.already_sent.push(offset);
                continue;
            }
            schedule.requests.push(DispatchRequest {
                user_id: debt.user_id,
                debt_id: debt.debt_id,
                channel: settings.default_channel,
                template_id: settings.default_template_id,
                offset_days: offset,
            });
        }
        Ok(schedule)
    }
}
