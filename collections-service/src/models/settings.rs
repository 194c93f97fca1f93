//! Per-user reminder settings.

use super::Channel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Reminder schedule for a tenant.
///
/// Each entry in `reminder_days` is a signed offset from the due date: the
/// reminder fires on `due_date + offset`. Negative offsets fire before the
/// due date, positive offsets after it, zero on the due date itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReminderSettings {
    pub user_id: Uuid,
    pub enabled: bool,
    pub reminder_days: Vec<i32>,
    pub default_template_id: Option<Uuid>,
    pub default_channel: Channel,
    pub updated_utc: DateTime<Utc>,
}

impl ReminderSettings {
    /// Settings for a user who never configured reminders.
    pub fn disabled(user_id: Uuid) -> Self {
        Self {
            user_id,
            enabled: false,
            reminder_days: Vec::new(),
            default_template_id: None,
            default_channel: Channel::Email,
            updated_utc: Utc::now(),
        }
    }

    /// Sorts offsets ascending and drops duplicates.
    pub fn normalize(mut self) -> Self {
        self.reminder_days.sort_unstable();
        self.reminder_days.dedup();
        self
    }
}

/// Input for replacing a user's reminder settings.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateReminderSettings {
    pub enabled: bool,
    #[validate(length(max = 32, message = "At most 32 reminder offsets"))]
    pub reminder_days: Vec<i32>,
    pub default_template_id: Option<Uuid>,
    pub default_channel: Channel,
}

impl ReminderSettings {
    pub fn from_update(user_id: Uuid, update: UpdateReminderSettings) -> Self {
        Self {
            user_id,
            enabled: update.enabled,
            reminder_days: update.reminder_days,
            default_template_id: update.default_template_id,
            default_channel: update.default_channel,
            updated_utc: Utc::now(),
        }
        .normalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_sorts_and_dedups_offsets() {
        let settings = ReminderSettings::from_update(
            Uuid::new_v4(),
            UpdateReminderSettings {
                enabled: true,
                reminder_days: vec![3, -7, -1, 3, -7],
                default_template_id: None,
                default_channel: Channel::Whatsapp,
            },
        );
        assert_eq!(settings.reminder_days, vec![-7, -1, 3]);
    }
}
