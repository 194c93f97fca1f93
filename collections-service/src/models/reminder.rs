//! Reminder log entry.

use super::Channel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReminderStatus {
    Sent,
    Delivered,
    Failed,
}

impl ReminderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderStatus::Sent => "sent",
            ReminderStatus::Delivered => "delivered",
            ReminderStatus::Failed => "failed",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "delivered" => ReminderStatus::Delivered,
            "failed" => ReminderStatus::Failed,
            _ => ReminderStatus::Sent,
        }
    }
}

impl std::fmt::Display for ReminderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One attempt to notify a customer about a debt. Append-only; only
/// `status` may change after insertion (sent -> delivered).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reminder {
    pub reminder_id: Uuid,
    pub user_id: Uuid,
    pub debt_id: Uuid,
    pub customer_id: Uuid,
    pub channel: Channel,
    pub template_id: Uuid,
    /// Scheduled offset from the due date; `None` for manual sends.
    pub offset_days: Option<i32>,
    pub sent_utc: DateTime<Utc>,
    pub status: ReminderStatus,
    pub provider_message_id: Option<String>,
    pub error_message: Option<String>,
    /// Free-text reply recorded by older clients.
    pub response: Option<String>,
}

impl Reminder {
    #[allow(clippy::too_many_arguments)]
    pub fn record(
        user_id: Uuid,
        debt_id: Uuid,
        customer_id: Uuid,
        channel: Channel,
        template_id: Uuid,
        offset_days: Option<i32>,
        outcome: Result<Option<String>, String>,
    ) -> Self {
        let (status, provider_message_id, error_message) = match outcome {
            Ok(message_id) => (ReminderStatus::Sent, message_id, None),
            Err(error) => (ReminderStatus::Failed, None, Some(error)),
        };
        Self {
            reminder_id: Uuid::new_v4(),
            user_id,
            debt_id,
            customer_id,
            channel,
            template_id,
            offset_days,
            sent_utc: Utc::now(),
            status,
            provider_message_id,
            error_message,
            response: None,
        }
    }
}
