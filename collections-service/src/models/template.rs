//! Message template model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    Whatsapp,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Whatsapp => "whatsapp",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "whatsapp" => Channel::Whatsapp,
            _ => Channel::Email,
        }
    }

    /// Whether sends on this channel count against the monthly quota.
    pub fn is_metered(&self) -> bool {
        matches!(self, Channel::Whatsapp)
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Template {
    pub template_id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub channel: Channel,
    /// Email only.
    pub subject: Option<String>,
    pub body: String,
    pub is_default: bool,
    pub created_utc: DateTime<Utc>,
}

impl Template {
    pub fn new(user_id: Uuid, input: CreateTemplate) -> Self {
        let subject = match input.channel {
            Channel::Email => input.subject,
            Channel::Whatsapp => None,
        };
        Self {
            template_id: Uuid::new_v4(),
            user_id,
            name: input.name,
            channel: input.channel,
            subject,
            body: input.body,
            is_default: input.is_default,
            created_utc: Utc::now(),
        }
    }
}

/// Input for creating a template.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateTemplate {
    #[validate(length(min = 1, message = "Template name cannot be empty"))]
    pub name: String,
    pub channel: Channel,
    pub subject: Option<String>,
    #[validate(length(min = 1, message = "Template body cannot be empty"))]
    pub body: String,
    #[serde(default)]
    pub is_default: bool,
}
