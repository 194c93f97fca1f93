pub mod email;
pub mod mock;
pub mod whatsapp;

use crate::models::Channel;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use email::SmtpEmailSender;
pub use mock::{MockBehavior, MockSender};
pub use whatsapp::WhatsAppCloudSender;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Provider not enabled: {0}")]
    NotEnabled(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Send error: {0}")]
    SendFailed(String),

    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("No sender registered for channel {0}")]
    NoSender(Channel),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub message_id: Option<String>,
}

impl ProviderResponse {
    pub fn accepted(message_id: Option<String>) -> Self {
        Self { message_id }
    }
}

/// Rendered message handed to a channel sender.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub channel: Channel,
    pub to: String,
    pub subject: Option<String>,
    pub body: String,
}

#[async_trait]
pub trait ChannelSender: Send + Sync {
    fn channel(&self) -> Channel;
    async fn send(&self, message: &OutboundMessage) -> Result<ProviderResponse, ProviderError>;
    async fn health_check(&self) -> Result<(), ProviderError>;
}

/// One sender per channel.
#[derive(Clone, Default)]
pub struct SenderRegistry {
    senders: HashMap<Channel, Arc<dyn ChannelSender>>,
}

impl SenderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sender: Arc<dyn ChannelSender>) -> Self {
        self.senders.insert(sender.channel(), sender);
        self
    }

    pub fn get(&self, channel: Channel) -> Result<Arc<dyn ChannelSender>, ProviderError> {
        self.senders
            .get(&channel)
            .cloned()
            .ok_or(ProviderError::NoSender(channel))
    }

    pub async fn health_check(&self) -> Result<(), ProviderError> {
        for sender in self.senders.values() {
            sender.health_check().await?;
        }
        Ok(())
    }
}
