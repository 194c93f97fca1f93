use super::{ChannelSender, OutboundMessage, ProviderError, ProviderResponse};
use crate::config::WhatsAppConfig;
use crate::models::Channel;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

/// WhatsApp Business Cloud API text-message sender.
pub struct WhatsAppCloudSender {
    config: WhatsAppConfig,
    client: Client,
}

#[derive(Debug, Serialize)]
struct CloudMessageRequest<'a> {
    messaging_product: &'static str,
    to: String,
    #[serde(rename = "type")]
    message_type: &'static str,
    text: CloudText<'a>,
}

#[derive(Debug, Serialize)]
struct CloudText<'a> {
    body: &'a str,
    preview_url: bool,
}

#[derive(Debug, Deserialize)]
struct CloudMessageResponse {
    #[serde(default)]
    messages: Vec<CloudMessageId>,
}

#[derive(Debug, Deserialize)]
struct CloudMessageId {
    id: String,
}

impl WhatsAppCloudSender {
    pub fn new(config: WhatsAppConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/{}/messages",
            self.config.api_base_url.trim_end_matches('/'),
            self.config.phone_number_id
        )
    }
}

/// Digits only; the Cloud API expects E.164 without the leading `+`.
pub fn normalize_phone(phone: &str) -> String {
    phone.chars().filter(|c| c.is_ascii_digit()).collect()
}

#[async_trait]
impl ChannelSender for WhatsAppCloudSender {
    fn channel(&self) -> Channel {
        Channel::Whatsapp
    }

    async fn send(&self, message: &OutboundMessage) -> Result<ProviderResponse, ProviderError> {
        let to = normalize_phone(&message.to);
        if to.is_empty() {
            return Err(ProviderError::InvalidRecipient(
                "Phone number is empty".to_string(),
            ));
        }

        let request = CloudMessageRequest {
            messaging_product: "whatsapp",
            to,
            message_type: "text",
            text: CloudText {
                body: &message.body,
                preview_url: false,
            },
        };

        let response = self
            .client
            .post(self.messages_url())
            .bearer_auth(&self.config.access_token)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                ProviderError::Connection(format!("Failed to reach WhatsApp API: {}", e))
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited(
                "WhatsApp API rate limit reached".to_string(),
            ));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::SendFailed(format!(
                "WhatsApp API returned error status {}: {}",
                status, body
            )));
        }

        let parsed: CloudMessageResponse = response.json().await.map_err(|e| {
            ProviderError::SendFailed(format!("Failed to parse WhatsApp response: {}", e))
        })?;

        tracing::info!(to = %message.to, "Reminder WhatsApp message sent");

        Ok(ProviderResponse::accepted(
            parsed.messages.into_iter().next().map(|m| m.id),
        ))
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        if self.config.access_token.is_empty() {
            return Err(ProviderError::Configuration(
                "WhatsApp access token is not configured".to_string(),
            ));
        }
        if self.config.phone_number_id.is_empty() {
            return Err(ProviderError::Configuration(
                "WhatsApp phone number id is not configured".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_formatting() {
        assert_eq!(normalize_phone("+972 (54) 123-4567"), "972541234567");
        assert_eq!(normalize_phone("  "), "");
    }
}
