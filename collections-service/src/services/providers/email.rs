use super::{ChannelSender, OutboundMessage, ProviderError, ProviderResponse};
use crate::config::SmtpConfig;
use crate::models::Channel;
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

pub struct SmtpEmailSender {
    config: SmtpConfig,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpEmailSender {
    pub fn new(config: SmtpConfig) -> Result<Self, ProviderError> {
        let creds = Credentials::new(config.user.clone(), config.password.clone());

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| {
                ProviderError::Configuration(format!("Failed to create SMTP relay: {}", e))
            })?
            .port(config.port)
            .credentials(creds)
            .build();

        Ok(Self { config, transport })
    }
}

#[async_trait]
impl ChannelSender for SmtpEmailSender {
    fn channel(&self) -> Channel {
        Channel::Email
    }

    async fn send(&self, message: &OutboundMessage) -> Result<ProviderResponse, ProviderError> {
        let from_mailbox: Mailbox =
            format!("{} <{}>", self.config.from_name, self.config.from_email)
                .parse()
                .map_err(|e| {
                    ProviderError::Configuration(format!("Invalid from address: {}", e))
                })?;

        let to_mailbox: Mailbox = message
            .to
            .parse()
            .map_err(|e| ProviderError::InvalidRecipient(format!("{}: {}", message.to, e)))?;

        let email = Message::builder()
            .from(from_mailbox)
            .to(to_mailbox)
            .subject(message.subject.clone().unwrap_or_default())
            .header(ContentType::TEXT_PLAIN)
            .body(message.body.clone())
            .map_err(|e| ProviderError::SendFailed(format!("Failed to build message: {}", e)))?;

        let response = self
            .transport
            .send(email)
            .await
            .map_err(|e| ProviderError::SendFailed(format!("Failed to send email: {}", e)))?;

        let message_id = response.message().next().map(|s| s.to_string());

        tracing::info!(to = %message.to, "Reminder email sent");

        Ok(ProviderResponse::accepted(message_id))
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        self.transport.test_connection().await.map_err(|e| {
            ProviderError::Connection(format!("SMTP connection test failed: {}", e))
        })?;
        Ok(())
    }
}
