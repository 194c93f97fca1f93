use super::{ChannelSender, OutboundMessage, ProviderError, ProviderResponse};
use crate::models::Channel;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockBehavior {
    Succeed,
    Fail,
    /// Sleeps before answering; used to exercise the send timeout.
    Hang(Duration),
}

/// Sender used for disabled providers and in tests.
pub struct MockSender {
    channel: Channel,
    behavior: Mutex<MockBehavior>,
    send_count: AtomicU64,
    sent: Mutex<Vec<OutboundMessage>>,
}

impl MockSender {
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            behavior: Mutex::new(MockBehavior::Succeed),
            send_count: AtomicU64::new(0),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn set_behavior(&self, behavior: MockBehavior) {
        if let Ok(mut current) = self.behavior.lock() {
            *current = behavior;
        }
    }

    /// Number of send attempts that reached the provider.
    pub fn send_count(&self) -> u64 {
        self.send_count.load(Ordering::SeqCst)
    }

    /// Messages the provider accepted.
    pub fn sent_messages(&self) -> Vec<OutboundMessage> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn behavior(&self) -> MockBehavior {
        self.behavior
            .lock()
            .map(|b| *b)
            .unwrap_or(MockBehavior::Succeed)
    }
}

#[async_trait]
impl ChannelSender for MockSender {
    fn channel(&self) -> Channel {
        self.channel
    }

    async fn send(&self, message: &OutboundMessage) -> Result<ProviderResponse, ProviderError> {
        let attempt = self.send_count.fetch_add(1, Ordering::SeqCst) + 1;

        match self.behavior() {
            MockBehavior::Succeed => {}
            MockBehavior::Fail => {
                return Err(ProviderError::SendFailed(
                    "Mock provider configured to fail".to_string(),
                ));
            }
            MockBehavior::Hang(delay) => tokio::time::sleep(delay).await,
        }

        if let Ok(mut sent) = self.sent.lock() {
            sent.push(message.clone());
        }

        tracing::info!(
            channel = %self.channel,
            to = %message.to,
            body_length = message.body.len(),
            "[MOCK] Reminder would be sent"
        );

        Ok(ProviderResponse::accepted(Some(format!(
            "mock-{}-{}",
            self.channel, attempt
        ))))
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}
