// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock messaging port for deterministic testing.
//!
//! Every call is captured, in order, as an [`OutboundEvent`] so tests can
//! assert both what was sent and how it was bracketed by typing toggles.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use ticketflow_core::types::{AdapterType, Channel, HealthStatus, MediaKind, MessageId, Recipient};
use ticketflow_core::{MessagingFactory, MessagingPort, PluginAdapter, TicketflowError};

/// One captured call on the mock port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundEvent {
    Text {
        to: String,
        body: String,
    },
    Media {
        to: String,
        url: String,
        kind: MediaKind,
        caption: Option<String>,
    },
    Typing {
        to: String,
        on: bool,
    },
}

/// A messaging port that records instead of delivering.
pub struct MockMessaging {
    events: Arc<Mutex<Vec<OutboundEvent>>>,
    failures: AtomicUsize,
    shutdowns: AtomicUsize,
}

impl MockMessaging {
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            failures: AtomicUsize::new(0),
            shutdowns: AtomicUsize::new(0),
        }
    }

    /// Make the next `n` sends fail with a delivery error.
    pub fn fail_next_sends(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    /// Every captured call in order.
    pub async fn events(&self) -> Vec<OutboundEvent> {
        self.events.lock().await.clone()
    }

    /// Bodies of text messages in send order.
    pub async fn sent_texts(&self) -> Vec<String> {
        self.events
            .lock()
            .await
            .iter()
            .filter_map(|e| match e {
                OutboundEvent::Text { body, .. } => Some(body.clone()),
                _ => None,
            })
            .collect()
    }

    /// Text and media sends, typing toggles excluded.
    pub async fn sent_count(&self) -> usize {
        self.events
            .lock()
            .await
            .iter()
            .filter(|e| !matches!(e, OutboundEvent::Typing { .. }))
            .count()
    }

    pub async fn clear(&self) {
        self.events.lock().await.clear();
    }

    pub fn shutdown_count(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    fn take_failure(&self) -> bool {
        self.failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    async fn record_send(&self, event: OutboundEvent) -> Result<MessageId, TicketflowError> {
        if self.take_failure() {
            return Err(TicketflowError::Delivery {
                message: "mock transport refused the message".into(),
                source: None,
            });
        }
        self.events.lock().await.push(event);
        Ok(MessageId(format!("mock-msg-{}", uuid::Uuid::new_v4())))
    }
}

impl Default for MockMessaging {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockMessaging {
    fn name(&self) -> &str {
        "mock-messaging"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Messaging
    }

    async fn health_check(&self) -> Result<HealthStatus, TicketflowError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), TicketflowError> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl MessagingPort for MockMessaging {
    async fn send_text(
        &self,
        recipient: &Recipient,
        body: &str,
    ) -> Result<MessageId, TicketflowError> {
        self.record_send(OutboundEvent::Text {
            to: recipient.address.clone(),
            body: body.to_string(),
        })
        .await
    }

    async fn send_media(
        &self,
        recipient: &Recipient,
        url: &str,
        kind: MediaKind,
        caption: Option<&str>,
    ) -> Result<MessageId, TicketflowError> {
        self.record_send(OutboundEvent::Media {
            to: recipient.address.clone(),
            url: url.to_string(),
            kind,
            caption: caption.map(str::to_string),
        })
        .await
    }

    async fn set_typing_indicator(
        &self,
        recipient: &Recipient,
        on: bool,
    ) -> Result<(), TicketflowError> {
        self.events.lock().await.push(OutboundEvent::Typing {
            to: recipient.address.clone(),
            on,
        });
        Ok(())
    }
}

/// Factory that hands the same [`MockMessaging`] to every channel.
pub struct MockMessagingFactory {
    port: Arc<MockMessaging>,
    connects: AtomicUsize,
}

impl MockMessagingFactory {
    pub fn new(port: Arc<MockMessaging>) -> Self {
        Self {
            port,
            connects: AtomicUsize::new(0),
        }
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessagingFactory for MockMessagingFactory {
    async fn connect(&self, _channel: &Channel) -> Result<Arc<dyn MessagingPort>, TicketflowError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(self.port.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recipient() -> Recipient {
        Recipient {
            channel_id: 1,
            address: "555111".into(),
            is_group: false,
        }
    }

    #[tokio::test]
    async fn captures_in_order() {
        let mock = MockMessaging::new();
        mock.set_typing_indicator(&recipient(), true).await.unwrap();
        mock.send_text(&recipient(), "hello").await.unwrap();
        mock.set_typing_indicator(&recipient(), false).await.unwrap();

        let events = mock.events().await;
        assert_eq!(events.len(), 3);
        assert_eq!(
            events[1],
            OutboundEvent::Text {
                to: "555111".into(),
                body: "hello".into()
            }
        );
        assert_eq!(mock.sent_count().await, 1);
    }

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let mock = MockMessaging::new();
        mock.fail_next_sends(1);
        let err = mock.send_text(&recipient(), "a").await.unwrap_err();
        assert!(matches!(err, TicketflowError::Delivery { .. }));
        mock.send_text(&recipient(), "b").await.unwrap();
        assert_eq!(mock.sent_texts().await, vec!["b".to_string()]);
    }
}
