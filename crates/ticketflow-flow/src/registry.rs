// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-channel messaging sessions.

use std::collections::HashMap;
use std::sync::Arc;

use ticketflow_core::{Channel, ChannelId, MessagingFactory, MessagingPort, TicketflowError};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Owns one messaging session per channel, connected on first use.
///
/// The registry is an explicit object handed to whoever sends; there is no
/// process-wide session map.
pub struct MessagingRegistry {
    factory: Arc<dyn MessagingFactory>,
    sessions: Mutex<HashMap<ChannelId, Arc<dyn MessagingPort>>>,
}

impl MessagingRegistry {
    pub fn new(factory: Arc<dyn MessagingFactory>) -> Self {
        Self {
            factory,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// The session for `channel`, connecting it if this is the first use.
    pub async fn get(&self, channel: &Channel) -> Result<Arc<dyn MessagingPort>, TicketflowError> {
        let mut sessions = self.sessions.lock().await;
        if let Some(session) = sessions.get(&channel.id) {
            return Ok(session.clone());
        }
        let session = self.factory.connect(channel).await?;
        info!(channel_id = channel.id, adapter = session.name(), "messaging session connected");
        sessions.insert(channel.id, session.clone());
        Ok(session)
    }

    /// Disconnect and forget a channel's session.
    pub async fn remove(&self, channel_id: ChannelId) -> Result<bool, TicketflowError> {
        let session = self.sessions.lock().await.remove(&channel_id);
        match session {
            Some(session) => {
                session.shutdown().await?;
                info!(channel_id, "messaging session removed");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Shut down every session. Failures are logged and do not stop the rest.
    pub async fn shutdown_all(&self) {
        let drained: Vec<_> = self.sessions.lock().await.drain().collect();
        for (channel_id, session) in drained {
            if let Err(e) = session.shutdown().await {
                warn!(channel_id, error = %e, "messaging session shutdown failed");
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ticketflow_test_utils::{MockMessaging, MockMessagingFactory};

    fn channel(id: ChannelId) -> Channel {
        Channel {
            id,
            company_id: 1,
            name: format!("c{id}"),
            reopen_window_minutes: None,
            groups_as_tickets: false,
            lgpd_required: false,
        }
    }

    #[tokio::test]
    async fn connects_once_per_channel() {
        let port = Arc::new(MockMessaging::new());
        let factory = Arc::new(MockMessagingFactory::new(port.clone()));
        let registry = MessagingRegistry::new(factory.clone());

        registry.get(&channel(1)).await.unwrap();
        registry.get(&channel(1)).await.unwrap();
        registry.get(&channel(2)).await.unwrap();
        assert_eq!(factory.connect_count(), 2);
        assert_eq!(registry.len().await, 2);

        assert!(registry.remove(1).await.unwrap());
        assert!(!registry.remove(1).await.unwrap());
        assert_eq!(port.shutdown_count(), 1);

        registry.shutdown_all().await;
        assert!(registry.is_empty().await);
        assert_eq!(port.shutdown_count(), 2);
    }
}
