// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Messaging port for channel transports (WhatsApp-style chat networks, etc.).

use async_trait::async_trait;

use crate::error::TicketflowError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{Channel, MediaKind, MessageId, Recipient};

/// Outbound side of a channel transport.
///
/// Send failures are reported as [`TicketflowError::Delivery`]; the flow
/// interpreter logs them and moves on to the next node.
#[async_trait]
pub trait MessagingPort: PluginAdapter {
    /// Sends a plain text message.
    async fn send_text(&self, recipient: &Recipient, body: &str)
        -> Result<MessageId, TicketflowError>;

    /// Sends a media message located at an absolute `url`.
    async fn send_media(
        &self,
        recipient: &Recipient,
        url: &str,
        kind: MediaKind,
        caption: Option<&str>,
    ) -> Result<MessageId, TicketflowError>;

    /// Toggles the "typing..." presence shown to the recipient.
    async fn set_typing_indicator(
        &self,
        recipient: &Recipient,
        on: bool,
    ) -> Result<(), TicketflowError>;
}

/// Opens a messaging session for a channel on first use.
#[async_trait]
pub trait MessagingFactory: Send + Sync + 'static {
    async fn connect(
        &self,
        channel: &Channel,
    ) -> Result<std::sync::Arc<dyn MessagingPort>, TicketflowError>;
}
