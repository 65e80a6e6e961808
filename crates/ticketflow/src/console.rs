// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Console adapters used by `ticketflow replay`.
//!
//! Outbound messages are printed to stdout, one line per message, prefixed
//! with the channel and recipient. Media paths are resolved against the
//! configured public base URL; audio is passed through untouched.

use std::io::Write;
use std::sync::Arc;

use async_trait::async_trait;
use colored::Colorize;
use ticketflow_config::model::MediaConfig;
use ticketflow_core::{
    AdapterType, Channel, CompanyId, HealthStatus, MediaKind, MediaPort, MessageId,
    MessagingFactory, MessagingPort, PluginAdapter, Recipient, TicketflowError,
};
use tracing::debug;

pub struct ConsoleMessaging {
    channel_name: String,
    color: bool,
}

impl ConsoleMessaging {
    pub fn new(channel_name: impl Into<String>, color: bool) -> Self {
        Self {
            channel_name: channel_name.into(),
            color,
        }
    }

    fn print(&self, recipient: &Recipient, body: &str) -> Result<MessageId, TicketflowError> {
        let prefix = format!("[{} -> {}]", self.channel_name, recipient.address);
        let prefix = if self.color {
            prefix.cyan().to_string()
        } else {
            prefix
        };
        let mut stdout = std::io::stdout().lock();
        for line in body.lines() {
            writeln!(stdout, "{prefix} {line}").map_err(|e| TicketflowError::Delivery {
                message: "console write failed".into(),
                source: Some(Box::new(e)),
            })?;
        }
        Ok(MessageId(uuid::Uuid::new_v4().to_string()))
    }
}

#[async_trait]
impl PluginAdapter for ConsoleMessaging {
    fn name(&self) -> &str {
        "console"
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
        debug!(channel = self.channel_name.as_str(), "console session closed");
        Ok(())
    }
}

#[async_trait]
impl MessagingPort for ConsoleMessaging {
    async fn send_text(
        &self,
        recipient: &Recipient,
        body: &str,
    ) -> Result<MessageId, TicketflowError> {
        self.print(recipient, body)
    }

    async fn send_media(
        &self,
        recipient: &Recipient,
        url: &str,
        kind: MediaKind,
        caption: Option<&str>,
    ) -> Result<MessageId, TicketflowError> {
        let line = match caption {
            Some(caption) => format!("<{kind}: {url}> {caption}"),
            None => format!("<{kind}: {url}>"),
        };
        self.print(recipient, &line)
    }

    async fn set_typing_indicator(
        &self,
        recipient: &Recipient,
        on: bool,
    ) -> Result<(), TicketflowError> {
        debug!(to = recipient.address.as_str(), on, "typing indicator");
        Ok(())
    }
}

/// Connects a [`ConsoleMessaging`] per channel.
pub struct ConsoleMessagingFactory {
    color: bool,
}

impl ConsoleMessagingFactory {
    pub fn new(color: bool) -> Self {
        Self { color }
    }
}

#[async_trait]
impl MessagingFactory for ConsoleMessagingFactory {
    async fn connect(&self, channel: &Channel) -> Result<Arc<dyn MessagingPort>, TicketflowError> {
        Ok(Arc::new(ConsoleMessaging::new(channel.name.clone(), self.color)))
    }
}

pub struct ConsoleMedia {
    base_url: String,
}

impl ConsoleMedia {
    pub fn new(config: &MediaConfig) -> Self {
        Self {
            base_url: config.public_base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl PluginAdapter for ConsoleMedia {
    fn name(&self) -> &str {
        "console-media"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Media
    }

    async fn health_check(&self) -> Result<HealthStatus, TicketflowError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), TicketflowError> {
        Ok(())
    }
}

#[async_trait]
impl MediaPort for ConsoleMedia {
    async fn resolve_media_url(
        &self,
        company_id: CompanyId,
        relative_path: &str,
    ) -> Result<String, TicketflowError> {
        if relative_path.starts_with("http://") || relative_path.starts_with("https://") {
            return Ok(relative_path.to_string());
        }
        Ok(format!(
            "{}/company{company_id}/{}",
            self.base_url,
            relative_path.trim_start_matches('/')
        ))
    }

    async fn transcode_audio(&self, path: &str) -> Result<String, TicketflowError> {
        Ok(path.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn media_urls_are_company_scoped() {
        let media = ConsoleMedia::new(&MediaConfig {
            public_base_url: "http://cdn.example/public/".into(),
        });
        assert_eq!(
            media.resolve_media_url(3, "/promo.png").await.unwrap(),
            "http://cdn.example/public/company3/promo.png"
        );
        assert_eq!(
            media.resolve_media_url(3, "https://x.example/a.png").await.unwrap(),
            "https://x.example/a.png"
        );
    }

    #[tokio::test]
    async fn factory_names_session_after_channel() {
        let factory = ConsoleMessagingFactory::new(false);
        let channel = Channel {
            id: 1,
            company_id: 1,
            name: "whatsapp-main".into(),
            reopen_window_minutes: None,
            groups_as_tickets: false,
            lgpd_required: false,
        };
        let port = factory.connect(&channel).await.unwrap();
        assert_eq!(port.name(), "console");
    }
}
