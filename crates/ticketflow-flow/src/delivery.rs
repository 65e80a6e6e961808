// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound side of a run: typing bracket, media resolution and waits.

use std::sync::Arc;
use std::time::Duration;

use ticketflow_config::model::FlowConfig;
use ticketflow_core::{
    Clock, CompanyId, MediaKind, MediaPort, MessagingPort, Recipient, TicketflowError,
};
use tracing::{debug, warn};

use crate::graph::BlockElement;

/// Timing knobs for outbound delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowSettings {
    pub settle_delay: Duration,
    pub typing_indicator: bool,
    pub max_interval: Duration,
}

impl From<&FlowConfig> for FlowSettings {
    fn from(config: &FlowConfig) -> Self {
        Self {
            settle_delay: Duration::from_millis(config.settle_delay_ms),
            typing_indicator: config.typing_indicator,
            max_interval: Duration::from_secs(config.max_interval_secs),
        }
    }
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self::from(&FlowConfig::default())
    }
}

/// Sends to one recipient on behalf of one ticket.
pub struct Outbox<'a> {
    pub port: Arc<dyn MessagingPort>,
    pub media: &'a dyn MediaPort,
    pub clock: &'a dyn Clock,
    pub settings: FlowSettings,
    pub recipient: Recipient,
    pub company_id: CompanyId,
}

impl Outbox<'_> {
    pub async fn text(&self, body: &str) -> Result<(), TicketflowError> {
        self.bracketed(async { self.port.send_text(&self.recipient, body).await.map(|_| ()) })
            .await
    }

    pub async fn media(
        &self,
        kind: MediaKind,
        path: &str,
        caption: Option<&str>,
    ) -> Result<(), TicketflowError> {
        let path = if kind == MediaKind::Audio {
            match self.media.transcode_audio(path).await {
                Ok(converted) => converted,
                Err(e) => return self.absorb(e, "audio transcode failed"),
            }
        } else {
            path.to_string()
        };
        let url = match self.media.resolve_media_url(self.company_id, &path).await {
            Ok(url) => url,
            Err(e) => return self.absorb(e, "media url resolution failed"),
        };
        self.bracketed(async {
            self.port
                .send_media(&self.recipient, &url, kind, caption)
                .await
                .map(|_| ())
        })
        .await
    }

    /// Cooperative wait, capped at the configured maximum.
    pub async fn wait(&self, seconds: u64) {
        let requested = Duration::from_secs(seconds);
        let duration = requested.min(self.settings.max_interval);
        if duration < requested {
            warn!(requested_secs = seconds, capped_secs = duration.as_secs(), "interval capped");
        }
        self.clock.sleep(duration).await;
    }

    pub async fn element(&self, element: &BlockElement) -> Result<(), TicketflowError> {
        match element {
            BlockElement::Message { value } => self.text(value).await,
            BlockElement::Interval { seconds } => {
                self.wait(*seconds).await;
                Ok(())
            }
            BlockElement::Image { url, caption } => {
                self.media(MediaKind::Image, url, caption.as_deref()).await
            }
            BlockElement::Audio { url } => self.media(MediaKind::Audio, url, None).await,
            BlockElement::Video { url, caption } => {
                self.media(MediaKind::Video, url, caption.as_deref()).await
            }
        }
    }

    /// typing on, settle delay, send, typing off.
    async fn bracketed<F>(&self, send: F) -> Result<(), TicketflowError>
    where
        F: std::future::Future<Output = Result<(), TicketflowError>>,
    {
        self.typing(true).await;
        self.clock.sleep(self.settings.settle_delay).await;
        let sent = send.await;
        self.typing(false).await;
        match sent {
            Ok(()) => {
                debug!(to = %self.recipient.address, "message delivered");
                Ok(())
            }
            Err(e) => self.absorb(e, "message delivery failed"),
        }
    }

    async fn typing(&self, on: bool) {
        if !self.settings.typing_indicator {
            return;
        }
        if let Err(e) = self.port.set_typing_indicator(&self.recipient, on).await {
            debug!(error = %e, on, "typing indicator toggle failed");
        }
    }

    // Transport-level failures do not stop a run.
    fn absorb(&self, e: TicketflowError, what: &str) -> Result<(), TicketflowError> {
        if e.is_recoverable() {
            warn!(to = %self.recipient.address, error = %e, "{what}");
            Ok(())
        } else {
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ticketflow_test_utils::{ManualClock, MockMedia, MockMessaging, OutboundEvent};

    fn recipient() -> Recipient {
        Recipient {
            channel_id: 1,
            address: "555111".into(),
            is_group: false,
        }
    }

    #[tokio::test]
    async fn text_is_bracketed_by_typing() {
        let port = Arc::new(MockMessaging::new());
        let media = MockMedia::default();
        let clock = ManualClock::fixed();
        let outbox = Outbox {
            port: port.clone(),
            media: &media,
            clock: &clock,
            settings: FlowSettings::default(),
            recipient: recipient(),
            company_id: 1,
        };

        outbox.text("hello").await.unwrap();

        let events = port.events().await;
        assert!(matches!(events[0], OutboundEvent::Typing { on: true, .. }));
        assert!(matches!(&events[1], OutboundEvent::Text { body, .. } if body == "hello"));
        assert!(matches!(events[2], OutboundEvent::Typing { on: false, .. }));
        assert_eq!(clock.sleeps(), vec![Duration::from_millis(1000)]);
    }

    #[tokio::test]
    async fn audio_is_transcoded_before_resolution() {
        let port = Arc::new(MockMessaging::new());
        let media = MockMedia::default();
        let clock = ManualClock::fixed();
        let outbox = Outbox {
            port: port.clone(),
            media: &media,
            clock: &clock,
            settings: FlowSettings::default(),
            recipient: recipient(),
            company_id: 3,
        };

        outbox
            .element(&BlockElement::Audio {
                url: "greeting.mp3".into(),
            })
            .await
            .unwrap();

        assert_eq!(
            media.calls().await,
            vec!["transcode:greeting.mp3".to_string(), "resolve:greeting.ogg".to_string()]
        );
        let sent = port.events().await;
        assert!(sent.iter().any(|e| matches!(
            e,
            OutboundEvent::Media { url, kind: MediaKind::Audio, .. }
                if url == "http://media.test/company3/greeting.ogg"
        )));
    }

    #[tokio::test]
    async fn delivery_failure_is_absorbed() {
        let port = Arc::new(MockMessaging::new());
        port.fail_next_sends(1);
        let media = MockMedia::default();
        let clock = ManualClock::fixed();
        let outbox = Outbox {
            port: port.clone(),
            media: &media,
            clock: &clock,
            settings: FlowSettings {
                typing_indicator: false,
                ..FlowSettings::default()
            },
            recipient: recipient(),
            company_id: 1,
        };

        outbox.text("lost").await.unwrap();
        outbox.text("kept").await.unwrap();
        assert_eq!(port.sent_texts().await, vec!["kept".to_string()]);
    }

    #[tokio::test]
    async fn interval_is_capped() {
        let port = Arc::new(MockMessaging::new());
        let media = MockMedia::default();
        let clock = ManualClock::fixed();
        let outbox = Outbox {
            port,
            media: &media,
            clock: &clock,
            settings: FlowSettings {
                max_interval: Duration::from_secs(60),
                ..FlowSettings::default()
            },
            recipient: recipient(),
            company_id: 1,
        };
        outbox.wait(3600).await;
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(60)]);
    }
}
