// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Data-protection consent gate for tickets in `lgpd` status.

use std::sync::Arc;

use ticketflow_audit::{EntryContext, EventLog};
use ticketflow_config::model::LgpdConfig;
use ticketflow_core::{
    Channel, Clock, Contact, FlowId, FlowLogType, InboundPayload, MediaPort, Recipient,
    StorageAdapter, Ticket, TicketflowError, format_timestamp,
};
use ticketflow_flow::{FlowSettings, MessagingRegistry, Outbox};
use ticketflow_router::{QueueRouter, RouteFlags};
use tracing::info;

/// What the gate did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentOutcome {
    /// The consent message was (re)sent.
    Prompted,
    /// Consent stored and the ticket re-routed. Carries the automation to start.
    Accepted { flow_id: Option<FlowId> },
    Declined,
}

pub struct ConsentGate {
    storage: Arc<dyn StorageAdapter>,
    router: QueueRouter,
    events: EventLog,
    registry: Arc<MessagingRegistry>,
    media: Arc<dyn MediaPort>,
    clock: Arc<dyn Clock>,
    settings: FlowSettings,
    config: LgpdConfig,
}

impl ConsentGate {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        events: EventLog,
        registry: Arc<MessagingRegistry>,
        media: Arc<dyn MediaPort>,
        clock: Arc<dyn Clock>,
        settings: FlowSettings,
        config: LgpdConfig,
    ) -> Self {
        Self {
            router: QueueRouter::new(storage.clone()),
            storage,
            events,
            registry,
            media,
            clock,
            settings,
            config,
        }
    }

    /// Handle an event on a gated ticket. A ticket that was just created
    /// always gets the consent message first, whatever the event carried.
    pub async fn handle(
        &self,
        ticket: &Ticket,
        contact: &Contact,
        channel: &Channel,
        payload: &InboundPayload,
        newly_gated: bool,
    ) -> Result<ConsentOutcome, TicketflowError> {
        if newly_gated {
            self.prompt(ticket, contact, channel).await?;
            return Ok(ConsentOutcome::Prompted);
        }

        let answer = payload
            .press_key
            .as_deref()
            .or(payload.body.as_deref())
            .map(str::trim)
            .unwrap_or_default();

        if answer.eq_ignore_ascii_case(&self.config.accept_key) {
            self.accept(ticket, contact, channel).await
        } else if answer.eq_ignore_ascii_case(&self.config.decline_key) {
            let now = format_timestamp(self.clock.now());
            if self.storage.close_ticket(ticket.id, &now).await? {
                self.events
                    .record(ticket.id, FlowLogType::Close, EntryContext::default())
                    .await;
            }
            info!(ticket_id = ticket.id, contact_id = contact.id, "consent declined, ticket closed");
            Ok(ConsentOutcome::Declined)
        } else {
            self.prompt(ticket, contact, channel).await?;
            Ok(ConsentOutcome::Prompted)
        }
    }

    async fn accept(
        &self,
        ticket: &Ticket,
        contact: &Contact,
        channel: &Channel,
    ) -> Result<ConsentOutcome, TicketflowError> {
        let now = format_timestamp(self.clock.now());
        self.storage.record_lgpd_consent(contact.id, &now).await?;
        let consented = Contact {
            lgpd_accepted_at: Some(now.clone()),
            ..contact.clone()
        };

        let table = self.router.for_channel(channel.id).await?;
        let decision = table.route_new_ticket(&consented, channel, RouteFlags::default());
        let routed = Ticket {
            status: decision.status,
            queue_id: decision.queue_id.or(ticket.queue_id),
            is_bot: decision.is_bot,
            ..ticket.clone()
        };
        if !self.storage.update_ticket(&routed, &now).await? {
            return Err(TicketflowError::conflict(format!(
                "ticket {} was closed while recording consent",
                ticket.id
            )));
        }
        self.events
            .record(ticket.id, FlowLogType::Lgpd, EntryContext::default())
            .await;
        info!(
            ticket_id = ticket.id,
            status = %decision.status,
            reason = decision.reason,
            "consent accepted"
        );
        Ok(ConsentOutcome::Accepted {
            flow_id: decision.flow_id,
        })
    }

    async fn prompt(
        &self,
        ticket: &Ticket,
        contact: &Contact,
        channel: &Channel,
    ) -> Result<(), TicketflowError> {
        let outbox = Outbox {
            port: self.registry.get(channel).await?,
            media: self.media.as_ref(),
            clock: self.clock.as_ref(),
            settings: self.settings,
            recipient: Recipient::for_contact(channel.id, contact),
            company_id: ticket.company_id,
        };
        outbox.text(&self.config.consent_message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ticketflow_core::{NewTicket, TicketStatus};
    use ticketflow_test_utils::TestHarness;

    const MENU_FLOW: &str = r#"{"nodes": [{"id": "menu", "type": "menu", "data": {
        "message": "Hi", "options": [{"number": 1, "value": "Sales"}]}}]}"#;

    async fn gated(harness: &TestHarness) -> (ConsentGate, Ticket) {
        let storage = harness.storage_dyn();
        let events = EventLog::new(storage.clone(), harness.clock.clone());
        let gate = ConsentGate::new(
            storage,
            events,
            Arc::new(MessagingRegistry::new(harness.factory.clone())),
            harness.media.clone(),
            harness.clock.clone(),
            FlowSettings::default(),
            LgpdConfig::default(),
        );
        let ticket = harness
            .storage
            .insert_ticket(
                &NewTicket {
                    key: ticketflow_core::TicketKey {
                        contact_id: harness.contact.id,
                        channel_id: harness.channel.id,
                        company_id: harness.contact.company_id,
                    },
                    queue_id: None,
                    user_id: None,
                    status: TicketStatus::Lgpd,
                    is_bot: false,
                    unread_messages: 1,
                    last_message: None,
                },
                "2026-01-01T10:00:00.000Z",
            )
            .await
            .unwrap();
        (gate, ticket)
    }

    fn reply(body: &str) -> InboundPayload {
        InboundPayload {
            body: Some(body.into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn new_ticket_is_prompted_even_with_accept_key() {
        let harness = TestHarness::builder().with_lgpd_required().build().await.unwrap();
        let (gate, ticket) = gated(&harness).await;
        let outcome = gate
            .handle(&ticket, &harness.contact, &harness.channel, &reply("1"), true)
            .await
            .unwrap();
        assert_eq!(outcome, ConsentOutcome::Prompted);
        assert_eq!(
            harness.messaging.sent_texts().await,
            vec![LgpdConfig::default().consent_message]
        );
    }

    #[tokio::test]
    async fn accept_routes_to_bot_when_default_queue_is_automated() {
        let harness = TestHarness::builder()
            .with_lgpd_required()
            .with_flow(MENU_FLOW)
            .build()
            .await
            .unwrap();
        let (gate, ticket) = gated(&harness).await;
        let outcome = gate
            .handle(&ticket, &harness.contact, &harness.channel, &reply(" 1 "), false)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ConsentOutcome::Accepted {
                flow_id: harness.flow.as_ref().map(|f| f.id)
            }
        );

        let routed = harness.storage.get_ticket(ticket.id).await.unwrap().unwrap();
        assert_eq!(routed.status, TicketStatus::Bot);
        assert_eq!(routed.queue_id, Some(harness.queue.id));
        let contact = harness.storage.get_contact(harness.contact.id).await.unwrap().unwrap();
        assert!(contact.lgpd_accepted_at.is_some());
    }

    #[tokio::test]
    async fn decline_closes_ticket() {
        let harness = TestHarness::builder().with_lgpd_required().build().await.unwrap();
        let (gate, ticket) = gated(&harness).await;
        let outcome = gate
            .handle(&ticket, &harness.contact, &harness.channel, &reply("2"), false)
            .await
            .unwrap();
        assert_eq!(outcome, ConsentOutcome::Declined);
        let closed = harness.storage.get_ticket(ticket.id).await.unwrap().unwrap();
        assert_eq!(closed.status, TicketStatus::Closed);
    }

    #[tokio::test]
    async fn anything_else_re_prompts() {
        let harness = TestHarness::builder().with_lgpd_required().build().await.unwrap();
        let (gate, ticket) = gated(&harness).await;
        let outcome = gate
            .handle(&ticket, &harness.contact, &harness.channel, &reply("what?"), false)
            .await
            .unwrap();
        assert_eq!(outcome, ConsentOutcome::Prompted);
        assert_eq!(harness.messaging.sent_texts().await.len(), 1);
        let still = harness.storage.get_ticket(ticket.id).await.unwrap().unwrap();
        assert_eq!(still.status, TicketStatus::Lgpd);
    }
}
