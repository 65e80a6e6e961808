// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Entry points for inbound messages, ticket closes and reassignments.

use std::sync::Arc;

use ticketflow_audit::{EntryContext, EventLog};
use ticketflow_config::TicketflowConfig;
use ticketflow_core::{
    ChannelId, Clock, CompanyId, ContactId, FlowId, FlowLogType, InboundPayload, MediaPort,
    MessagingFactory, PluginAdapter, QueueId, StorageAdapter, Ticket, TicketId, TicketStatus,
    TicketflowError, UserId, format_timestamp,
};
use ticketflow_flow::{FlowGraphInterpreter, FlowSettings, MessagingRegistry, RunOutcome};
use ticketflow_router::{QueueRouter, RouteFlags};
use tracing::{debug, info, warn};

use crate::lgpd::{ConsentGate, ConsentOutcome};
use crate::locks::KeyedLocks;
use crate::state::{Origin, ResolveRequest, TicketStateManager};

/// The collaborators an engine is assembled from.
pub struct EnginePorts {
    pub storage: Arc<dyn StorageAdapter>,
    pub messaging: Arc<dyn MessagingFactory>,
    pub media: Arc<dyn MediaPort>,
    pub clock: Arc<dyn Clock>,
}

/// Ticket lifecycle coordinator.
///
/// Inbound events and reassignments are serialized per ticket key; closes are
/// not, so an in-flight run sees them at its next node boundary.
pub struct TicketEngine {
    storage: Arc<dyn StorageAdapter>,
    state: TicketStateManager,
    interpreter: FlowGraphInterpreter,
    consent: ConsentGate,
    router: QueueRouter,
    events: EventLog,
    locks: KeyedLocks,
    clock: Arc<dyn Clock>,
}

impl TicketEngine {
    pub fn new(config: &TicketflowConfig, ports: EnginePorts) -> Self {
        let EnginePorts {
            storage,
            messaging,
            media,
            clock,
        } = ports;
        let events = EventLog::new(storage.clone(), clock.clone());
        let registry = Arc::new(MessagingRegistry::new(messaging));
        let settings = FlowSettings::from(&config.flow);

        info!(
            engine = config.engine.name.as_str(),
            storage = storage.name(),
            "ticket engine initialized"
        );
        Self {
            state: TicketStateManager::new(
                storage.clone(),
                events.clone(),
                clock.clone(),
                config.engine.max_resolve_attempts,
            ),
            interpreter: FlowGraphInterpreter::new(
                storage.clone(),
                events.clone(),
                registry.clone(),
                media.clone(),
                clock.clone(),
                settings,
            ),
            consent: ConsentGate::new(
                storage.clone(),
                events.clone(),
                registry,
                media,
                clock.clone(),
                settings,
                config.lgpd.clone(),
            ),
            router: QueueRouter::new(storage.clone()),
            locks: KeyedLocks::new(config.engine.lock_prune_threshold),
            storage,
            events,
            clock,
        }
    }

    /// Seed the randomizer so runs are reproducible.
    pub fn with_seed(self, seed: u64) -> Self {
        Self {
            interpreter: self.interpreter.with_seed(seed),
            ..self
        }
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Resolve the ticket for an inbound message and hand it to whoever
    /// controls it: the consent gate, a running automation, or a new one.
    pub async fn handle_inbound_event(
        &self,
        contact_id: ContactId,
        channel_id: ChannelId,
        company_id: CompanyId,
        payload: &InboundPayload,
    ) -> Result<Ticket, TicketflowError> {
        let contact = self
            .storage
            .get_contact(contact_id)
            .await?
            .filter(|c| c.company_id == company_id)
            .ok_or_else(|| TicketflowError::not_found("contact", contact_id))?;
        let channel = self
            .storage
            .get_channel(channel_id)
            .await?
            .filter(|c| c.company_id == company_id)
            .ok_or_else(|| TicketflowError::not_found("channel", channel_id))?;

        let request = ResolveRequest {
            contact: contact.clone(),
            channel: channel.clone(),
            company_id,
            unread_delta: 1,
            requested_queue_id: payload.requested_queue_id,
            requested_user_id: payload.requested_user_id,
            is_campaign: payload.is_campaign,
            is_imported: payload.is_imported,
            is_forward: payload.is_forward,
            last_message: payload.body.clone(),
        };
        let _guard = self.locks.lock(request.key()).await;

        let resolution = self.state.resolve(&request).await?;
        let ticket = resolution.ticket;
        debug!(ticket_id = ticket.id, status = %ticket.status, flow_active = ticket.flow_active, "dispatching inbound event");

        if ticket.status == TicketStatus::Lgpd {
            let newly_gated = resolution.origin == Origin::Created;
            let outcome = self
                .consent
                .handle(&ticket, &contact, &channel, payload, newly_gated)
                .await?;
            if let ConsentOutcome::Accepted { flow_id: Some(flow_id) } = outcome {
                let routed = self.reload(ticket.id).await?;
                self.start_flow(&routed, flow_id).await?;
            }
        } else if ticket.flow_active {
            let outcome = self.interpreter.resume(&ticket, payload).await?;
            debug!(ticket_id = ticket.id, ?outcome, "automation resumed");
        } else if ticket.status == TicketStatus::Bot && !payload.is_imported {
            match self.queue_automation(ticket.queue_id).await? {
                Some(flow_id) => self.start_flow(&ticket, flow_id).await?,
                None => {
                    warn!(ticket_id = ticket.id, queue_id = ?ticket.queue_id, "bot ticket without automation");
                    self.interpreter.stop(ticket.id).await?;
                }
            }
        }

        self.reload(ticket.id).await
    }

    /// Close a ticket. Returns `false` if it was already closed.
    pub async fn handle_ticket_closed(&self, ticket_id: TicketId) -> Result<bool, TicketflowError> {
        if self.storage.close_ticket(ticket_id, &self.now()).await? {
            self.events
                .record(ticket_id, FlowLogType::Close, EntryContext::default())
                .await;
            info!(ticket_id, "ticket closed");
            return Ok(true);
        }
        // Distinguish "already closed" from "never existed".
        self.reload(ticket_id).await?;
        debug!(ticket_id, "ticket already closed");
        Ok(false)
    }

    /// Move a ticket to another queue and/or user.
    ///
    /// A user assignment opens the ticket and stops any automation. A queue
    /// assignment on a ticket still under automatic routing re-resolves bot
    /// eligibility and starts the new queue's automation when it has one.
    pub async fn handle_ticket_reassigned(
        &self,
        ticket_id: TicketId,
        queue_id: Option<QueueId>,
        user_id: Option<UserId>,
    ) -> Result<Ticket, TicketflowError> {
        let key = self.reload(ticket_id).await?.key();
        let _guard = self.locks.lock(key).await;

        let ticket = self.reload(ticket_id).await?;
        if ticket.status == TicketStatus::Closed {
            return Err(TicketflowError::conflict(format!(
                "ticket {ticket_id} is closed and cannot be reassigned"
            )));
        }

        let mut start = None;
        if let Some(queue_id) = queue_id {
            let mut table = self.router.for_channel(ticket.channel_id).await?;
            self.router.include_queue(&mut table, queue_id).await?;

            if user_id.is_none() && ticket.status.allows_flow() {
                if ticket.flow_active {
                    self.interpreter.stop(ticket.id).await?;
                }
                let decision = table.route_to_queue(queue_id, RouteFlags::default());
                let routed = Ticket {
                    queue_id: Some(queue_id),
                    status: decision.status,
                    is_bot: decision.is_bot,
                    ..self.reload(ticket_id).await?
                };
                if !self.storage.update_ticket(&routed, &self.now()).await? {
                    return Err(closed_meanwhile(ticket_id));
                }
                start = decision.flow_id;
            } else if !self
                .storage
                .set_ticket_queue(ticket_id, queue_id, &self.now())
                .await?
            {
                return Err(closed_meanwhile(ticket_id));
            }
            self.events
                .record(ticket_id, FlowLogType::Queue, EntryContext::queue(queue_id))
                .await;
        }

        if let Some(user_id) = user_id {
            let was_automated = self.reload(ticket_id).await?.flow_active;
            if !self.storage.assign_user(ticket_id, user_id, &self.now()).await? {
                return Err(closed_meanwhile(ticket_id));
            }
            if was_automated {
                self.events
                    .record(ticket_id, FlowLogType::Exit, EntryContext::default())
                    .await;
            }
            self.events
                .record(ticket_id, FlowLogType::Assign, EntryContext::user(user_id))
                .await;
            info!(ticket_id, user_id, "ticket assigned to user");
        }

        if let Some(flow_id) = start {
            let routed = self.reload(ticket_id).await?;
            self.start_flow(&routed, flow_id).await?;
        }

        let ticket = self.reload(ticket_id).await?;
        self.verify(&ticket).await?;
        Ok(ticket)
    }

    /// Disconnect every messaging session.
    pub async fn shutdown(&self) {
        self.interpreter.registry().shutdown_all().await;
        info!("ticket engine stopped");
    }

    async fn start_flow(&self, ticket: &Ticket, flow_id: FlowId) -> Result<(), TicketflowError> {
        let outcome = self.interpreter.start(ticket, flow_id).await?;
        if let RunOutcome::Exited { reason } = outcome {
            debug!(ticket_id = ticket.id, flow_id, ?reason, "automation finished in one run");
        }
        Ok(())
    }

    async fn queue_automation(
        &self,
        queue_id: Option<QueueId>,
    ) -> Result<Option<FlowId>, TicketflowError> {
        match queue_id {
            Some(queue_id) => Ok(self.router.queue(queue_id).await?.flow_id),
            None => Ok(None),
        }
    }

    /// One active ticket per key and a cursor consistent with the status.
    async fn verify(&self, ticket: &Ticket) -> Result<(), TicketflowError> {
        let active = self
            .storage
            .list_tickets_for_key(&ticket.key())
            .await?
            .iter()
            .filter(|t| t.status.is_active())
            .count();
        if active > 1 {
            return Err(TicketflowError::Internal(format!(
                "{active} active tickets for {}",
                ticket.key()
            )));
        }
        if !ticket.cursor_is_consistent() {
            return Err(TicketflowError::Internal(format!(
                "ticket {} has an active automation in status {}",
                ticket.id, ticket.status
            )));
        }
        Ok(())
    }

    async fn reload(&self, ticket_id: TicketId) -> Result<Ticket, TicketflowError> {
        self.storage
            .get_ticket(ticket_id)
            .await?
            .ok_or_else(|| TicketflowError::not_found("ticket", ticket_id))
    }

    fn now(&self) -> String {
        format_timestamp(self.clock.now())
    }
}

fn closed_meanwhile(ticket_id: TicketId) -> TicketflowError {
    TicketflowError::conflict(format!("ticket {ticket_id} was closed during reassignment"))
}
