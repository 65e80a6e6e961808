// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Find-or-create for the active ticket of a (contact, channel, company) key.
//!
//! Resolution order:
//! 1. the active ticket for the key, merged with the new event
//! 2. the most recent closed ticket inside the channel's reopen window
//! 3. a new ticket with the status chosen by the queue router
//!
//! Every write is conditional on the ticket not being closed. A write that
//! loses to a concurrent close, or an insert that hits the active-ticket
//! unique index, restarts resolution from step 1.

use std::sync::Arc;

use chrono::Duration;
use ticketflow_audit::{EntryContext, EventLog};
use ticketflow_core::{
    Channel, Clock, CompanyId, Contact, FlowLogType, NewTicket, QueueId, StorageAdapter, Ticket,
    TicketKey, TicketStatus, TicketflowError, UserId, format_timestamp,
};
use ticketflow_router::{QueueRouter, RouteDecision, RouteFlags};
use tracing::{debug, info, warn};

/// Everything resolution needs to know about one inbound event.
#[derive(Debug, Clone)]
pub struct ResolveRequest {
    pub contact: Contact,
    pub channel: Channel,
    pub company_id: CompanyId,
    pub unread_delta: i64,
    pub requested_queue_id: Option<QueueId>,
    pub requested_user_id: Option<UserId>,
    pub is_campaign: bool,
    pub is_imported: bool,
    pub is_forward: bool,
    pub last_message: Option<String>,
}

impl ResolveRequest {
    pub fn key(&self) -> TicketKey {
        TicketKey {
            contact_id: self.contact.id,
            channel_id: self.channel.id,
            company_id: self.company_id,
        }
    }

    fn flags(&self) -> RouteFlags {
        RouteFlags {
            is_campaign: self.is_campaign,
            is_imported: self.is_imported,
        }
    }
}

/// Which resolution step produced the ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Existing,
    Reopened,
    Created,
}

#[derive(Debug, Clone)]
pub struct Resolution {
    pub ticket: Ticket,
    pub origin: Origin,
}

enum Attempt {
    Done(Resolution),
    /// A conditional write affected no row or the unique index fired.
    Raced(&'static str),
}

pub struct TicketStateManager {
    storage: Arc<dyn StorageAdapter>,
    router: QueueRouter,
    events: EventLog,
    clock: Arc<dyn Clock>,
    max_attempts: u32,
}

impl TicketStateManager {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        events: EventLog,
        clock: Arc<dyn Clock>,
        max_attempts: u32,
    ) -> Self {
        Self {
            router: QueueRouter::new(storage.clone()),
            storage,
            events,
            clock,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Return the ticket an inbound event belongs to, creating or reopening
    /// one as needed.
    pub async fn resolve(&self, request: &ResolveRequest) -> Result<Resolution, TicketflowError> {
        let key = request.key();
        for attempt in 1..=self.max_attempts {
            match self.attempt(request, &key).await? {
                Attempt::Done(resolution) => {
                    debug!(
                        ticket_id = resolution.ticket.id,
                        origin = ?resolution.origin,
                        status = %resolution.ticket.status,
                        attempt,
                        "ticket resolved"
                    );
                    return Ok(resolution);
                }
                Attempt::Raced(step) => {
                    warn!(%key, attempt, step, "ticket write lost a race, retrying");
                }
            }
        }
        Err(TicketflowError::conflict(format!(
            "could not resolve ticket for {key} after {} attempts",
            self.max_attempts
        )))
    }

    async fn attempt(
        &self,
        request: &ResolveRequest,
        key: &TicketKey,
    ) -> Result<Attempt, TicketflowError> {
        if let Some(ticket) = self.storage.find_active_ticket(key).await? {
            return self.merge_existing(request, ticket).await;
        }

        if let Some(minutes) = request.channel.reopen_window_minutes.filter(|m| *m > 0) {
            let since = format_timestamp(self.clock.now() - Duration::minutes(minutes));
            if let Some(closed) = self.storage.find_recent_closed_ticket(key, &since).await? {
                return self.reopen(request, closed).await;
            }
        }

        self.create(request, key).await
    }

    async fn merge_existing(
        &self,
        request: &ResolveRequest,
        mut ticket: Ticket,
    ) -> Result<Attempt, TicketflowError> {
        if request.is_campaign {
            // Never clobber a human assignment.
            if ticket.user_id.is_none() {
                ticket.user_id = request.requested_user_id;
            }
            if ticket.queue_id.is_none() {
                ticket.queue_id = request.requested_queue_id;
            }
        } else {
            if !request.is_forward {
                check_claim(&ticket, request)?;
            }
            ticket.unread_messages += request.unread_delta;
            ticket.is_bot = false;
        }
        if request.last_message.is_some() {
            ticket.last_message = request.last_message.clone();
        }

        if !self.storage.update_ticket(&ticket, &self.now()).await? {
            return Ok(Attempt::Raced("merge"));
        }
        Ok(Attempt::Done(Resolution {
            ticket,
            origin: Origin::Existing,
        }))
    }

    async fn reopen(
        &self,
        request: &ResolveRequest,
        closed: Ticket,
    ) -> Result<Attempt, TicketflowError> {
        match self
            .storage
            .reopen_ticket(closed.id, request.unread_delta, &self.now())
            .await
        {
            Ok(true) => {}
            Ok(false) | Err(TicketflowError::Conflict { .. }) => return Ok(Attempt::Raced("reopen")),
            Err(e) => return Err(e),
        }
        let ticket = self
            .storage
            .get_ticket(closed.id)
            .await?
            .ok_or_else(|| TicketflowError::not_found("ticket", closed.id))?;
        self.events
            .record(ticket.id, FlowLogType::Reopen, EntryContext::default())
            .await;
        info!(ticket_id = ticket.id, "ticket reopened inside the reopen window");
        Ok(Attempt::Done(Resolution {
            ticket,
            origin: Origin::Reopened,
        }))
    }

    async fn create(
        &self,
        request: &ResolveRequest,
        key: &TicketKey,
    ) -> Result<Attempt, TicketflowError> {
        let flags = request.flags();
        let mut table = self.router.for_channel(request.channel.id).await?;
        let mut decision = table.route_new_ticket(&request.contact, &request.channel, flags);

        if let Some(queue_id) = request.requested_queue_id {
            self.router.include_queue(&mut table, queue_id).await?;
            decision = apply_requested_queue(decision, table.route_to_queue(queue_id, flags));
        }

        let mut new = NewTicket {
            key: *key,
            queue_id: decision.queue_id,
            user_id: None,
            status: decision.status,
            is_bot: decision.is_bot,
            unread_messages: request.unread_delta,
            last_message: request.last_message.clone(),
        };
        if let Some(user_id) = request.requested_user_id {
            new.user_id = Some(user_id);
            if is_automatic(new.status) {
                new.status = TicketStatus::Open;
                new.is_bot = false;
            }
        }

        let ticket = match self.storage.insert_ticket(&new, &self.now()).await {
            Ok(ticket) => ticket,
            Err(TicketflowError::Conflict { .. }) => return Ok(Attempt::Raced("insert")),
            Err(e) => return Err(e),
        };

        let entry_type = if ticket.status == TicketStatus::Lgpd {
            FlowLogType::Lgpd
        } else {
            FlowLogType::Create
        };
        let context = EntryContext {
            queue_id: ticket.queue_id,
            user_id: ticket.user_id,
            ..EntryContext::default()
        };
        self.events.record(ticket.id, entry_type, context).await;
        info!(
            ticket_id = ticket.id,
            status = %ticket.status,
            queue_id = ?ticket.queue_id,
            reason = decision.reason,
            "ticket created"
        );
        Ok(Attempt::Done(Resolution {
            ticket,
            origin: Origin::Created,
        }))
    }

    fn now(&self) -> String {
        format_timestamp(self.clock.now())
    }
}

/// `pending`, or `bot` before any flow has run: states picked by routing
/// rather than by a human.
fn is_automatic(status: TicketStatus) -> bool {
    matches!(status, TicketStatus::Pending | TicketStatus::Bot)
}

fn apply_requested_queue(initial: RouteDecision, routed: RouteDecision) -> RouteDecision {
    if is_automatic(initial.status) {
        routed
    } else {
        RouteDecision {
            queue_id: routed.queue_id,
            ..initial
        }
    }
}

fn check_claim(ticket: &Ticket, request: &ResolveRequest) -> Result<(), TicketflowError> {
    if let Some(requested) = request.requested_user_id.filter(|u| *u != 0)
        && let Some(owner) = ticket.user_id.filter(|u| *u != 0 && *u != requested)
    {
        return Err(TicketflowError::conflict(format!(
            "ticket already in attendance by user {owner}"
        )));
    }
    if let Some(requested) = request.requested_queue_id.filter(|q| *q != 0)
        && let Some(owner) = ticket.queue_id.filter(|q| *q != 0 && *q != requested)
    {
        return Err(TicketflowError::conflict(format!(
            "ticket already in attendance by queue {owner}"
        )));
    }
    Ok(())
}
