// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Routing decisions for a single channel.
//!
//! Order for a new ticket: consent gate > group > bot (default queue has an
//! automation) > pending.

use ticketflow_core::{Channel, ChannelId, Contact, FlowId, Queue, QueueId, TicketStatus};

/// Event properties that influence routing.
#[derive(Debug, Clone, Copy, Default)]
pub struct RouteFlags {
    pub is_campaign: bool,
    /// Historical messages pulled from the transport; never start automation.
    pub is_imported: bool,
}

/// Where a ticket starts out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDecision {
    pub status: TicketStatus,
    pub queue_id: Option<QueueId>,
    pub is_bot: bool,
    /// Automation to start, when `status` is `bot`.
    pub flow_id: Option<FlowId>,
    pub reason: &'static str,
}

/// A channel's queues in routing order. The first queue is the default.
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    channel_id: ChannelId,
    queues: Vec<Queue>,
}

impl RoutingTable {
    pub fn new(channel_id: ChannelId, queues: Vec<Queue>) -> Self {
        Self { channel_id, queues }
    }

    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    pub fn queues(&self) -> &[Queue] {
        &self.queues
    }

    pub fn default_queue(&self) -> Option<QueueId> {
        self.queues.first().map(|q| q.id)
    }

    pub fn queue(&self, queue_id: QueueId) -> Option<&Queue> {
        self.queues.iter().find(|q| q.id == queue_id)
    }

    /// The active automation attached to the queue, if any.
    pub fn automation(&self, queue_id: QueueId) -> Option<FlowId> {
        self.queue(queue_id).and_then(|q| q.flow_id)
    }

    pub fn has_automation(&self, queue_id: QueueId) -> bool {
        self.automation(queue_id).is_some()
    }

    /// Add a queue that is not in the channel's list (an explicitly requested
    /// one). Existing entries are replaced.
    pub fn insert(&mut self, queue: Queue) {
        match self.queues.iter_mut().find(|q| q.id == queue.id) {
            Some(existing) => *existing = queue,
            None => self.queues.push(queue),
        }
    }

    /// Initial status for a ticket that has no prior active ticket.
    pub fn route_new_ticket(
        &self,
        contact: &Contact,
        channel: &Channel,
        flags: RouteFlags,
    ) -> RouteDecision {
        if channel.lgpd_required
            && contact.lgpd_accepted_at.is_none()
            && !contact.is_group
            && !flags.is_campaign
            && !flags.is_imported
        {
            return RouteDecision {
                status: TicketStatus::Lgpd,
                queue_id: None,
                is_bot: false,
                flow_id: None,
                reason: "consent required",
            };
        }

        if contact.is_group && !channel.groups_as_tickets {
            return RouteDecision {
                status: TicketStatus::Group,
                queue_id: None,
                is_bot: false,
                flow_id: None,
                reason: "group chat",
            };
        }

        if !flags.is_imported
            && let Some(queue_id) = self.default_queue()
            && let Some(flow_id) = self.automation(queue_id)
        {
            return RouteDecision {
                status: TicketStatus::Bot,
                queue_id: Some(queue_id),
                is_bot: true,
                flow_id: Some(flow_id),
                reason: "default queue has automation",
            };
        }

        RouteDecision {
            status: TicketStatus::Pending,
            queue_id: None,
            is_bot: false,
            flow_id: None,
            reason: "no automation",
        }
    }

    /// Status for a ticket (re)assigned to `queue_id` while still in an
    /// automatic routing state.
    pub fn route_to_queue(&self, queue_id: QueueId, flags: RouteFlags) -> RouteDecision {
        match self.automation(queue_id) {
            Some(flow_id) if !flags.is_imported => RouteDecision {
                status: TicketStatus::Bot,
                queue_id: Some(queue_id),
                is_bot: true,
                flow_id: Some(flow_id),
                reason: "queue has automation",
            },
            _ => RouteDecision {
                status: TicketStatus::Pending,
                queue_id: Some(queue_id),
                is_bot: false,
                flow_id: None,
                reason: "queue without automation",
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact(is_group: bool, consented: bool) -> Contact {
        Contact {
            id: 1,
            company_id: 1,
            number: "555111".into(),
            name: "Ana".into(),
            is_group,
            lgpd_accepted_at: consented.then(|| "2026-01-01T00:00:00.000Z".to_string()),
        }
    }

    fn channel(lgpd_required: bool, groups_as_tickets: bool) -> Channel {
        Channel {
            id: 1,
            company_id: 1,
            name: "main".into(),
            reopen_window_minutes: None,
            groups_as_tickets,
            lgpd_required,
        }
    }

    fn queue(id: QueueId, flow_id: Option<FlowId>) -> Queue {
        Queue {
            id,
            company_id: 1,
            name: format!("q{id}"),
            flow_id,
        }
    }

    #[test]
    fn default_queue_with_automation_routes_to_bot() {
        let table = RoutingTable::new(1, vec![queue(10, Some(5)), queue(11, None)]);
        let decision = table.route_new_ticket(&contact(false, false), &channel(false, false), RouteFlags::default());
        assert_eq!(decision.status, TicketStatus::Bot);
        assert_eq!(decision.queue_id, Some(10));
        assert_eq!(decision.flow_id, Some(5));
        assert!(decision.is_bot);
    }

    #[test]
    fn only_the_first_queue_counts() {
        let table = RoutingTable::new(1, vec![queue(10, None), queue(11, Some(5))]);
        let decision = table.route_new_ticket(&contact(false, false), &channel(false, false), RouteFlags::default());
        assert_eq!(decision.status, TicketStatus::Pending);
        assert!(!decision.is_bot);
    }

    #[test]
    fn consent_gate_comes_first() {
        let table = RoutingTable::new(1, vec![queue(10, Some(5))]);
        let decision = table.route_new_ticket(&contact(false, false), &channel(true, false), RouteFlags::default());
        assert_eq!(decision.status, TicketStatus::Lgpd);

        let consented = table.route_new_ticket(&contact(false, true), &channel(true, false), RouteFlags::default());
        assert_eq!(consented.status, TicketStatus::Bot);

        let campaign = RouteFlags {
            is_campaign: true,
            ..RouteFlags::default()
        };
        let decision = table.route_new_ticket(&contact(false, false), &channel(true, false), campaign);
        assert_eq!(decision.status, TicketStatus::Bot);
    }

    #[test]
    fn groups_bypass_consent_and_automation() {
        let table = RoutingTable::new(1, vec![queue(10, Some(5))]);
        let decision = table.route_new_ticket(&contact(true, false), &channel(true, false), RouteFlags::default());
        assert_eq!(decision.status, TicketStatus::Group);

        let as_ticket = table.route_new_ticket(&contact(true, false), &channel(true, true), RouteFlags::default());
        assert_eq!(as_ticket.status, TicketStatus::Bot);
    }

    #[test]
    fn imported_events_never_start_automation() {
        let table = RoutingTable::new(1, vec![queue(10, Some(5))]);
        let imported = RouteFlags {
            is_imported: true,
            ..RouteFlags::default()
        };
        let decision = table.route_new_ticket(&contact(false, false), &channel(true, false), imported);
        assert_eq!(decision.status, TicketStatus::Pending);
        assert_eq!(table.route_to_queue(10, imported).status, TicketStatus::Pending);
    }

    #[test]
    fn inserted_queue_is_routable() {
        let mut table = RoutingTable::new(1, vec![queue(10, None)]);
        assert!(!table.has_automation(20));
        table.insert(queue(20, Some(9)));
        assert!(table.has_automation(20));
        assert_eq!(table.default_queue(), Some(10));
        let decision = table.route_to_queue(20, RouteFlags::default());
        assert_eq!(decision.flow_id, Some(9));
        assert_eq!(decision.status, TicketStatus::Bot);
    }

    #[test]
    fn empty_channel_routes_to_pending() {
        let table = RoutingTable::new(1, Vec::new());
        assert_eq!(table.default_queue(), None);
        let decision = table.route_new_ticket(&contact(false, false), &channel(false, false), RouteFlags::default());
        assert_eq!(decision.status, TicketStatus::Pending);
    }
}
