// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage adapter trait for persistence backends (SQLite, etc.).

use async_trait::async_trait;

use crate::error::TicketflowError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    Channel, ChannelId, Contact, ContactId, FlowCursor, FlowId, FlowLogEntry, FlowRecord,
    NewFlowLogEntry, NewTicket, Queue, QueueId, Ticket, TicketId, TicketKey, UserId,
};

/// Adapter for the ticket store, the directory (contacts, channels, queues,
/// flows) and the append-only flow log.
///
/// Every ticket mutation except [`reopen_ticket`](Self::reopen_ticket) is
/// conditional on the row not being `closed` and returns whether it applied,
/// so a close issued by a human is never overwritten by an automation that
/// was already in flight.
#[async_trait]
pub trait StorageAdapter: PluginAdapter {
    /// Initializes the storage backend (migrations, connection, etc.).
    async fn initialize(&self) -> Result<(), TicketflowError>;

    /// Closes the storage backend, flushing pending writes.
    async fn close(&self) -> Result<(), TicketflowError>;

    // --- Ticket operations ---

    /// Inserts a ticket. Fails with [`TicketflowError::Conflict`] when an
    /// active ticket already exists for the key.
    async fn insert_ticket(&self, ticket: &NewTicket, now: &str)
        -> Result<Ticket, TicketflowError>;

    async fn get_ticket(&self, id: TicketId) -> Result<Option<Ticket>, TicketflowError>;

    /// The single non-closed ticket for the key, if any.
    async fn find_active_ticket(&self, key: &TicketKey)
        -> Result<Option<Ticket>, TicketflowError>;

    /// Most recently updated closed ticket for the key updated at or after `since`.
    async fn find_recent_closed_ticket(
        &self,
        key: &TicketKey,
        since: &str,
    ) -> Result<Option<Ticket>, TicketflowError>;

    /// All tickets for the key, newest first.
    async fn list_tickets_for_key(&self, key: &TicketKey)
        -> Result<Vec<Ticket>, TicketflowError>;

    /// Writes assignment, status, unread and bot fields of a non-closed ticket.
    async fn update_ticket(&self, ticket: &Ticket, now: &str) -> Result<bool, TicketflowError>;

    /// Moves a closed ticket back to `pending` with a cleared cursor. Fails with
    /// [`TicketflowError::Conflict`] if another ticket became active meanwhile.
    async fn reopen_ticket(
        &self,
        id: TicketId,
        unread_delta: i64,
        now: &str,
    ) -> Result<bool, TicketflowError>;

    /// Persists the flow cursor of a non-closed ticket.
    async fn save_flow_cursor(
        &self,
        id: TicketId,
        cursor: &FlowCursor,
        now: &str,
    ) -> Result<bool, TicketflowError>;

    /// Detaches the automation: clears the cursor and returns the ticket to `pending`.
    async fn exit_flow(&self, id: TicketId, now: &str) -> Result<bool, TicketflowError>;

    /// Sets the queue of a non-closed ticket.
    async fn set_ticket_queue(
        &self,
        id: TicketId,
        queue_id: QueueId,
        now: &str,
    ) -> Result<bool, TicketflowError>;

    /// Closes a ticket and clears its cursor. Returns `false` if already closed.
    async fn close_ticket(&self, id: TicketId, now: &str) -> Result<bool, TicketflowError>;

    // --- Directory operations ---

    async fn insert_contact(&self, contact: &Contact) -> Result<Contact, TicketflowError>;

    async fn get_contact(&self, id: ContactId) -> Result<Option<Contact>, TicketflowError>;

    async fn record_lgpd_consent(&self, id: ContactId, at: &str) -> Result<(), TicketflowError>;

    async fn insert_channel(&self, channel: &Channel) -> Result<Channel, TicketflowError>;

    async fn get_channel(&self, id: ChannelId) -> Result<Option<Channel>, TicketflowError>;

    async fn insert_queue(&self, queue: &Queue) -> Result<Queue, TicketflowError>;

    async fn get_queue(&self, id: QueueId) -> Result<Option<Queue>, TicketflowError>;

    /// Appends a queue to the channel's ordered queue list.
    async fn attach_queue(
        &self,
        channel_id: ChannelId,
        queue_id: QueueId,
        position: i64,
    ) -> Result<(), TicketflowError>;

    /// Queues of a channel in routing order; the first one is the default.
    async fn channel_queues(&self, channel_id: ChannelId) -> Result<Vec<Queue>, TicketflowError>;

    async fn insert_flow(&self, flow: &FlowRecord) -> Result<FlowRecord, TicketflowError>;

    async fn get_flow(&self, id: FlowId) -> Result<Option<FlowRecord>, TicketflowError>;

    /// Replaces a flow definition. Runs pick it up at their next step.
    async fn update_flow_definition(
        &self,
        id: FlowId,
        definition: &str,
    ) -> Result<(), TicketflowError>;

    // --- Flow log operations ---

    async fn append_flow_log(&self, entry: &NewFlowLogEntry) -> Result<i64, TicketflowError>;

    async fn list_flow_log(&self, ticket_id: TicketId)
        -> Result<Vec<FlowLogEntry>, TicketflowError>;

    // --- Assignment ---

    /// Assigns a human agent: status becomes `open` and the cursor is cleared.
    async fn assign_user(
        &self,
        id: TicketId,
        user_id: UserId,
        now: &str,
    ) -> Result<bool, TicketflowError>;
}
