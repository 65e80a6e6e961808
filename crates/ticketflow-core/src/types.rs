// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the store, the router, the interpreter and the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

pub type TicketId = i64;
pub type ContactId = i64;
pub type ChannelId = i64;
pub type CompanyId = i64;
pub type QueueId = i64;
pub type UserId = i64;
pub type FlowId = i64;

/// Identifier of a node inside a flow graph (author-assigned, opaque).
pub type NodeId = String;

/// Format used for every persisted timestamp. Lexicographic order equals
/// chronological order, which the reopen-window query relies on.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Render a timestamp in the persisted format.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Unique identifier for a message returned by a messaging port.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Degraded(String),
    Unhealthy(String),
}

/// Identifies the kind of collaborator behind a [`PluginAdapter`](crate::PluginAdapter).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Messaging,
    Media,
    Storage,
}

/// Lifecycle state of a ticket.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    AsRefStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    /// Claimed by a human agent.
    Open,
    /// Waiting in a queue for a human agent.
    Pending,
    /// Multi-party chat handled outside the ticket workflow.
    Group,
    /// Controlled by an automation.
    Bot,
    /// Waiting for data-protection consent.
    Lgpd,
    /// Satisfaction survey in progress.
    Nps,
    Closed,
}

impl TicketStatus {
    /// Whether the status belongs to the active set (everything but `closed`).
    pub fn is_active(self) -> bool {
        !matches!(self, TicketStatus::Closed)
    }

    /// Statuses in which an automation cursor may be live.
    pub fn allows_flow(self) -> bool {
        matches!(self, TicketStatus::Bot | TicketStatus::Pending)
    }
}

/// The uniqueness key for active tickets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TicketKey {
    pub contact_id: ContactId,
    pub channel_id: ChannelId,
    pub company_id: CompanyId,
}

impl std::fmt::Display for TicketKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "contact={}/channel={}/company={}",
            self.contact_id, self.channel_id, self.company_id
        )
    }
}

/// One conversation thread between a contact and the business on one channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: TicketId,
    pub uuid: String,
    pub contact_id: ContactId,
    pub channel_id: ChannelId,
    pub company_id: CompanyId,
    pub queue_id: Option<QueueId>,
    pub user_id: Option<UserId>,
    pub status: TicketStatus,
    pub is_bot: bool,
    pub unread_messages: i64,
    /// Last completed flow node, or `None` when no automation is attached.
    pub last_flow_id: Option<NodeId>,
    pub flow_active: bool,
    /// Correlation id issued per automation run.
    pub flow_session_hash: Option<String>,
    /// Automation definition that last touched this ticket.
    pub flow_stopped_by: Option<FlowId>,
    pub last_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Ticket {
    pub fn key(&self) -> TicketKey {
        TicketKey {
            contact_id: self.contact_id,
            channel_id: self.channel_id,
            company_id: self.company_id,
        }
    }

    /// The persisted flow cursor.
    pub fn cursor(&self) -> FlowCursor {
        FlowCursor {
            last_flow_id: self.last_flow_id.clone(),
            flow_active: self.flow_active,
            flow_session_hash: self.flow_session_hash.clone(),
            flow_stopped_by: self.flow_stopped_by,
        }
    }

    /// Checks the cursor invariant: an active flow needs a node and a status
    /// that admits automation, and a closed ticket never has one.
    pub fn cursor_is_consistent(&self) -> bool {
        if self.flow_active {
            self.last_flow_id.is_some() && self.status.allows_flow()
        } else {
            true
        }
    }
}

/// Fields needed to insert a new ticket row.
#[derive(Debug, Clone)]
pub struct NewTicket {
    pub key: TicketKey,
    pub queue_id: Option<QueueId>,
    pub user_id: Option<UserId>,
    pub status: TicketStatus,
    pub is_bot: bool,
    pub unread_messages: i64,
    pub last_message: Option<String>,
}

/// The flow cursor columns of a ticket, written as one unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowCursor {
    pub last_flow_id: Option<NodeId>,
    pub flow_active: bool,
    pub flow_session_hash: Option<String>,
    pub flow_stopped_by: Option<FlowId>,
}

/// A person or group chat on a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: ContactId,
    pub company_id: CompanyId,
    pub number: String,
    pub name: String,
    pub is_group: bool,
    /// When the contact accepted data-protection terms, if ever.
    pub lgpd_accepted_at: Option<String>,
}

/// A connection (number/account) tickets are exchanged on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub id: ChannelId,
    pub company_id: CompanyId,
    pub name: String,
    /// Minutes after closing during which a new message reopens the old ticket.
    pub reopen_window_minutes: Option<i64>,
    /// Treat group chats as ordinary tickets instead of the `group` status.
    pub groups_as_tickets: bool,
    /// Require data-protection consent before anything else happens.
    pub lgpd_required: bool,
}

/// A routing bucket for tickets, optionally carrying an automation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Queue {
    pub id: QueueId,
    pub company_id: CompanyId,
    pub name: String,
    /// Attached automation. Only reported when the flow is active.
    pub flow_id: Option<FlowId>,
}

/// A stored automation definition (raw JSON, parsed by the interpreter).
#[derive(Debug, Clone, PartialEq)]
pub struct FlowRecord {
    pub id: FlowId,
    pub company_id: CompanyId,
    pub name: String,
    pub definition: String,
    pub active: bool,
}

/// Kind of audit record appended to the flow log.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum FlowLogType {
    Create,
    Lgpd,
    Reopen,
    Queue,
    Assign,
    Node,
    Exit,
    Close,
    Abort,
}

/// Append-only audit record. Never mutated or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowLogEntry {
    pub id: i64,
    pub ticket_id: TicketId,
    pub node_id: Option<NodeId>,
    pub entry_type: FlowLogType,
    pub queue_id: Option<QueueId>,
    pub user_id: Option<UserId>,
    pub created_at: String,
}

/// An audit record before it is assigned an id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewFlowLogEntry {
    pub ticket_id: TicketId,
    pub node_id: Option<NodeId>,
    pub entry_type: FlowLogType,
    pub queue_id: Option<QueueId>,
    pub user_id: Option<UserId>,
    pub created_at: String,
}

/// Media categories a messaging port can deliver.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Audio,
    Video,
    Document,
}

/// Destination of an outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    pub channel_id: ChannelId,
    pub address: String,
    pub is_group: bool,
}

impl Recipient {
    pub fn for_contact(channel_id: ChannelId, contact: &Contact) -> Self {
        Self {
            channel_id,
            address: contact.number.clone(),
            is_group: contact.is_group,
        }
    }
}

/// What arrived from the transport for one inbound event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InboundPayload {
    pub body: Option<String>,
    pub press_key: Option<String>,
    pub is_group: bool,
    pub is_campaign: bool,
    pub is_forward: bool,
    pub is_imported: bool,
    pub requested_queue_id: Option<QueueId>,
    pub requested_user_id: Option<UserId>,
}

impl InboundPayload {
    /// The keypress carried by this event. Falls back to the message body when
    /// the contact typed a bare number or `stop` instead of pressing a button.
    pub fn effective_key(&self) -> Option<String> {
        if let Some(key) = self.press_key.as_deref() {
            let key = key.trim();
            if key.eq_ignore_ascii_case("stop") {
                return Some("stop".to_string());
            }
            if !key.is_empty() {
                return Some(key.to_string());
            }
        }
        let body = self.body.as_deref()?.trim();
        if body.eq_ignore_ascii_case("stop") {
            return Some("stop".to_string());
        }
        if !body.is_empty() && body.chars().all(|c| c.is_ascii_digit()) {
            return Some(body.to_string());
        }
        None
    }
}
