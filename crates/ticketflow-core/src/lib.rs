// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for ticketflow.
//!
//! Provides the ticket data model, the error taxonomy and the collaborator
//! ports (messaging transport, media store, clock, storage) that the engine
//! and the flow interpreter are written against.

pub mod error;
pub mod traits;
pub mod types;

pub use error::TicketflowError;
pub use types::{
    AdapterType, Channel, ChannelId, CompanyId, Contact, ContactId, FlowCursor, FlowId,
    FlowLogEntry, FlowLogType, FlowRecord, HealthStatus, InboundPayload, MediaKind, MessageId,
    NewFlowLogEntry, NewTicket, NodeId, Queue, QueueId, Recipient, Ticket, TicketId, TicketKey,
    TicketStatus, UserId, format_timestamp,
};

pub use traits::{
    Clock, MediaPort, MessagingFactory, MessagingPort, PluginAdapter, StorageAdapter,
    SystemClock,
};
