// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only trail of ticket state transitions.
//!
//! Recording never fails the caller: an audit write that cannot be stored is
//! reported at `warn` and dropped, so a storage hiccup on the log table does
//! not abort a ticket transition that already happened.

use std::sync::Arc;

use ticketflow_core::types::{FlowLogEntry, FlowLogType, NewFlowLogEntry};
use ticketflow_core::{
    Clock, QueueId, StorageAdapter, TicketId, TicketflowError, UserId, format_timestamp,
};
use tracing::{debug, warn};

/// Writer and reader for the flow log.
#[derive(Clone)]
pub struct EventLog {
    storage: Arc<dyn StorageAdapter>,
    clock: Arc<dyn Clock>,
}

/// Optional fields attached to a log entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct EntryContext<'a> {
    pub node_id: Option<&'a str>,
    pub queue_id: Option<QueueId>,
    pub user_id: Option<UserId>,
}

impl<'a> EntryContext<'a> {
    pub fn node(node_id: &'a str) -> Self {
        Self {
            node_id: Some(node_id),
            ..Self::default()
        }
    }

    pub fn queue(queue_id: QueueId) -> Self {
        Self {
            queue_id: Some(queue_id),
            ..Self::default()
        }
    }

    pub fn user(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            ..Self::default()
        }
    }
}

impl EventLog {
    pub fn new(storage: Arc<dyn StorageAdapter>, clock: Arc<dyn Clock>) -> Self {
        Self { storage, clock }
    }

    /// Append an entry. Returns its id, or `None` if the write failed.
    pub async fn record(
        &self,
        ticket_id: TicketId,
        entry_type: FlowLogType,
        context: EntryContext<'_>,
    ) -> Option<i64> {
        let entry = NewFlowLogEntry {
            ticket_id,
            node_id: context.node_id.map(str::to_string),
            entry_type,
            queue_id: context.queue_id,
            user_id: context.user_id,
            created_at: format_timestamp(self.clock.now()),
        };
        match self.storage.append_flow_log(&entry).await {
            Ok(id) => {
                debug!(ticket_id, entry_type = %entry_type, node_id = ?entry.node_id, "flow log");
                Some(id)
            }
            Err(e) => {
                warn!(ticket_id, entry_type = %entry_type, error = %e, "failed to append flow log entry");
                None
            }
        }
    }

    /// Entries of a ticket in the order they were appended.
    pub async fn history(&self, ticket_id: TicketId) -> Result<Vec<FlowLogEntry>, TicketflowError> {
        self.storage.list_flow_log(ticket_id).await
    }
}
