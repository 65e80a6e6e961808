// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `ticketflow replay` command implementation.
//!
//! Reads one JSON event per line and drives it through the engine. Setup
//! events (`contact`, `channel`, `flow`, `queue`) seed the directory and are
//! referenced by name from later events; `inbound`, `close` and `reassign`
//! exercise the ticket lifecycle. Ctrl-C stops the replay between events.

use std::collections::HashMap;
use std::io::IsTerminal;
use std::sync::Arc;

use serde::Deserialize;
use ticketflow_config::TicketflowConfig;
use ticketflow_core::{
    Channel, ChannelId, CompanyId, Contact, ContactId, FlowId, FlowRecord, InboundPayload, Queue,
    QueueId, StorageAdapter, SystemClock, Ticket, TicketId, TicketflowError, UserId,
};
use ticketflow_engine::shutdown::install_signal_handler;
use ticketflow_engine::{EnginePorts, TicketEngine};
use ticketflow_storage::SqliteStorage;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{error, info};

use crate::console::{ConsoleMedia, ConsoleMessagingFactory};

fn default_company() -> CompanyId {
    1
}

/// One line of a replay file.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum ReplayEvent {
    #[serde(rename_all = "camelCase")]
    Contact {
        number: String,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        is_group: bool,
        #[serde(default = "default_company")]
        company_id: CompanyId,
    },
    #[serde(rename_all = "camelCase")]
    Channel {
        name: String,
        #[serde(default)]
        reopen_window_minutes: Option<i64>,
        #[serde(default)]
        groups_as_tickets: bool,
        #[serde(default)]
        lgpd_required: bool,
        #[serde(default = "default_company")]
        company_id: CompanyId,
    },
    #[serde(rename_all = "camelCase")]
    Flow {
        name: String,
        definition: serde_json::Value,
        #[serde(default = "default_company")]
        company_id: CompanyId,
    },
    /// A queue, optionally carrying a flow and attached to a channel.
    #[serde(rename_all = "camelCase")]
    Queue {
        name: String,
        #[serde(default)]
        flow: Option<String>,
        #[serde(default)]
        channel: Option<String>,
        #[serde(default = "default_company")]
        company_id: CompanyId,
    },
    #[serde(rename_all = "camelCase")]
    Inbound {
        contact: String,
        channel: String,
        #[serde(default = "default_company")]
        company_id: CompanyId,
        #[serde(flatten)]
        payload: InboundPayload,
    },
    #[serde(rename_all = "camelCase")]
    Close { ticket_id: TicketId },
    #[serde(rename_all = "camelCase")]
    Reassign {
        ticket_id: TicketId,
        #[serde(default)]
        queue: Option<String>,
        #[serde(default)]
        user_id: Option<UserId>,
    },
}

/// Name-to-id lookups for entities created earlier in the replay.
#[derive(Default)]
struct Directory {
    contacts: HashMap<String, ContactId>,
    channels: HashMap<String, ChannelId>,
    flows: HashMap<String, FlowId>,
    queues: HashMap<String, QueueId>,
    queue_positions: HashMap<ChannelId, i64>,
}

fn lookup<T: Copy>(
    map: &HashMap<String, T>,
    entity: &'static str,
    name: &str,
) -> Result<T, TicketflowError> {
    map.get(name)
        .copied()
        .ok_or_else(|| TicketflowError::not_found(entity, name))
}

pub struct Replay {
    storage: Arc<dyn StorageAdapter>,
    engine: TicketEngine,
    directory: Directory,
}

impl Replay {
    pub fn new(storage: Arc<dyn StorageAdapter>, engine: TicketEngine) -> Self {
        Self {
            storage,
            engine,
            directory: Directory::default(),
        }
    }

    /// Apply one event line. Returns the affected ticket for lifecycle events.
    pub async fn apply(&mut self, line: &str) -> Result<Option<Ticket>, TicketflowError> {
        let event: ReplayEvent = serde_json::from_str(line)
            .map_err(|e| TicketflowError::Config(format!("invalid replay event: {e}")))?;

        match event {
            ReplayEvent::Contact {
                number,
                name,
                is_group,
                company_id,
            } => {
                let contact = self
                    .storage
                    .insert_contact(&Contact {
                        id: 0,
                        company_id,
                        name: name.unwrap_or_else(|| number.clone()),
                        number: number.clone(),
                        is_group,
                        lgpd_accepted_at: None,
                    })
                    .await?;
                self.directory.contacts.insert(number, contact.id);
                Ok(None)
            }
            ReplayEvent::Channel {
                name,
                reopen_window_minutes,
                groups_as_tickets,
                lgpd_required,
                company_id,
            } => {
                let channel = self
                    .storage
                    .insert_channel(&Channel {
                        id: 0,
                        company_id,
                        name: name.clone(),
                        reopen_window_minutes,
                        groups_as_tickets,
                        lgpd_required,
                    })
                    .await?;
                self.directory.channels.insert(name, channel.id);
                Ok(None)
            }
            ReplayEvent::Flow {
                name,
                definition,
                company_id,
            } => {
                let definition = definition.to_string();
                ticketflow_flow::FlowGraph::parse(0, &definition)?;
                let flow = self
                    .storage
                    .insert_flow(&FlowRecord {
                        id: 0,
                        company_id,
                        name: name.clone(),
                        definition,
                        active: true,
                    })
                    .await?;
                self.directory.flows.insert(name, flow.id);
                Ok(None)
            }
            ReplayEvent::Queue {
                name,
                flow,
                channel,
                company_id,
            } => {
                let flow_id = flow
                    .map(|f| lookup(&self.directory.flows, "flow", &f))
                    .transpose()?;
                let queue = self
                    .storage
                    .insert_queue(&Queue {
                        id: 0,
                        company_id,
                        name: name.clone(),
                        flow_id,
                    })
                    .await?;
                if let Some(channel) = channel {
                    let channel_id = lookup(&self.directory.channels, "channel", &channel)?;
                    let position = self.directory.queue_positions.entry(channel_id).or_insert(0);
                    self.storage.attach_queue(channel_id, queue.id, *position).await?;
                    *position += 1;
                }
                self.directory.queues.insert(name, queue.id);
                Ok(None)
            }
            ReplayEvent::Inbound {
                contact,
                channel,
                company_id,
                payload,
            } => {
                let contact_id = lookup(&self.directory.contacts, "contact", &contact)?;
                let channel_id = lookup(&self.directory.channels, "channel", &channel)?;
                let ticket = self
                    .engine
                    .handle_inbound_event(contact_id, channel_id, company_id, &payload)
                    .await?;
                Ok(Some(ticket))
            }
            ReplayEvent::Close { ticket_id } => {
                self.engine.handle_ticket_closed(ticket_id).await?;
                Ok(self.storage.get_ticket(ticket_id).await?)
            }
            ReplayEvent::Reassign {
                ticket_id,
                queue,
                user_id,
            } => {
                let queue_id = queue
                    .map(|q| lookup(&self.directory.queues, "queue", &q))
                    .transpose()?;
                let ticket = self
                    .engine
                    .handle_ticket_reassigned(ticket_id, queue_id, user_id)
                    .await?;
                Ok(Some(ticket))
            }
        }
    }

    pub async fn shutdown(&self) {
        self.engine.shutdown().await;
    }
}

fn describe(ticket: &Ticket) -> String {
    let mut line = format!("ticket {}: {}", ticket.id, ticket.status);
    if let Some(queue_id) = ticket.queue_id {
        line.push_str(&format!(", queue {queue_id}"));
    }
    if let Some(user_id) = ticket.user_id {
        line.push_str(&format!(", user {user_id}"));
    }
    if ticket.flow_active
        && let Some(node) = &ticket.last_flow_id
    {
        line.push_str(&format!(", automation at `{node}`"));
    }
    line
}

/// Run the `ticketflow replay` command.
pub async fn run_replay(
    config: TicketflowConfig,
    input: &str,
    seed: Option<u64>,
) -> Result<(), TicketflowError> {
    let storage = Arc::new(SqliteStorage::new(config.storage.clone()));
    storage.initialize().await?;
    let storage: Arc<dyn StorageAdapter> = storage;

    let color = std::io::stdout().is_terminal();
    let engine = TicketEngine::new(
        &config,
        EnginePorts {
            storage: storage.clone(),
            messaging: Arc::new(ConsoleMessagingFactory::new(color)),
            media: Arc::new(ConsoleMedia::new(&config.media)),
            clock: Arc::new(SystemClock),
        },
    );
    let engine = match seed {
        Some(seed) => engine.with_seed(seed),
        None => engine,
    };
    let mut replay = Replay::new(storage.clone(), engine);

    let reader: Box<dyn AsyncBufRead + Unpin + Send> = if input == "-" {
        Box::new(BufReader::new(tokio::io::stdin()))
    } else {
        let file = tokio::fs::File::open(input)
            .await
            .map_err(|e| TicketflowError::Config(format!("cannot open {input}: {e}")))?;
        Box::new(BufReader::new(file))
    };
    let mut lines = reader.lines();
    let cancel = install_signal_handler();

    let (mut applied, mut failed, mut line_no) = (0usize, 0usize, 0usize);
    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => {
                info!("replay interrupted");
                break;
            }
            line = lines.next_line() => line,
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!(error = %e, "failed to read replay input");
                break;
            }
        };
        line_no += 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        match replay.apply(trimmed).await {
            Ok(Some(ticket)) => {
                applied += 1;
                println!("{}", describe(&ticket));
            }
            Ok(None) => applied += 1,
            Err(e) => {
                failed += 1;
                error!(line = line_no, error = %e, "replay event failed");
            }
        }
    }

    cancel.cancel();
    replay.shutdown().await;
    storage.close().await?;
    info!(applied, failed, "replay finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ticketflow_core::TicketStatus;

    const SETUP: &[&str] = &[
        r#"{"type": "contact", "number": "555111", "name": "Ana"}"#,
        r#"{"type": "channel", "name": "whatsapp-main"}"#,
        r#"{"type": "flow", "name": "welcome", "definition": {"nodes": [
            {"id": "menu", "type": "menu", "data": {"message": "Welcome!", "options": [{"number": 1, "value": "Sales"}]}},
            {"id": "sales", "type": "singleBlock", "data": {"elements": [{"type": "message", "value": "Sales here"}]}},
            {"id": "end", "type": "terminal"}
        ], "edges": [
            {"source": "menu", "sourceHandle": "a1", "target": "sales"},
            {"source": "sales", "target": "end"}
        ]}}"#,
        r#"{"type": "queue", "name": "Support", "flow": "welcome", "channel": "whatsapp-main"}"#,
    ];

    async fn replay() -> (Replay, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = TicketflowConfig::default();
        config.storage.database_path = dir.path().join("replay.db").to_string_lossy().to_string();
        config.flow.settle_delay_ms = 0;

        let storage = Arc::new(SqliteStorage::new(config.storage.clone()));
        storage.initialize().await.unwrap();
        let storage: Arc<dyn StorageAdapter> = storage;
        let engine = TicketEngine::new(
            &config,
            EnginePorts {
                storage: storage.clone(),
                messaging: Arc::new(ConsoleMessagingFactory::new(false)),
                media: Arc::new(ConsoleMedia::new(&config.media)),
                clock: Arc::new(SystemClock),
            },
        );
        let mut replay = Replay::new(storage, engine);
        for line in SETUP {
            replay.apply(line).await.unwrap();
        }
        (replay, dir)
    }

    #[tokio::test]
    async fn inbound_events_walk_the_menu() {
        let (mut replay, _dir) = replay().await;

        let parked = replay
            .apply(r#"{"type": "inbound", "contact": "555111", "channel": "whatsapp-main", "body": "oi"}"#)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(parked.status, TicketStatus::Bot);
        assert_eq!(parked.last_flow_id.as_deref(), Some("menu"));
        assert!(describe(&parked).contains("automation at `menu`"));

        let done = replay
            .apply(r#"{"type": "inbound", "contact": "555111", "channel": "whatsapp-main", "pressKey": "1"}"#)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(done.status, TicketStatus::Pending);
        assert!(!done.flow_active);
    }

    #[tokio::test]
    async fn close_and_unknown_names() {
        let (mut replay, _dir) = replay().await;
        let ticket = replay
            .apply(r#"{"type": "inbound", "contact": "555111", "channel": "whatsapp-main", "body": "oi"}"#)
            .await
            .unwrap()
            .unwrap();

        let closed = replay
            .apply(&format!(r#"{{"type": "close", "ticketId": {}}}"#, ticket.id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(closed.status, TicketStatus::Closed);

        let err = replay
            .apply(r#"{"type": "inbound", "contact": "999", "channel": "whatsapp-main"}"#)
            .await
            .unwrap_err();
        assert!(matches!(err, TicketflowError::NotFound { entity: "contact", .. }));
    }

    #[tokio::test]
    async fn invalid_flow_is_rejected_before_storing() {
        let (mut replay, _dir) = replay().await;
        let err = replay
            .apply(r#"{"type": "flow", "name": "broken", "definition": {"nodes": []}}"#)
            .await
            .unwrap_err();
        assert!(matches!(err, TicketflowError::InvalidFlow { .. }));
    }
}
