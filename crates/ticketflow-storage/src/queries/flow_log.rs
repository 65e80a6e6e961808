// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only flow log.

use std::str::FromStr;

use rusqlite::params;
use ticketflow_core::TicketflowError;
use ticketflow_core::types::{FlowLogEntry, FlowLogType, NewFlowLogEntry, TicketId};

use crate::database::{Database, map_tr_err};

/// Append an entry and return its id.
pub async fn append_flow_log(
    db: &Database,
    entry: &NewFlowLogEntry,
) -> Result<i64, TicketflowError> {
    let entry = entry.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO flow_log (ticket_id, node_id, type, queue_id, user_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    entry.ticket_id,
                    entry.node_id,
                    entry.entry_type.as_ref(),
                    entry.queue_id,
                    entry.user_id,
                    entry.created_at,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

/// Entries of a ticket in append order.
pub async fn list_flow_log(
    db: &Database,
    ticket_id: TicketId,
) -> Result<Vec<FlowLogEntry>, TicketflowError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, ticket_id, node_id, type, queue_id, user_id, created_at
                 FROM flow_log WHERE ticket_id = ?1 ORDER BY id",
            )?;
            let rows = stmt.query_map(params![ticket_id], |row| {
                let kind: String = row.get(3)?;
                let entry_type = FlowLogType::from_str(&kind).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        3,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                })?;
                Ok(FlowLogEntry {
                    id: row.get(0)?,
                    ticket_id: row.get(1)?,
                    node_id: row.get(2)?,
                    entry_type,
                    queue_id: row.get(4)?,
                    user_id: row.get(5)?,
                    created_at: row.get(6)?,
                })
            })?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::{directory, tickets};
    use tempfile::tempdir;
    use ticketflow_core::types::{Channel, Contact, NewTicket, TicketKey, TicketStatus};

    #[tokio::test]
    async fn entries_come_back_in_append_order() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("t.db").to_str().unwrap())
            .await
            .unwrap();
        let contact = directory::insert_contact(
            &db,
            &Contact {
                id: 0,
                company_id: 1,
                number: "1".into(),
                name: "x".into(),
                is_group: false,
                lgpd_accepted_at: None,
            },
        )
        .await
        .unwrap();
        let channel = directory::insert_channel(
            &db,
            &Channel {
                id: 0,
                company_id: 1,
                name: "c".into(),
                reopen_window_minutes: None,
                groups_as_tickets: false,
                lgpd_required: false,
            },
        )
        .await
        .unwrap();
        let ticket = tickets::insert_ticket(
            &db,
            &NewTicket {
                key: TicketKey {
                    contact_id: contact.id,
                    channel_id: channel.id,
                    company_id: 1,
                },
                queue_id: None,
                user_id: None,
                status: TicketStatus::Pending,
                is_bot: false,
                unread_messages: 0,
                last_message: None,
            },
            "2026-01-01T00:00:00.000Z",
        )
        .await
        .unwrap();

        for (kind, node) in [
            (FlowLogType::Create, None),
            (FlowLogType::Node, Some("menu")),
            (FlowLogType::Exit, Some("end")),
        ] {
            append_flow_log(
                &db,
                &NewFlowLogEntry {
                    ticket_id: ticket.id,
                    node_id: node.map(str::to_string),
                    entry_type: kind,
                    queue_id: None,
                    user_id: None,
                    created_at: "2026-01-01T00:00:00.000Z".into(),
                },
            )
            .await
            .unwrap();
        }

        let kinds: Vec<_> = list_flow_log(&db, ticket.id)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.entry_type)
            .collect();
        assert_eq!(
            kinds,
            vec![FlowLogType::Create, FlowLogType::Node, FlowLogType::Exit]
        );
    }
}
