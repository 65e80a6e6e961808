// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ticket rows and the flow cursor.
//!
//! Every update except [`reopen_ticket`] carries `status <> 'closed'` in its
//! `WHERE` clause and reports whether a row changed.

use std::str::FromStr;

use rusqlite::{OptionalExtension, Row, params};
use ticketflow_core::types::{
    FlowCursor, NewTicket, Ticket, TicketId, TicketKey, TicketStatus, UserId,
};
use ticketflow_core::{QueueId, TicketflowError};

use crate::database::{Database, map_tr_err, map_unique_err};

const TICKET_COLUMNS: &str = "id, uuid, contact_id, channel_id, company_id, queue_id, user_id, \
     status, is_bot, unread_messages, last_flow_id, flow_active, flow_session_hash, \
     flow_stopped_by, last_message, created_at, updated_at";

fn ticket_from_row(row: &Row<'_>) -> rusqlite::Result<Ticket> {
    let status: String = row.get(7)?;
    let status = TicketStatus::from_str(&status).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Ticket {
        id: row.get(0)?,
        uuid: row.get(1)?,
        contact_id: row.get(2)?,
        channel_id: row.get(3)?,
        company_id: row.get(4)?,
        queue_id: row.get(5)?,
        user_id: row.get(6)?,
        status,
        is_bot: row.get(8)?,
        unread_messages: row.get(9)?,
        last_flow_id: row.get(10)?,
        flow_active: row.get(11)?,
        flow_session_hash: row.get(12)?,
        flow_stopped_by: row.get(13)?,
        last_message: row.get(14)?,
        created_at: row.get(15)?,
        updated_at: row.get(16)?,
    })
}

fn select_one(
    conn: &rusqlite::Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> rusqlite::Result<Option<Ticket>> {
    conn.query_row(sql, params, ticket_from_row).optional()
}

/// Insert a new ticket. A second active ticket for the key is a `Conflict`.
pub async fn insert_ticket(
    db: &Database,
    ticket: &NewTicket,
    now: &str,
) -> Result<Ticket, TicketflowError> {
    let ticket = ticket.clone();
    let now = now.to_string();
    let uuid = uuid::Uuid::new_v4().to_string();
    let key = ticket.key;
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO tickets (uuid, contact_id, channel_id, company_id, queue_id, user_id,
                     status, is_bot, unread_messages, last_message, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
                params![
                    uuid,
                    ticket.key.contact_id,
                    ticket.key.channel_id,
                    ticket.key.company_id,
                    ticket.queue_id,
                    ticket.user_id,
                    ticket.status.as_ref(),
                    ticket.is_bot,
                    ticket.unread_messages,
                    ticket.last_message,
                    now,
                ],
            )?;
            let id = conn.last_insert_rowid();
            conn.query_row(
                &format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE id = ?1"),
                params![id],
                ticket_from_row,
            )
        })
        .await
        .map_err(|e| map_unique_err(e, &format!("an active ticket already exists for {key}")))
}

pub async fn get_ticket(db: &Database, id: TicketId) -> Result<Option<Ticket>, TicketflowError> {
    db.connection()
        .call(move |conn| {
            select_one(
                conn,
                &format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE id = ?1"),
                params![id],
            )
        })
        .await
        .map_err(map_tr_err)
}

/// The non-closed ticket for the key, if any.
pub async fn find_active_ticket(
    db: &Database,
    key: &TicketKey,
) -> Result<Option<Ticket>, TicketflowError> {
    let key = *key;
    db.connection()
        .call(move |conn| {
            select_one(
                conn,
                &format!(
                    "SELECT {TICKET_COLUMNS} FROM tickets
                     WHERE contact_id = ?1 AND channel_id = ?2 AND company_id = ?3
                       AND status <> 'closed'"
                ),
                params![key.contact_id, key.channel_id, key.company_id],
            )
        })
        .await
        .map_err(map_tr_err)
}

/// Most recently updated closed ticket for the key with `updated_at >= since`.
pub async fn find_recent_closed_ticket(
    db: &Database,
    key: &TicketKey,
    since: &str,
) -> Result<Option<Ticket>, TicketflowError> {
    let key = *key;
    let since = since.to_string();
    db.connection()
        .call(move |conn| {
            select_one(
                conn,
                &format!(
                    "SELECT {TICKET_COLUMNS} FROM tickets
                     WHERE contact_id = ?1 AND channel_id = ?2 AND company_id = ?3
                       AND status = 'closed' AND updated_at >= ?4
                     ORDER BY updated_at DESC, id DESC LIMIT 1"
                ),
                params![key.contact_id, key.channel_id, key.company_id, since],
            )
        })
        .await
        .map_err(map_tr_err)
}

/// Every ticket for the key, newest first.
pub async fn list_tickets_for_key(
    db: &Database,
    key: &TicketKey,
) -> Result<Vec<Ticket>, TicketflowError> {
    let key = *key;
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {TICKET_COLUMNS} FROM tickets
                 WHERE contact_id = ?1 AND channel_id = ?2 AND company_id = ?3
                 ORDER BY id DESC"
            ))?;
            let rows = stmt.query_map(
                params![key.contact_id, key.channel_id, key.company_id],
                ticket_from_row,
            )?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Write the assignment, status and counters of a non-closed ticket.
pub async fn update_ticket(
    db: &Database,
    ticket: &Ticket,
    now: &str,
) -> Result<bool, TicketflowError> {
    let ticket = ticket.clone();
    let id = ticket.id;
    let now = now.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE tickets SET queue_id = ?2, user_id = ?3, status = ?4, is_bot = ?5,
                     unread_messages = ?6, last_message = ?7, updated_at = ?8
                 WHERE id = ?1 AND status <> 'closed'",
                params![
                    ticket.id,
                    ticket.queue_id,
                    ticket.user_id,
                    ticket.status.as_ref(),
                    ticket.is_bot,
                    ticket.unread_messages,
                    ticket.last_message,
                    now,
                ],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(|e| map_unique_err(e, &format!("ticket {id} cannot become active")))
}

/// Move a closed ticket back to `pending`. The human assignment and the
/// automation cursor are dropped.
pub async fn reopen_ticket(
    db: &Database,
    id: TicketId,
    unread_delta: i64,
    now: &str,
) -> Result<bool, TicketflowError> {
    let now = now.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE tickets SET status = 'pending', user_id = NULL, is_bot = 0,
                     unread_messages = unread_messages + ?2,
                     last_flow_id = NULL, flow_active = 0, flow_session_hash = NULL,
                     updated_at = ?3
                 WHERE id = ?1 AND status = 'closed'",
                params![id, unread_delta, now],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(|e| map_unique_err(e, &format!("ticket {id} cannot be reopened: another ticket is active")))
}

/// Persist the flow cursor. An active cursor is only accepted while the
/// ticket is in a status that admits automation.
pub async fn save_flow_cursor(
    db: &Database,
    id: TicketId,
    cursor: &FlowCursor,
    now: &str,
) -> Result<bool, TicketflowError> {
    let cursor = cursor.clone();
    let now = now.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE tickets SET last_flow_id = ?2, flow_active = ?3, flow_session_hash = ?4,
                     flow_stopped_by = ?5, updated_at = ?6
                 WHERE id = ?1 AND status <> 'closed'
                   AND (?3 = 0 OR status IN ('bot', 'pending'))",
                params![
                    id,
                    cursor.last_flow_id,
                    cursor.flow_active,
                    cursor.flow_session_hash,
                    cursor.flow_stopped_by,
                    now,
                ],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// Detach the automation. Automatic statuses fall back to `pending`; a ticket
/// a human already claimed keeps its status.
pub async fn exit_flow(db: &Database, id: TicketId, now: &str) -> Result<bool, TicketflowError> {
    let now = now.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE tickets SET last_flow_id = NULL, flow_active = 0, flow_session_hash = NULL,
                     is_bot = 0,
                     status = CASE WHEN status IN ('bot', 'pending') THEN 'pending' ELSE status END,
                     updated_at = ?2
                 WHERE id = ?1 AND status <> 'closed'",
                params![id, now],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn set_ticket_queue(
    db: &Database,
    id: TicketId,
    queue_id: QueueId,
    now: &str,
) -> Result<bool, TicketflowError> {
    let now = now.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE tickets SET queue_id = ?2, updated_at = ?3
                 WHERE id = ?1 AND status <> 'closed'",
                params![id, queue_id, now],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// Close a ticket. Returns `false` when it was already closed.
pub async fn close_ticket(db: &Database, id: TicketId, now: &str) -> Result<bool, TicketflowError> {
    let now = now.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE tickets SET status = 'closed', is_bot = 0, unread_messages = 0,
                     last_flow_id = NULL, flow_active = 0, flow_session_hash = NULL,
                     updated_at = ?2
                 WHERE id = ?1 AND status <> 'closed'",
                params![id, now],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// Hand a ticket to a human agent: `open`, automation detached.
pub async fn assign_user(
    db: &Database,
    id: TicketId,
    user_id: UserId,
    now: &str,
) -> Result<bool, TicketflowError> {
    let now = now.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE tickets SET user_id = ?2, status = 'open', is_bot = 0,
                     last_flow_id = NULL, flow_active = 0, flow_session_hash = NULL,
                     updated_at = ?3
                 WHERE id = ?1 AND status <> 'closed'",
                params![id, user_id, now],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::directory;
    use tempfile::tempdir;
    use ticketflow_core::types::{Channel, Contact};

    const T0: &str = "2026-01-01T10:00:00.000Z";
    const T1: &str = "2026-01-01T10:05:00.000Z";

    async fn setup_db() -> (Database, tempfile::TempDir, TicketKey) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        let contact = directory::insert_contact(
            &db,
            &Contact {
                id: 0,
                company_id: 1,
                number: "555111".into(),
                name: "Ana".into(),
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
                name: "main".into(),
                reopen_window_minutes: None,
                groups_as_tickets: false,
                lgpd_required: false,
            },
        )
        .await
        .unwrap();
        let key = TicketKey {
            contact_id: contact.id,
            channel_id: channel.id,
            company_id: 1,
        };
        (db, dir, key)
    }

    fn new_ticket(key: TicketKey, status: TicketStatus) -> NewTicket {
        NewTicket {
            key,
            queue_id: None,
            user_id: None,
            status,
            is_bot: false,
            unread_messages: 1,
            last_message: Some("oi".into()),
        }
    }

    #[tokio::test]
    async fn insert_and_find_active() {
        let (db, _dir, key) = setup_db().await;
        let ticket = insert_ticket(&db, &new_ticket(key, TicketStatus::Pending), T0)
            .await
            .unwrap();
        assert_eq!(ticket.status, TicketStatus::Pending);
        assert_eq!(ticket.created_at, T0);
        assert!(!ticket.uuid.is_empty());

        let found = find_active_ticket(&db, &key).await.unwrap().unwrap();
        assert_eq!(found.id, ticket.id);
    }

    #[tokio::test]
    async fn second_active_ticket_is_conflict() {
        let (db, _dir, key) = setup_db().await;
        insert_ticket(&db, &new_ticket(key, TicketStatus::Pending), T0)
            .await
            .unwrap();
        let err = insert_ticket(&db, &new_ticket(key, TicketStatus::Bot), T0)
            .await
            .unwrap_err();
        assert!(matches!(err, TicketflowError::Conflict { .. }), "got {err}");
    }

    #[tokio::test]
    async fn closed_ticket_frees_the_key() {
        let (db, _dir, key) = setup_db().await;
        let first = insert_ticket(&db, &new_ticket(key, TicketStatus::Pending), T0)
            .await
            .unwrap();
        assert!(close_ticket(&db, first.id, T1).await.unwrap());
        assert!(!close_ticket(&db, first.id, T1).await.unwrap(), "close is idempotent");
        insert_ticket(&db, &new_ticket(key, TicketStatus::Pending), T1)
            .await
            .unwrap();
        assert_eq!(list_tickets_for_key(&db, &key).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn cursor_writes_skip_closed_tickets() {
        let (db, _dir, key) = setup_db().await;
        let ticket = insert_ticket(&db, &new_ticket(key, TicketStatus::Bot), T0)
            .await
            .unwrap();
        let cursor = FlowCursor {
            last_flow_id: Some("menu".into()),
            flow_active: true,
            flow_session_hash: Some("h".into()),
            flow_stopped_by: Some(1),
        };
        assert!(save_flow_cursor(&db, ticket.id, &cursor, T0).await.unwrap());

        close_ticket(&db, ticket.id, T1).await.unwrap();
        assert!(!save_flow_cursor(&db, ticket.id, &cursor, T1).await.unwrap());

        let closed = get_ticket(&db, ticket.id).await.unwrap().unwrap();
        assert_eq!(closed.status, TicketStatus::Closed);
        assert!(!closed.flow_active);
        assert!(closed.last_flow_id.is_none());
    }

    #[tokio::test]
    async fn active_cursor_rejected_for_human_owned_ticket() {
        let (db, _dir, key) = setup_db().await;
        let ticket = insert_ticket(&db, &new_ticket(key, TicketStatus::Bot), T0)
            .await
            .unwrap();
        assert!(assign_user(&db, ticket.id, 7, T0).await.unwrap());
        let cursor = FlowCursor {
            last_flow_id: Some("n1".into()),
            flow_active: true,
            flow_session_hash: Some("h".into()),
            flow_stopped_by: Some(1),
        };
        assert!(!save_flow_cursor(&db, ticket.id, &cursor, T1).await.unwrap());
        let open = get_ticket(&db, ticket.id).await.unwrap().unwrap();
        assert_eq!(open.status, TicketStatus::Open);
        assert_eq!(open.user_id, Some(7));
    }

    #[tokio::test]
    async fn exit_flow_returns_bot_ticket_to_pending() {
        let (db, _dir, key) = setup_db().await;
        let ticket = insert_ticket(&db, &new_ticket(key, TicketStatus::Bot), T0)
            .await
            .unwrap();
        let cursor = FlowCursor {
            last_flow_id: Some("n1".into()),
            flow_active: true,
            flow_session_hash: Some("h".into()),
            flow_stopped_by: Some(1),
        };
        save_flow_cursor(&db, ticket.id, &cursor, T0).await.unwrap();
        assert!(exit_flow(&db, ticket.id, T1).await.unwrap());

        let after = get_ticket(&db, ticket.id).await.unwrap().unwrap();
        assert_eq!(after.status, TicketStatus::Pending);
        assert!(!after.flow_active);
        assert!(!after.is_bot);
        assert_eq!(after.flow_stopped_by, Some(1));
    }

    #[tokio::test]
    async fn reopen_recent_closed_ticket() {
        let (db, _dir, key) = setup_db().await;
        let ticket = insert_ticket(&db, &new_ticket(key, TicketStatus::Pending), T0)
            .await
            .unwrap();
        close_ticket(&db, ticket.id, T1).await.unwrap();

        let recent = find_recent_closed_ticket(&db, &key, T0).await.unwrap();
        assert_eq!(recent.map(|t| t.id), Some(ticket.id));
        assert!(
            find_recent_closed_ticket(&db, &key, "2026-01-01T11:00:00.000Z")
                .await
                .unwrap()
                .is_none()
        );

        assert!(reopen_ticket(&db, ticket.id, 2, T1).await.unwrap());
        let reopened = get_ticket(&db, ticket.id).await.unwrap().unwrap();
        assert_eq!(reopened.status, TicketStatus::Pending);
        assert_eq!(reopened.unread_messages, 2);
    }

    #[tokio::test]
    async fn reopen_conflicts_with_newer_active_ticket() {
        let (db, _dir, key) = setup_db().await;
        let old = insert_ticket(&db, &new_ticket(key, TicketStatus::Pending), T0)
            .await
            .unwrap();
        close_ticket(&db, old.id, T0).await.unwrap();
        insert_ticket(&db, &new_ticket(key, TicketStatus::Pending), T1)
            .await
            .unwrap();
        let err = reopen_ticket(&db, old.id, 1, T1).await.unwrap_err();
        assert!(matches!(err, TicketflowError::Conflict { .. }));
    }
}
