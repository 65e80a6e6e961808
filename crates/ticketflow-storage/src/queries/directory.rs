// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Contacts, channels, queues and flow definitions.
//!
//! Inserts accept an `id` of `0` to let SQLite assign one.

use rusqlite::{OptionalExtension, params};
use ticketflow_core::TicketflowError;
use ticketflow_core::types::{
    Channel, ChannelId, Contact, ContactId, FlowId, FlowRecord, Queue, QueueId,
};

use crate::database::{Database, map_tr_err, map_unique_err};

// Queue automation is only visible while the referenced flow is active.
const QUEUE_SELECT: &str = "SELECT q.id, q.company_id, q.name,
        CASE WHEN f.active = 1 THEN q.flow_id END
     FROM queues q LEFT JOIN flows f ON f.id = q.flow_id";

fn queue_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Queue> {
    Ok(Queue {
        id: row.get(0)?,
        company_id: row.get(1)?,
        name: row.get(2)?,
        flow_id: row.get(3)?,
    })
}

pub async fn insert_contact(db: &Database, contact: &Contact) -> Result<Contact, TicketflowError> {
    let contact = contact.clone();
    let number = contact.number.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO contacts (id, company_id, number, name, is_group, lgpd_accepted_at)
                 VALUES (NULLIF(?1, 0), ?2, ?3, ?4, ?5, ?6)",
                params![
                    contact.id,
                    contact.company_id,
                    contact.number,
                    contact.name,
                    contact.is_group,
                    contact.lgpd_accepted_at,
                ],
            )?;
            Ok(Contact {
                id: conn.last_insert_rowid(),
                ..contact
            })
        })
        .await
        .map_err(|e| map_unique_err(e, &format!("contact {number} already exists")))
}

pub async fn get_contact(db: &Database, id: ContactId) -> Result<Option<Contact>, TicketflowError> {
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT id, company_id, number, name, is_group, lgpd_accepted_at
                 FROM contacts WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Contact {
                        id: row.get(0)?,
                        company_id: row.get(1)?,
                        number: row.get(2)?,
                        name: row.get(3)?,
                        is_group: row.get(4)?,
                        lgpd_accepted_at: row.get(5)?,
                    })
                },
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Stamp data-protection consent on a contact.
pub async fn record_lgpd_consent(
    db: &Database,
    id: ContactId,
    at: &str,
) -> Result<(), TicketflowError> {
    let at = at.to_string();
    let changed = db
        .connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE contacts SET lgpd_accepted_at = ?2 WHERE id = ?1",
                params![id, at],
            )
        })
        .await
        .map_err(map_tr_err)?;
    if changed == 0 {
        return Err(TicketflowError::not_found("contact", id));
    }
    Ok(())
}

pub async fn insert_channel(db: &Database, channel: &Channel) -> Result<Channel, TicketflowError> {
    let channel = channel.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO channels (id, company_id, name, reopen_window_minutes,
                     groups_as_tickets, lgpd_required)
                 VALUES (NULLIF(?1, 0), ?2, ?3, ?4, ?5, ?6)",
                params![
                    channel.id,
                    channel.company_id,
                    channel.name,
                    channel.reopen_window_minutes,
                    channel.groups_as_tickets,
                    channel.lgpd_required,
                ],
            )?;
            Ok(Channel {
                id: conn.last_insert_rowid(),
                ..channel
            })
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_channel(db: &Database, id: ChannelId) -> Result<Option<Channel>, TicketflowError> {
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT id, company_id, name, reopen_window_minutes, groups_as_tickets, lgpd_required
                 FROM channels WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Channel {
                        id: row.get(0)?,
                        company_id: row.get(1)?,
                        name: row.get(2)?,
                        reopen_window_minutes: row.get(3)?,
                        groups_as_tickets: row.get(4)?,
                        lgpd_required: row.get(5)?,
                    })
                },
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Insert a queue. The returned row reflects the stored flow visibility.
pub async fn insert_queue(db: &Database, queue: &Queue) -> Result<Queue, TicketflowError> {
    let queue = queue.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO queues (id, company_id, name, flow_id)
                 VALUES (NULLIF(?1, 0), ?2, ?3, ?4)",
                params![queue.id, queue.company_id, queue.name, queue.flow_id],
            )?;
            let id = conn.last_insert_rowid();
            conn.query_row(
                &format!("{QUEUE_SELECT} WHERE q.id = ?1"),
                params![id],
                queue_from_row,
            )
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_queue(db: &Database, id: QueueId) -> Result<Option<Queue>, TicketflowError> {
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("{QUEUE_SELECT} WHERE q.id = ?1"),
                params![id],
                queue_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn attach_queue(
    db: &Database,
    channel_id: ChannelId,
    queue_id: QueueId,
    position: i64,
) -> Result<(), TicketflowError> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO channel_queues (channel_id, queue_id, position) VALUES (?1, ?2, ?3)",
                params![channel_id, queue_id, position],
            )?;
            Ok(())
        })
        .await
        .map_err(|e| {
            map_unique_err(
                e,
                &format!("queue {queue_id} is already attached to channel {channel_id}"),
            )
        })
}

/// The channel's queues in routing order.
pub async fn channel_queues(
    db: &Database,
    channel_id: ChannelId,
) -> Result<Vec<Queue>, TicketflowError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "{QUEUE_SELECT} JOIN channel_queues cq ON cq.queue_id = q.id
                 WHERE cq.channel_id = ?1
                 ORDER BY cq.position, q.id"
            ))?;
            let rows = stmt.query_map(params![channel_id], queue_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn insert_flow(db: &Database, flow: &FlowRecord) -> Result<FlowRecord, TicketflowError> {
    let flow = flow.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO flows (id, company_id, name, definition, active)
                 VALUES (NULLIF(?1, 0), ?2, ?3, ?4, ?5)",
                params![flow.id, flow.company_id, flow.name, flow.definition, flow.active],
            )?;
            Ok(FlowRecord {
                id: conn.last_insert_rowid(),
                ..flow
            })
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_flow(db: &Database, id: FlowId) -> Result<Option<FlowRecord>, TicketflowError> {
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT id, company_id, name, definition, active FROM flows WHERE id = ?1",
                params![id],
                |row| {
                    Ok(FlowRecord {
                        id: row.get(0)?,
                        company_id: row.get(1)?,
                        name: row.get(2)?,
                        definition: row.get(3)?,
                        active: row.get(4)?,
                    })
                },
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn update_flow_definition(
    db: &Database,
    id: FlowId,
    definition: &str,
) -> Result<(), TicketflowError> {
    let definition = definition.to_string();
    let changed = db
        .connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE flows SET definition = ?2 WHERE id = ?1",
                params![id, definition],
            )
        })
        .await
        .map_err(map_tr_err)?;
    if changed == 0 {
        return Err(TicketflowError::not_found("flow", id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn flow(active: bool) -> FlowRecord {
        FlowRecord {
            id: 0,
            company_id: 1,
            name: "welcome".into(),
            definition: r#"{"nodes":[{"id":"t","type":"terminal"}],"edges":[]}"#.into(),
            active,
        }
    }

    fn queue(name: &str, flow_id: Option<FlowId>) -> Queue {
        Queue {
            id: 0,
            company_id: 1,
            name: name.into(),
            flow_id,
        }
    }

    #[tokio::test]
    async fn contact_roundtrip_and_consent() {
        let (db, _dir) = setup_db().await;
        let contact = insert_contact(
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
        assert!(contact.id > 0);

        record_lgpd_consent(&db, contact.id, "2026-01-01T00:00:00.000Z")
            .await
            .unwrap();
        let stored = get_contact(&db, contact.id).await.unwrap().unwrap();
        assert_eq!(
            stored.lgpd_accepted_at.as_deref(),
            Some("2026-01-01T00:00:00.000Z")
        );

        let err = record_lgpd_consent(&db, 999, "x").await.unwrap_err();
        assert!(matches!(err, TicketflowError::NotFound { entity: "contact", .. }));
    }

    #[tokio::test]
    async fn inactive_flow_is_hidden_from_queue() {
        let (db, _dir) = setup_db().await;
        let active = insert_flow(&db, &flow(true)).await.unwrap();
        let inactive = insert_flow(&db, &flow(false)).await.unwrap();

        let with_bot = insert_queue(&db, &queue("sales", Some(active.id))).await.unwrap();
        let dormant = insert_queue(&db, &queue("support", Some(inactive.id))).await.unwrap();

        assert_eq!(with_bot.flow_id, Some(active.id));
        assert_eq!(dormant.flow_id, None);
        assert_eq!(get_queue(&db, dormant.id).await.unwrap().unwrap().flow_id, None);
    }

    #[tokio::test]
    async fn channel_queues_follow_position() {
        let (db, _dir) = setup_db().await;
        let channel = insert_channel(
            &db,
            &Channel {
                id: 0,
                company_id: 1,
                name: "main".into(),
                reopen_window_minutes: Some(30),
                groups_as_tickets: false,
                lgpd_required: false,
            },
        )
        .await
        .unwrap();
        let a = insert_queue(&db, &queue("a", None)).await.unwrap();
        let b = insert_queue(&db, &queue("b", None)).await.unwrap();
        attach_queue(&db, channel.id, a.id, 2).await.unwrap();
        attach_queue(&db, channel.id, b.id, 1).await.unwrap();

        let ordered: Vec<_> = channel_queues(&db, channel.id)
            .await
            .unwrap()
            .into_iter()
            .map(|q| q.name)
            .collect();
        assert_eq!(ordered, vec!["b", "a"]);

        let dup = attach_queue(&db, channel.id, a.id, 3).await.unwrap_err();
        assert!(matches!(dup, TicketflowError::Conflict { .. }));
    }

    #[tokio::test]
    async fn flow_definition_update() {
        let (db, _dir) = setup_db().await;
        let stored = insert_flow(&db, &flow(true)).await.unwrap();
        update_flow_definition(&db, stored.id, "{}").await.unwrap();
        assert_eq!(get_flow(&db, stored.id).await.unwrap().unwrap().definition, "{}");
        assert!(update_flow_definition(&db, 404, "{}").await.is_err());
    }
}
