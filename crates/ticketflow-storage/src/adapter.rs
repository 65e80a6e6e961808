// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the StorageAdapter trait.

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use ticketflow_config::model::StorageConfig;
use ticketflow_core::types::{
    Channel, ChannelId, Contact, ContactId, FlowCursor, FlowId, FlowLogEntry, FlowRecord,
    NewFlowLogEntry, NewTicket, Queue, QueueId, Ticket, TicketId, TicketKey, UserId,
};
use ticketflow_core::{AdapterType, HealthStatus, PluginAdapter, StorageAdapter, TicketflowError};

use crate::database::{Database, map_tr_err};
use crate::queries::{directory, flow_log, tickets};

/// SQLite-backed storage adapter.
///
/// The database is opened by [`StorageAdapter::initialize`]; every other
/// call fails until then.
pub struct SqliteStorage {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStorage {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    fn db(&self) -> Result<&Database, TicketflowError> {
        self.db.get().ok_or_else(|| TicketflowError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }

    async fn checkpoint(&self) -> Result<(), TicketflowError> {
        if let Some(db) = self.db.get() {
            db.connection()
                .call(|conn| -> Result<(), rusqlite::Error> {
                    conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                    Ok(())
                })
                .await
                .map_err(map_tr_err)?;
            debug!("WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl PluginAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, TicketflowError> {
        self.db()?
            .connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), TicketflowError> {
        self.checkpoint().await
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorage {
    async fn initialize(&self) -> Result<(), TicketflowError> {
        let db = Database::open_with(&self.config.database_path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| TicketflowError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), TicketflowError> {
        self.db()?;
        self.checkpoint().await
    }

    async fn insert_ticket(&self, ticket: &NewTicket, now: &str) -> Result<Ticket, TicketflowError> {
        tickets::insert_ticket(self.db()?, ticket, now).await
    }

    async fn get_ticket(&self, id: TicketId) -> Result<Option<Ticket>, TicketflowError> {
        tickets::get_ticket(self.db()?, id).await
    }

    async fn find_active_ticket(&self, key: &TicketKey) -> Result<Option<Ticket>, TicketflowError> {
        tickets::find_active_ticket(self.db()?, key).await
    }

    async fn find_recent_closed_ticket(
        &self,
        key: &TicketKey,
        since: &str,
    ) -> Result<Option<Ticket>, TicketflowError> {
        tickets::find_recent_closed_ticket(self.db()?, key, since).await
    }

    async fn list_tickets_for_key(&self, key: &TicketKey) -> Result<Vec<Ticket>, TicketflowError> {
        tickets::list_tickets_for_key(self.db()?, key).await
    }

    async fn update_ticket(&self, ticket: &Ticket, now: &str) -> Result<bool, TicketflowError> {
        tickets::update_ticket(self.db()?, ticket, now).await
    }

    async fn reopen_ticket(
        &self,
        id: TicketId,
        unread_delta: i64,
        now: &str,
    ) -> Result<bool, TicketflowError> {
        tickets::reopen_ticket(self.db()?, id, unread_delta, now).await
    }

    async fn save_flow_cursor(
        &self,
        id: TicketId,
        cursor: &FlowCursor,
        now: &str,
    ) -> Result<bool, TicketflowError> {
        tickets::save_flow_cursor(self.db()?, id, cursor, now).await
    }

    async fn exit_flow(&self, id: TicketId, now: &str) -> Result<bool, TicketflowError> {
        tickets::exit_flow(self.db()?, id, now).await
    }

    async fn set_ticket_queue(
        &self,
        id: TicketId,
        queue_id: QueueId,
        now: &str,
    ) -> Result<bool, TicketflowError> {
        tickets::set_ticket_queue(self.db()?, id, queue_id, now).await
    }

    async fn close_ticket(&self, id: TicketId, now: &str) -> Result<bool, TicketflowError> {
        tickets::close_ticket(self.db()?, id, now).await
    }

    async fn insert_contact(&self, contact: &Contact) -> Result<Contact, TicketflowError> {
        directory::insert_contact(self.db()?, contact).await
    }

    async fn get_contact(&self, id: ContactId) -> Result<Option<Contact>, TicketflowError> {
        directory::get_contact(self.db()?, id).await
    }

    async fn record_lgpd_consent(&self, id: ContactId, at: &str) -> Result<(), TicketflowError> {
        directory::record_lgpd_consent(self.db()?, id, at).await
    }

    async fn insert_channel(&self, channel: &Channel) -> Result<Channel, TicketflowError> {
        directory::insert_channel(self.db()?, channel).await
    }

    async fn get_channel(&self, id: ChannelId) -> Result<Option<Channel>, TicketflowError> {
        directory::get_channel(self.db()?, id).await
    }

    async fn insert_queue(&self, queue: &Queue) -> Result<Queue, TicketflowError> {
        directory::insert_queue(self.db()?, queue).await
    }

    async fn get_queue(&self, id: QueueId) -> Result<Option<Queue>, TicketflowError> {
        directory::get_queue(self.db()?, id).await
    }

    async fn attach_queue(
        &self,
        channel_id: ChannelId,
        queue_id: QueueId,
        position: i64,
    ) -> Result<(), TicketflowError> {
        directory::attach_queue(self.db()?, channel_id, queue_id, position).await
    }

    async fn channel_queues(&self, channel_id: ChannelId) -> Result<Vec<Queue>, TicketflowError> {
        directory::channel_queues(self.db()?, channel_id).await
    }

    async fn insert_flow(&self, flow: &FlowRecord) -> Result<FlowRecord, TicketflowError> {
        directory::insert_flow(self.db()?, flow).await
    }

    async fn get_flow(&self, id: FlowId) -> Result<Option<FlowRecord>, TicketflowError> {
        directory::get_flow(self.db()?, id).await
    }

    async fn update_flow_definition(
        &self,
        id: FlowId,
        definition: &str,
    ) -> Result<(), TicketflowError> {
        directory::update_flow_definition(self.db()?, id, definition).await
    }

    async fn append_flow_log(&self, entry: &NewFlowLogEntry) -> Result<i64, TicketflowError> {
        flow_log::append_flow_log(self.db()?, entry).await
    }

    async fn list_flow_log(&self, ticket_id: TicketId) -> Result<Vec<FlowLogEntry>, TicketflowError> {
        flow_log::list_flow_log(self.db()?, ticket_id).await
    }

    async fn assign_user(
        &self,
        id: TicketId,
        user_id: UserId,
        now: &str,
    ) -> Result<bool, TicketflowError> {
        tickets::assign_user(self.db()?, id, user_id, now).await
    }
}
