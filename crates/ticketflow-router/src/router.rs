// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage-backed loading of routing tables.

use std::sync::Arc;

use ticketflow_core::{ChannelId, Queue, QueueId, StorageAdapter, TicketflowError};
use tracing::debug;

use crate::table::RoutingTable;

/// Builds [`RoutingTable`]s from the store.
#[derive(Clone)]
pub struct QueueRouter {
    storage: Arc<dyn StorageAdapter>,
}

impl QueueRouter {
    pub fn new(storage: Arc<dyn StorageAdapter>) -> Self {
        Self { storage }
    }

    /// The routing table of a channel, in the channel's queue order.
    pub async fn for_channel(&self, channel_id: ChannelId) -> Result<RoutingTable, TicketflowError> {
        let queues = self.storage.channel_queues(channel_id).await?;
        debug!(channel_id, queues = queues.len(), "loaded routing table");
        Ok(RoutingTable::new(channel_id, queues))
    }

    /// Make sure `queue_id` is present in `table`, loading it if needed.
    pub async fn include_queue(
        &self,
        table: &mut RoutingTable,
        queue_id: QueueId,
    ) -> Result<(), TicketflowError> {
        if table.queue(queue_id).is_none() {
            let queue = self.queue(queue_id).await?;
            table.insert(queue);
        }
        Ok(())
    }

    /// Load a queue by id. Missing queues are `NotFound`.
    pub async fn queue(&self, queue_id: QueueId) -> Result<Queue, TicketflowError> {
        self.storage
            .get_queue(queue_id)
            .await?
            .ok_or_else(|| TicketflowError::not_found("queue", queue_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use ticketflow_config::model::StorageConfig;
    use ticketflow_core::{Channel, FlowRecord};
    use ticketflow_storage::SqliteStorage;

    #[tokio::test]
    async fn loads_ordered_table_and_includes_foreign_queue() {
        let dir = tempdir().unwrap();
        let storage = Arc::new(SqliteStorage::new(StorageConfig {
            database_path: dir.path().join("r.db").to_string_lossy().to_string(),
            wal_mode: true,
        }));
        storage.initialize().await.unwrap();

        let channel = storage
            .insert_channel(&Channel {
                id: 0,
                company_id: 1,
                name: "main".into(),
                reopen_window_minutes: None,
                groups_as_tickets: false,
                lgpd_required: false,
            })
            .await
            .unwrap();
        let flow = storage
            .insert_flow(&FlowRecord {
                id: 0,
                company_id: 1,
                name: "f".into(),
                definition: "{}".into(),
                active: true,
            })
            .await
            .unwrap();
        let attached = storage
            .insert_queue(&Queue {
                id: 0,
                company_id: 1,
                name: "sales".into(),
                flow_id: Some(flow.id),
            })
            .await
            .unwrap();
        let foreign = storage
            .insert_queue(&Queue {
                id: 0,
                company_id: 1,
                name: "billing".into(),
                flow_id: None,
            })
            .await
            .unwrap();
        storage.attach_queue(channel.id, attached.id, 0).await.unwrap();

        let router = QueueRouter::new(storage);
        let mut table = router.for_channel(channel.id).await.unwrap();
        assert_eq!(table.default_queue(), Some(attached.id));
        assert!(table.has_automation(attached.id));

        router.include_queue(&mut table, foreign.id).await.unwrap();
        assert!(table.queue(foreign.id).is_some());

        let err = router.include_queue(&mut table, 999).await.unwrap_err();
        assert!(matches!(err, TicketflowError::NotFound { entity: "queue", .. }));
    }
}
