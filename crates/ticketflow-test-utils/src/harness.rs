// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` opens a temp SQLite store, seeds one contact, one channel and
//! a default queue (optionally carrying an automation), and exposes the mock
//! ports the engine is assembled from.

use std::sync::Arc;

use ticketflow_config::TicketflowConfig;
use ticketflow_config::model::StorageConfig;
use ticketflow_core::types::{Channel, Contact, FlowRecord, Queue};
use ticketflow_core::{StorageAdapter, TicketflowError};
use ticketflow_storage::SqliteStorage;

use crate::clock::ManualClock;
use crate::mock_media::MockMedia;
use crate::mock_messaging::{MockMessaging, MockMessagingFactory};

pub const COMPANY_ID: i64 = 1;

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    flow_definition: Option<String>,
    reopen_window_minutes: Option<i64>,
    lgpd_required: bool,
    groups_as_tickets: bool,
    group_contact: bool,
    contact_number: String,
    config: TicketflowConfig,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            flow_definition: None,
            reopen_window_minutes: None,
            lgpd_required: false,
            groups_as_tickets: false,
            group_contact: false,
            contact_number: "555111".to_string(),
            config: TicketflowConfig::default(),
        }
    }

    /// Attach an automation with this JSON definition to the default queue.
    pub fn with_flow(mut self, definition: impl Into<String>) -> Self {
        self.flow_definition = Some(definition.into());
        self
    }

    pub fn with_reopen_window(mut self, minutes: i64) -> Self {
        self.reopen_window_minutes = Some(minutes);
        self
    }

    pub fn with_lgpd_required(mut self) -> Self {
        self.lgpd_required = true;
        self
    }

    /// Seed the contact as a group chat.
    pub fn with_group_contact(mut self) -> Self {
        self.group_contact = true;
        self
    }

    pub fn with_groups_as_tickets(mut self) -> Self {
        self.groups_as_tickets = true;
        self
    }

    pub fn with_contact_number(mut self, number: impl Into<String>) -> Self {
        self.contact_number = number.into();
        self
    }

    pub fn with_config(mut self, config: TicketflowConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the harness, creating and seeding the temp database.
    pub async fn build(self) -> Result<TestHarness, TicketflowError> {
        let temp_dir =
            tempfile::TempDir::new().map_err(|e| TicketflowError::Storage { source: e.into() })?;
        let db_path = temp_dir.path().join("test.db");
        let db_path = db_path.to_string_lossy().to_string();

        let mut config = self.config;
        config.storage = StorageConfig {
            database_path: db_path,
            wal_mode: true,
        };

        let storage = Arc::new(SqliteStorage::new(config.storage.clone()));
        storage.initialize().await?;

        let contact = storage
            .insert_contact(&Contact {
                id: 0,
                company_id: COMPANY_ID,
                number: self.contact_number,
                name: "Ana".to_string(),
                is_group: self.group_contact,
                lgpd_accepted_at: None,
            })
            .await?;

        let channel = storage
            .insert_channel(&Channel {
                id: 0,
                company_id: COMPANY_ID,
                name: "whatsapp-main".to_string(),
                reopen_window_minutes: self.reopen_window_minutes,
                groups_as_tickets: self.groups_as_tickets,
                lgpd_required: self.lgpd_required,
            })
            .await?;

        let flow = match self.flow_definition {
            Some(definition) => Some(insert_flow(storage.as_ref(), "welcome", &definition).await?),
            None => None,
        };

        let queue = storage
            .insert_queue(&Queue {
                id: 0,
                company_id: COMPANY_ID,
                name: "Support".to_string(),
                flow_id: flow.as_ref().map(|f| f.id),
            })
            .await?;
        storage.attach_queue(channel.id, queue.id, 0).await?;

        let messaging = Arc::new(MockMessaging::new());
        let factory = Arc::new(MockMessagingFactory::new(messaging.clone()));

        Ok(TestHarness {
            storage,
            messaging,
            factory,
            media: Arc::new(MockMedia::default()),
            clock: Arc::new(ManualClock::fixed()),
            config,
            contact,
            channel,
            queue,
            flow,
            _temp_dir: temp_dir,
        })
    }
}

async fn insert_flow(
    storage: &dyn StorageAdapter,
    name: &str,
    definition: &str,
) -> Result<FlowRecord, TicketflowError> {
    storage
        .insert_flow(&FlowRecord {
            id: 0,
            company_id: COMPANY_ID,
            name: name.to_string(),
            definition: definition.to_string(),
            active: true,
        })
        .await
}

/// A seeded temp store plus mock ports.
pub struct TestHarness {
    pub storage: Arc<SqliteStorage>,
    pub messaging: Arc<MockMessaging>,
    pub factory: Arc<MockMessagingFactory>,
    pub media: Arc<MockMedia>,
    pub clock: Arc<ManualClock>,
    pub config: TicketflowConfig,
    pub contact: Contact,
    pub channel: Channel,
    /// The channel's default queue.
    pub queue: Queue,
    /// Automation attached to the default queue, if one was configured.
    pub flow: Option<FlowRecord>,
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// A queue that is not attached to the channel, optionally with its own
    /// automation.
    pub async fn add_queue(
        &self,
        name: &str,
        flow_definition: Option<&str>,
    ) -> Result<Queue, TicketflowError> {
        let flow_id = match flow_definition {
            Some(definition) => Some(insert_flow(self.storage.as_ref(), name, definition).await?.id),
            None => None,
        };
        self.storage
            .insert_queue(&Queue {
                id: 0,
                company_id: COMPANY_ID,
                name: name.to_string(),
                flow_id,
            })
            .await
    }

    pub async fn add_contact(&self, number: &str, is_group: bool) -> Result<Contact, TicketflowError> {
        self.storage
            .insert_contact(&Contact {
                id: 0,
                company_id: COMPANY_ID,
                number: number.to_string(),
                name: number.to_string(),
                is_group,
                lgpd_accepted_at: None,
            })
            .await
    }

    pub fn storage_dyn(&self) -> Arc<dyn StorageAdapter> {
        self.storage.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn harness_seeds_default_queue_with_flow() {
        let harness = TestHarness::builder()
            .with_flow(r#"{"nodes":[{"id":"end","type":"terminal"}],"edges":[]}"#)
            .build()
            .await
            .unwrap();

        let queues = harness.storage.channel_queues(harness.channel.id).await.unwrap();
        assert_eq!(queues.len(), 1);
        assert_eq!(queues[0].flow_id, harness.flow.as_ref().map(|f| f.id));
        assert_eq!(harness.contact.number, "555111");
    }

    #[tokio::test]
    async fn extra_queue_is_not_attached() {
        let harness = TestHarness::builder().build().await.unwrap();
        let extra = harness.add_queue("Billing", None).await.unwrap();
        let queues = harness.storage.channel_queues(harness.channel.id).await.unwrap();
        assert!(queues.iter().all(|q| q.id != extra.id));
        assert!(harness.queue.flow_id.is_none());
    }
}
