// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Media port with predictable URLs and a call journal.

use async_trait::async_trait;
use tokio::sync::Mutex;

use ticketflow_core::types::{AdapterType, CompanyId, HealthStatus};
use ticketflow_core::{MediaPort, PluginAdapter, TicketflowError};

pub struct MockMedia {
    base_url: String,
    calls: Mutex<Vec<String>>,
}

impl MockMedia {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// `transcode:<path>` and `resolve:<path>` entries in call order.
    pub async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }
}

impl Default for MockMedia {
    fn default() -> Self {
        Self::new("http://media.test")
    }
}

#[async_trait]
impl PluginAdapter for MockMedia {
    fn name(&self) -> &str {
        "mock-media"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Media
    }

    async fn health_check(&self) -> Result<HealthStatus, TicketflowError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), TicketflowError> {
        Ok(())
    }
}

#[async_trait]
impl MediaPort for MockMedia {
    async fn resolve_media_url(
        &self,
        company_id: CompanyId,
        relative_path: &str,
    ) -> Result<String, TicketflowError> {
        self.calls.lock().await.push(format!("resolve:{relative_path}"));
        Ok(format!(
            "{}/company{company_id}/{}",
            self.base_url,
            relative_path.trim_start_matches('/')
        ))
    }

    async fn transcode_audio(&self, path: &str) -> Result<String, TicketflowError> {
        self.calls.lock().await.push(format!("transcode:{path}"));
        let stem = path.rsplit_once('.').map_or(path, |(stem, _)| stem);
        Ok(format!("{stem}.ogg"))
    }
}
