// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Media store and transcoding port.

use async_trait::async_trait;

use crate::error::TicketflowError;
use crate::traits::adapter::PluginAdapter;
use crate::types::CompanyId;

/// Resolves stored media to deliverable URLs and normalizes audio.
#[async_trait]
pub trait MediaPort: PluginAdapter {
    /// Turns a company-relative media path into an absolute URL.
    async fn resolve_media_url(
        &self,
        company_id: CompanyId,
        relative_path: &str,
    ) -> Result<String, TicketflowError>;

    /// Converts an audio file into a format every channel can play and
    /// returns the path of the converted file.
    async fn transcode_audio(&self, path: &str) -> Result<String, TicketflowError>;
}
