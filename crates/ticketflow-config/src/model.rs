// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model.
//!
//! All structs use `#[serde(deny_unknown_fields)]` so a misspelled key is a
//! startup error with a suggestion instead of a silently ignored setting.

use serde::{Deserialize, Serialize};

/// Top-level ticketflow configuration. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TicketflowConfig {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    /// Flow interpreter timing.
    #[serde(default)]
    pub flow: FlowConfig,

    /// Data-protection consent gate.
    #[serde(default)]
    pub lgpd: LgpdConfig,

    #[serde(default)]
    pub media: MediaConfig,
}

/// Engine identity and concurrency settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Name used in log lines.
    #[serde(default = "default_engine_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Attempts at resolving a ticket when a concurrent close races the write.
    #[serde(default = "default_max_resolve_attempts")]
    pub max_resolve_attempts: u32,

    /// Idle per-key locks are pruned once the lock table grows past this size.
    #[serde(default = "default_lock_prune_threshold")]
    pub lock_prune_threshold: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: default_engine_name(),
            log_level: default_log_level(),
            max_resolve_attempts: default_max_resolve_attempts(),
            lock_prune_threshold: default_lock_prune_threshold(),
        }
    }
}

fn default_engine_name() -> String {
    "ticketflow".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_resolve_attempts() -> u32 {
    3
}

fn default_lock_prune_threshold() -> usize {
    1024
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL mode.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("ticketflow").join("ticketflow.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("ticketflow.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

/// Flow interpreter settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FlowConfig {
    /// Delay between switching the typing indicator on and sending.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Show a typing indicator around outbound messages.
    #[serde(default = "default_typing_indicator")]
    pub typing_indicator: bool,

    /// Longest wait an `interval` node or element may request.
    #[serde(default = "default_max_interval_secs")]
    pub max_interval_secs: u64,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: default_settle_delay_ms(),
            typing_indicator: default_typing_indicator(),
            max_interval_secs: default_max_interval_secs(),
        }
    }
}

fn default_settle_delay_ms() -> u64 {
    1000
}

fn default_typing_indicator() -> bool {
    true
}

fn default_max_interval_secs() -> u64 {
    3600
}

/// Data-protection consent settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LgpdConfig {
    /// Message sent while consent is pending.
    #[serde(default = "default_consent_message")]
    pub consent_message: String,

    #[serde(default = "default_accept_key")]
    pub accept_key: String,

    #[serde(default = "default_decline_key")]
    pub decline_key: String,
}

impl Default for LgpdConfig {
    fn default() -> Self {
        Self {
            consent_message: default_consent_message(),
            accept_key: default_accept_key(),
            decline_key: default_decline_key(),
        }
    }
}

fn default_consent_message() -> String {
    "We store your messages to serve you. Reply 1 to accept or 2 to decline.".to_string()
}

fn default_accept_key() -> String {
    "1".to_string()
}

fn default_decline_key() -> String {
    "2".to_string()
}

/// Media store settings used by the bundled console adapter.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MediaConfig {
    /// Base URL that company-relative media paths are resolved against.
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            public_base_url: default_public_base_url(),
        }
    }
}

fn default_public_base_url() -> String {
    "http://localhost:8080/public".to_string()
}
