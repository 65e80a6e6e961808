// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation. Collects every failure instead of
//! stopping at the first one.

use crate::diagnostic::ConfigError;
use crate::model::TicketflowConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

pub fn validate_config(config: &TicketflowConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    if config.storage.database_path.trim().is_empty() {
        fail("storage.database_path must not be empty".to_string());
    }

    if !LOG_LEVELS.contains(&config.engine.log_level.as_str()) {
        fail(format!(
            "engine.log_level `{}` must be one of {}",
            config.engine.log_level,
            LOG_LEVELS.join(", ")
        ));
    }

    if config.engine.max_resolve_attempts == 0 {
        fail("engine.max_resolve_attempts must be at least 1".to_string());
    }

    if config.flow.max_interval_secs == 0 {
        fail("flow.max_interval_secs must be at least 1".to_string());
    }

    let accept = config.lgpd.accept_key.trim();
    let decline = config.lgpd.decline_key.trim();
    if accept.is_empty() || decline.is_empty() {
        fail("lgpd.accept_key and lgpd.decline_key must not be empty".to_string());
    } else if accept.eq_ignore_ascii_case(decline) {
        fail(format!(
            "lgpd.accept_key and lgpd.decline_key must differ, both are `{accept}`"
        ));
    }

    if !(config.media.public_base_url.starts_with("http://")
        || config.media.public_base_url.starts_with("https://"))
    {
        fail(format!(
            "media.public_base_url `{}` must be an http(s) URL",
            config.media.public_base_url
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
