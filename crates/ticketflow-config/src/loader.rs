// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Figment-based loader.
//!
//! Merge order, later wins: compiled defaults, `/etc/ticketflow/ticketflow.toml`,
//! `~/.config/ticketflow/ticketflow.toml`, `./ticketflow.toml`, `TICKETFLOW_*`
//! environment variables.

#![allow(clippy::result_large_err)] // figment::Error is external

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::TicketflowConfig;

/// Sections that environment variables may address.
const SECTIONS: &[&str] = &["engine", "storage", "flow", "lgpd", "media"];

pub const SYSTEM_CONFIG_PATH: &str = "/etc/ticketflow/ticketflow.toml";
pub const LOCAL_CONFIG_PATH: &str = "ticketflow.toml";

/// The user-level config file, if the platform has a config directory.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("ticketflow").join("ticketflow.toml"))
}

/// Build the full layered figment without extracting it.
pub fn build_figment() -> Figment {
    let mut figment = Figment::new()
        .merge(Serialized::defaults(TicketflowConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG_PATH));
    if let Some(user) = user_config_path() {
        figment = figment.merge(Toml::file(user));
    }
    figment
        .merge(Toml::file(LOCAL_CONFIG_PATH))
        .merge(env_provider())
}

/// Load configuration from the standard hierarchy with env var overrides.
pub fn load_config() -> Result<TicketflowConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no files, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<TicketflowConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(TicketflowConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from an explicit file with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<TicketflowConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(TicketflowConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// `TICKETFLOW_FLOW_SETTLE_DELAY_MS` maps to `flow.settle_delay_ms`.
///
/// Only the first underscore after a known section name becomes a dot; key
/// names keep their own underscores.
fn env_provider() -> Env {
    Env::prefixed("TICKETFLOW_").map(|key| {
        let key = key.as_str();
        for section in SECTIONS {
            if let Some(rest) = key
                .strip_prefix(section)
                .and_then(|rest| rest.strip_prefix('_'))
            {
                return format!("{section}.{rest}").into();
            }
        }
        key.to_string().into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_overrides_map_to_sections() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("TICKETFLOW_FLOW_SETTLE_DELAY_MS", "25");
            jail.set_env("TICKETFLOW_STORAGE_DATABASE_PATH", "/tmp/tf.db");
            let config: TicketflowConfig = Figment::new()
                .merge(Serialized::defaults(TicketflowConfig::default()))
                .merge(env_provider())
                .extract()?;
            assert_eq!(config.flow.settle_delay_ms, 25);
            assert_eq!(config.storage.database_path, "/tmp/tf.db");
            Ok(())
        });
    }

    #[test]
    fn local_file_overrides_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "custom.toml",
                r#"
[lgpd]
accept_key = "sim"
"#,
            )?;
            let config = load_config_from_path(Path::new("custom.toml"))?;
            assert_eq!(config.lgpd.accept_key, "sim");
            assert_eq!(config.lgpd.decline_key, "2");
            Ok(())
        });
    }
}
