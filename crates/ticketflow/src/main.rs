// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ticketflow - helpdesk ticket lifecycle engine with flow automations.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod check_flow;
mod console;
mod doctor;
mod replay;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use ticketflow_config::TicketflowConfig;

/// Ticketflow - helpdesk ticket lifecycle engine with flow automations.
#[derive(Parser, Debug)]
#[command(name = "ticketflow", version, about, long_about = None)]
struct Cli {
    /// Load configuration from this file instead of the standard locations.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run diagnostic checks against configuration and database.
    Doctor {
        /// Also run integrity and resource checks.
        #[arg(long)]
        deep: bool,
        /// Disable colored output.
        #[arg(long)]
        plain: bool,
    },
    /// Parse and validate a flow definition file.
    CheckFlow {
        /// Path to the JSON flow definition.
        file: PathBuf,
    },
    /// Drive JSON-lines events through the engine with console adapters.
    Replay {
        /// Events file, or `-` for stdin.
        input: String,
        /// Seed the randomizer for reproducible runs.
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => ticketflow_config::load_and_validate_path(path),
        None => ticketflow_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            ticketflow_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Some(Commands::Doctor { deep, plain }) => {
            doctor::run_doctor(&config, cli.config.as_deref(), deep, plain).await
        }
        Some(Commands::CheckFlow { file }) => {
            check_flow::run_check_flow(&file, config.flow.max_interval_secs)
        }
        Some(Commands::Replay { input, seed }) => {
            init_tracing(&config);
            replay::run_replay(config, &input, seed).await
        }
        None => {
            println!("ticketflow: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

/// Initializes the tracing subscriber. `RUST_LOG` overrides the configured level.
fn init_tracing(config: &TicketflowConfig) {
    use tracing_subscriber::EnvFilter;

    let level = &config.engine.log_level;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("ticketflow={level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(not(target_env = "msvc"))]
    fn jemalloc_is_active() {
        use tikv_jemalloc_ctl::{epoch, stats};
        epoch::advance().unwrap();
        let allocated = stats::allocated::read().unwrap();
        assert!(allocated > 0, "jemalloc should report non-zero allocation");
    }

    #[test]
    fn cli_parses_replay_with_seed() {
        let cli = Cli::try_parse_from(["ticketflow", "replay", "-", "--seed", "7"]).unwrap();
        match cli.command {
            Some(Commands::Replay { input, seed }) => {
                assert_eq!(input, "-");
                assert_eq!(seed, Some(7));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn cli_accepts_global_config_flag() {
        let cli =
            Cli::try_parse_from(["ticketflow", "check-flow", "flow.json", "--config", "t.toml"])
                .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("t.toml")));
    }
}
