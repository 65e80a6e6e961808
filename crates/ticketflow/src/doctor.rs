// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `ticketflow doctor` command implementation.
//!
//! Runs diagnostic checks against the configuration and the ticket database.

use std::io::IsTerminal;
use std::path::Path;
use std::time::{Duration, Instant};

use ticketflow_config::TicketflowConfig;
use ticketflow_core::TicketflowError;

/// Status of a diagnostic check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

/// Result of a single diagnostic check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    pub duration: Duration,
}

impl CheckResult {
    fn new(name: &str, status: CheckStatus, message: impl Into<String>, start: Instant) -> Self {
        Self {
            name: name.to_string(),
            status,
            message: message.into(),
            duration: start.elapsed(),
        }
    }
}

/// Run the `ticketflow doctor` command.
///
/// With `--deep`, also runs the SQLite integrity check and resource checks.
/// With `--plain`, disables colored output.
pub async fn run_doctor(
    config: &TicketflowConfig,
    config_path: Option<&Path>,
    deep: bool,
    plain: bool,
) -> Result<(), TicketflowError> {
    let use_color = !plain && std::io::stdout().is_terminal();
    let db_path = config.storage.database_path.as_str();

    let mut results = vec![
        check_config(config_path).await,
        check_database(db_path).await,
        check_schema(db_path).await,
    ];
    if deep {
        results.push(check_db_integrity(db_path).await);
        results.push(check_disk_space(db_path).await);
        results.push(check_memory_baseline().await);
    }

    println!();
    println!("  ticketflow doctor");
    println!("  {}", "-".repeat(50));

    let mut issues = 0;
    for result in &results {
        if result.status != CheckStatus::Pass {
            issues += 1;
        }
        println!("{}", render_line(result, use_color));
    }
    println!();

    if issues > 0 {
        let issue_word = if issues == 1 { "issue" } else { "issues" };
        println!("  {issues} {issue_word} found.");
        if !deep {
            println!("  Run with --deep for detailed diagnostics.");
        }
    } else {
        println!("  All checks passed.");
    }
    println!();

    Ok(())
}

fn render_line(result: &CheckResult, use_color: bool) -> String {
    let duration_ms = result.duration.as_millis();
    if use_color {
        use colored::Colorize;
        let (symbol, message) = match result.status {
            CheckStatus::Pass => ("✓".green().to_string(), result.message.normal()),
            CheckStatus::Warn => ("!".yellow().to_string(), result.message.yellow()),
            CheckStatus::Fail => ("✗".red().to_string(), result.message.red()),
        };
        format!("    {symbol} {:<20} {message} ({duration_ms}ms)", result.name)
    } else {
        let tag = match result.status {
            CheckStatus::Pass => "[OK]  ",
            CheckStatus::Warn => "[WARN]",
            CheckStatus::Fail => "[FAIL]",
        };
        format!("    {tag} {:<20} {} ({duration_ms}ms)", result.name, result.message)
    }
}

/// Check configuration loads without errors.
async fn check_config(config_path: Option<&Path>) -> CheckResult {
    let start = Instant::now();
    let loaded = match config_path {
        Some(path) => ticketflow_config::load_and_validate_path(path),
        None => ticketflow_config::load_and_validate(),
    };
    match loaded {
        Ok(_) => CheckResult::new("Configuration", CheckStatus::Pass, "valid", start),
        Err(errors) => CheckResult::new(
            "Configuration",
            CheckStatus::Fail,
            format!("{} error(s)", errors.len()),
            start,
        ),
    }
}

/// Check database file exists and can be opened.
async fn check_database(db_path: &str) -> CheckResult {
    let start = Instant::now();
    if !Path::new(db_path).exists() {
        return CheckResult::new(
            "Database",
            CheckStatus::Warn,
            format!("not found: {db_path} (will be created on first run)"),
            start,
        );
    }

    let conn = match tokio_rusqlite::Connection::open(db_path).await {
        Ok(conn) => conn,
        Err(e) => {
            return CheckResult::new("Database", CheckStatus::Fail, format!("open failed: {e}"), start);
        }
    };
    let query_result: Result<(), tokio_rusqlite::Error> = conn
        .call(|conn| {
            conn.execute_batch("SELECT 1")?;
            Ok(())
        })
        .await;
    match query_result {
        Ok(()) => CheckResult::new("Database", CheckStatus::Pass, "connected", start),
        Err(e) => CheckResult::new("Database", CheckStatus::Fail, format!("query failed: {e}"), start),
    }
}

/// Check that migrations have been applied.
async fn check_schema(db_path: &str) -> CheckResult {
    let start = Instant::now();
    if !Path::new(db_path).exists() {
        return CheckResult::new("Schema", CheckStatus::Warn, "database not found (skipped)", start);
    }

    let conn = match tokio_rusqlite::Connection::open(db_path).await {
        Ok(conn) => conn,
        Err(e) => {
            return CheckResult::new("Schema", CheckStatus::Fail, format!("open failed: {e}"), start);
        }
    };
    let result: Result<(i64, i64), tokio_rusqlite::Error> = conn
        .call(|conn| {
            let migrations: i64 = conn.query_row(
                "SELECT COUNT(*) FROM sqlite_master
                 WHERE type = 'table' AND name = 'refinery_schema_history'",
                [],
                |row| row.get(0),
            )?;
            if migrations == 0 {
                return Ok((0, 0));
            }
            let applied: i64 =
                conn.query_row("SELECT COUNT(*) FROM refinery_schema_history", [], |row| {
                    row.get(0)
                })?;
            let tickets: i64 = conn.query_row("SELECT COUNT(*) FROM tickets", [], |row| row.get(0))?;
            Ok((applied, tickets))
        })
        .await;

    match result {
        Ok((0, _)) => CheckResult::new("Schema", CheckStatus::Warn, "no migrations applied", start),
        Ok((applied, tickets)) => CheckResult::new(
            "Schema",
            CheckStatus::Pass,
            format!("{applied} migration(s), {tickets} ticket(s)"),
            start,
        ),
        Err(e) => CheckResult::new("Schema", CheckStatus::Fail, format!("check failed: {e}"), start),
    }
}

/// Deep check: SQLite integrity check.
async fn check_db_integrity(db_path: &str) -> CheckResult {
    let start = Instant::now();
    if !Path::new(db_path).exists() {
        return CheckResult::new("DB integrity", CheckStatus::Warn, "database not found (skipped)", start);
    }

    let conn = match tokio_rusqlite::Connection::open(db_path).await {
        Ok(conn) => conn,
        Err(e) => {
            return CheckResult::new("DB integrity", CheckStatus::Fail, format!("open failed: {e}"), start);
        }
    };
    let result: Result<Vec<String>, tokio_rusqlite::Error> = conn
        .call(|conn| {
            let mut stmt = conn.prepare("PRAGMA integrity_check")?;
            let rows: Vec<String> = stmt
                .query_map([], |row| row.get(0))?
                .filter_map(|r| r.ok())
                .collect();
            Ok(rows)
        })
        .await;

    match result {
        Ok(rows) if rows.len() == 1 && rows[0] == "ok" => {
            CheckResult::new("DB integrity", CheckStatus::Pass, "ok", start)
        }
        Ok(rows) => CheckResult::new(
            "DB integrity",
            CheckStatus::Fail,
            format!("{} issue(s) found", rows.len()),
            start,
        ),
        Err(e) => CheckResult::new("DB integrity", CheckStatus::Fail, format!("check failed: {e}"), start),
    }
}

/// Deep check: database directory is reachable; reports the file size.
async fn check_disk_space(db_path: &str) -> CheckResult {
    let start = Instant::now();
    let path = Path::new(db_path);
    let check_path = if path.exists() {
        path
    } else {
        path.parent().unwrap_or(Path::new("."))
    };

    match std::fs::metadata(check_path) {
        Ok(_) if path.exists() => {
            let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
            let size_mb = size as f64 / (1024.0 * 1024.0);
            CheckResult::new("Disk space", CheckStatus::Pass, format!("DB size: {size_mb:.1} MB"), start)
        }
        Ok(_) => CheckResult::new("Disk space", CheckStatus::Pass, "directory accessible", start),
        Err(e) => CheckResult::new("Disk space", CheckStatus::Warn, format!("cannot access: {e}"), start),
    }
}

/// Deep check: memory baseline via jemalloc.
async fn check_memory_baseline() -> CheckResult {
    let start = Instant::now();

    #[cfg(not(target_env = "msvc"))]
    {
        let _ = tikv_jemalloc_ctl::epoch::advance();
        let allocated = tikv_jemalloc_ctl::stats::allocated::read().unwrap_or(0);
        let resident = tikv_jemalloc_ctl::stats::resident::read().unwrap_or(0);
        let allocated_mb = allocated as f64 / (1024.0 * 1024.0);
        let resident_mb = resident as f64 / (1024.0 * 1024.0);
        CheckResult::new(
            "Memory baseline",
            CheckStatus::Pass,
            format!("heap: {allocated_mb:.1} MB, resident: {resident_mb:.1} MB"),
            start,
        )
    }

    #[cfg(target_env = "msvc")]
    {
        CheckResult::new("Memory baseline", CheckStatus::Warn, "jemalloc not available on MSVC", start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ticketflow_config::model::StorageConfig;
    use ticketflow_core::StorageAdapter;
    use ticketflow_storage::SqliteStorage;

    #[tokio::test]
    async fn check_config_passes_with_defaults() {
        let result = check_config(None).await;
        assert_eq!(result.status, CheckStatus::Pass);
        assert_eq!(result.name, "Configuration");
    }

    #[tokio::test]
    async fn check_database_missing_warns() {
        let result = check_database("/tmp/nonexistent-ticketflow-test-xyz.db").await;
        assert_eq!(result.status, CheckStatus::Warn);
        assert!(result.message.contains("not found"));
    }

    #[tokio::test]
    async fn migrated_database_passes_schema_and_integrity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doctor.db").to_string_lossy().to_string();
        let storage = SqliteStorage::new(StorageConfig {
            database_path: path.clone(),
            wal_mode: true,
        });
        storage.initialize().await.unwrap();
        storage.close().await.unwrap();

        assert_eq!(check_database(&path).await.status, CheckStatus::Pass);
        let schema = check_schema(&path).await;
        assert_eq!(schema.status, CheckStatus::Pass, "{}", schema.message);
        assert!(schema.message.contains("0 ticket(s)"));
        assert_eq!(check_db_integrity(&path).await.status, CheckStatus::Pass);
    }

    #[test]
    fn plain_line_has_status_tag() {
        let result = CheckResult {
            name: "Database".to_string(),
            status: CheckStatus::Fail,
            message: "open failed".to_string(),
            duration: Duration::from_millis(3),
        };
        let line = render_line(&result, false);
        assert!(line.contains("[FAIL]"));
        assert!(line.contains("open failed (3ms)"));
    }
}
