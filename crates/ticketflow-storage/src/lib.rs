// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite ticket store for ticketflow.
//!
//! WAL-mode SQLite with embedded migrations and a single-writer
//! connection via `tokio-rusqlite`. The one-active-ticket rule is backed by a
//! partial unique index; violations surface as `Conflict`.

pub mod adapter;
pub mod database;
pub mod migrations;
pub mod queries;

pub use adapter::SqliteStorage;
pub use database::Database;
