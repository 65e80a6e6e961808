// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for ticketflow.

use thiserror::Error;

/// The primary error type used across ticketflow ports and core operations.
///
/// Propagation policy: `Conflict` and `NotFound` go back to the caller,
/// `Delivery` is logged by the interpreter and the run continues, `Storage`
/// aborts the current run and is surfaced to the top-level reporter.
#[derive(Debug, Error)]
pub enum TicketflowError {
    /// Configuration errors (invalid TOML, missing fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Persistence failures (connection, query, migration, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Another user or queue already owns the ticket, or the requested
    /// transition is not allowed in the ticket's current state.
    #[error("conflict: {message}")]
    Conflict { message: String },

    /// A referenced contact, channel, queue, ticket, flow or node is missing.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Transport-level send failure reported by a messaging port.
    #[error("delivery error: {message}")]
    Delivery {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A flow definition failed to parse or validate.
    #[error("invalid flow {flow_id}: {reason}")]
    InvalidFlow { flow_id: i64, reason: String },

    /// Requested adapter was not registered.
    #[error("adapter not found: {adapter_type}/{name}")]
    AdapterNotFound { adapter_type: String, name: String },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors, including invariant violations.
    #[error("internal error: {0}")]
    Internal(String),
}

impl TicketflowError {
    /// Shorthand for a [`TicketflowError::NotFound`] with a displayable id.
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Shorthand for a [`TicketflowError::Conflict`].
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Whether the caller can recover from this error (retry, show to an agent)
    /// without treating it as a process-level failure.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Conflict { .. } | Self::NotFound { .. } | Self::Delivery { .. }
        )
    }
}
