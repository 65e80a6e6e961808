// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ticket lifecycle engine for ticketflow.
//!
//! The [`TicketEngine`] is the central coordinator that:
//! - Serializes events per (contact, channel, company) key
//! - Finds, reopens or creates the active ticket for each event
//! - Gates new conversations on data-protection consent
//! - Starts and resumes flow automations

pub mod engine;
pub mod lgpd;
pub mod locks;
pub mod shutdown;
pub mod state;

pub use engine::{EnginePorts, TicketEngine};
pub use lgpd::{ConsentGate, ConsentOutcome};
pub use locks::KeyedLocks;
pub use state::{Origin, Resolution, ResolveRequest, TicketStateManager};
