// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Flow automations for ticketflow.
//!
//! - [`FlowGraph`]: typed arena parsed and validated from a stored definition
//! - [`FlowGraphInterpreter`]: bounded step-wise runs with a persisted cursor
//! - [`MessagingRegistry`]: per-channel messaging sessions, connected lazily

pub mod delivery;
pub mod graph;
pub mod interpreter;
pub mod registry;

pub use delivery::{FlowSettings, Outbox};
pub use graph::{BlockElement, FlowGraph, Node, NodeKind};
pub use interpreter::{
    Branch, ExitReason, FlowGraphInterpreter, RunOutcome, RunState, STOP_KEYWORD, choose_branch,
};
pub use registry::MessagingRegistry;
