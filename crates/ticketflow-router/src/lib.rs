// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queue routing for new and re-queued tickets.
//!
//! This crate provides:
//! - [`RoutingTable`]: pure decisions over a channel's ordered queue list
//! - [`QueueRouter`]: loads tables from storage and resolves queues by id

pub mod router;
pub mod table;

pub use router::QueueRouter;
pub use table::{RouteDecision, RouteFlags, RoutingTable};
