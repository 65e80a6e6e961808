// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for ticketflow.
//!
//! Provides mock ports and harness infrastructure for fast,
//! deterministic tests without a real chat transport.
//!
//! # Components
//!
//! - [`MockMessaging`] - Messaging port capturing every send and typing toggle
//! - [`MockMessagingFactory`] - Hands out a shared [`MockMessaging`] per channel
//! - [`MockMedia`] - Media port with predictable URLs
//! - [`ManualClock`] - Clock whose sleeps return immediately and are recorded
//! - [`TestHarness`] - Temp SQLite store seeded with a contact, channel and queue

pub mod clock;
pub mod harness;
pub mod mock_media;
pub mod mock_messaging;

pub use clock::ManualClock;
pub use harness::{TestHarness, TestHarnessBuilder};
pub use mock_media::MockMedia;
pub use mock_messaging::{MockMessaging, MockMessagingFactory, OutboundEvent};
