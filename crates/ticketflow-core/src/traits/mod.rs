// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborator port definitions.
//!
//! All adapters extend the [`PluginAdapter`] base trait and use
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod clock;
pub mod media;
pub mod messaging;
pub mod storage;

pub use adapter::PluginAdapter;
pub use clock::{Clock, SystemClock};
pub use media::MediaPort;
pub use messaging::{MessagingFactory, MessagingPort};
pub use storage::StorageAdapter;
