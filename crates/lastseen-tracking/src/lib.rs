// SPDX-FileCopyrightText: 2026 LastSeen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Activity tracking for the LastSeen bot.
//!
//! [`ActivityBuffer`] coalesces message counts before they reach the store,
//! [`Tracker`] maps gateway events onto store operations, and [`shutdown`]
//! wires process signals to a cancellation token.

pub mod buffer;
pub mod shutdown;
pub mod tracker;

pub use buffer::{ActivityBuffer, BufferSettings, FlushReport};
pub use tracker::{GuildSync, LeaveNotice, MemberChanges, MemberSnapshot, Tracker};
