// SPDX-FileCopyrightText: 2026 LastSeen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the LastSeen activity tracker.
//!
//! This crate provides the domain types shared by storage, tracking, and
//! maintenance crates, the common error type, and the traits placed at the
//! seams between the activity buffer, the store, and report delivery.

pub mod error;
pub mod time;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::LastSeenError;
pub use traits::{ActivitySink, ReportPublisher};
pub use types::{
    ChannelFilter, Guild, LastSeen, Member, MemberRoles, NicknameHistory, ReportCadence,
    ReportFrequency, ReportKind, ReportSchedule, ReportTypes, RoleAction, RoleChange, RoleFilter,
};
