// SPDX-FileCopyrightText: 2026 LastSeen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Traits at the seams between the activity buffer, the store, and report delivery.
//!
//! Both traits use `#[async_trait]` so they can be held as trait objects.

pub mod activity;
pub mod report;

pub use activity::ActivitySink;
pub use report::ReportPublisher;
