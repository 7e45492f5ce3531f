// SPDX-FileCopyrightText: 2026 LastSeen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Destination for coalesced message-activity counts.

use async_trait::async_trait;

use crate::error::LastSeenError;

/// Receives aggregated message counts from the activity buffer.
///
/// A write returns `Ok(true)` when the count was applied and `Ok(false)` when
/// it was dropped on purpose (the member no longer exists or the count is not
/// positive). `Err` means a transient failure and the caller should retry.
#[async_trait]
pub trait ActivitySink: Send + Sync {
    /// Add `count` messages to the daily bucket starting at `day_bucket`.
    async fn record_daily(
        &self,
        guild_id: i64,
        user_id: i64,
        day_bucket: i64,
        count: i64,
    ) -> Result<bool, LastSeenError>;

    /// Add `count` messages to the hourly bucket starting at `hour_bucket`.
    async fn record_hourly(
        &self,
        guild_id: i64,
        user_id: i64,
        hour_bucket: i64,
        hour_of_day: u8,
        count: i64,
    ) -> Result<bool, LastSeenError>;
}
