// SPDX-FileCopyrightText: 2026 LastSeen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delivery of rendered reports to a chat channel.

use async_trait::async_trait;

use crate::error::LastSeenError;

/// Posts a rendered report body to a guild channel.
#[async_trait]
pub trait ReportPublisher: Send + Sync {
    async fn publish(&self, guild_id: i64, channel_id: i64, body: &str)
        -> Result<(), LastSeenError>;
}
