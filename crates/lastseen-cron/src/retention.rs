// SPDX-FileCopyrightText: 2026 LastSeen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Purges message activity older than each guild's retention window.

use std::sync::Arc;

use lastseen_storage::{CleanupCounts, SqliteStore};
use tracing::{debug, info};

pub struct RetentionJob {
    store: Arc<SqliteStore>,
}

impl RetentionJob {
    pub fn new(store: Arc<SqliteStore>) -> Self {
        Self { store }
    }

    pub async fn run(&self) -> CleanupCounts {
        let counts = self.store.cleanup_all_guilds_message_activity().await;
        if counts.total() > 0 {
            info!(
                daily = counts.daily,
                hourly = counts.hourly,
                "purged expired message activity"
            );
        } else {
            debug!("no expired message activity");
        }
        counts
    }
}
