// SPDX-FileCopyrightText: 2026 LastSeen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Purging of message activity older than a guild's retention window.

use lastseen_core::LastSeenError;
use lastseen_core::time::days_ago;
use rusqlite::params;
use tracing::{debug, warn};

use crate::database::Database;
use crate::models::CleanupCounts;
use crate::queries::guilds;

/// Delete a guild's daily and hourly rows whose bucket is strictly older than
/// `now - retention_days` days. A row exactly at the cutoff is kept.
pub async fn cleanup_old_message_activity(
    db: &Database,
    guild_id: i64,
    retention_days: i64,
    now: i64,
) -> Result<CleanupCounts, LastSeenError> {
    if retention_days < 1 {
        return Err(LastSeenError::Config(format!(
            "retention days must be at least 1, got {retention_days}"
        )));
    }
    let cutoff = days_ago(now, retention_days);
    db.transact(move |conn| {
        let daily = conn.execute(
            "DELETE FROM message_activity WHERE guild_id = ?1 AND day_bucket < ?2",
            params![guild_id, cutoff],
        )?;
        let hourly = conn.execute(
            "DELETE FROM message_activity_hourly WHERE guild_id = ?1 AND hour_bucket < ?2",
            params![guild_id, cutoff],
        )?;
        Ok(CleanupCounts { daily, hourly })
    })
    .await
}

/// Guilds that own activity rows, with their retention window or
/// `default_days` when the guild row is missing.
async fn retention_targets(
    db: &Database,
    default_days: i64,
) -> Result<Vec<(i64, i64)>, LastSeenError> {
    db.transact(move |conn| {
        let ids: Vec<i64> = {
            let mut stmt = conn.prepare(
                "SELECT guild_id FROM message_activity
                 UNION
                 SELECT guild_id FROM message_activity_hourly",
            )?;
            let rows = stmt.query_map([], |row| row.get(0))?;
            rows.collect::<rusqlite::Result<_>>()?
        };
        ids.into_iter()
            .map(|id| -> rusqlite::Result<(i64, i64)> {
                let days = guilds::retention_days(conn, id)?.unwrap_or(default_days);
                Ok((id, days))
            })
            .collect()
    })
    .await
}

/// Apply each guild's retention window. A guild that fails is logged and
/// skipped; the totals cover the guilds that succeeded.
pub async fn cleanup_all_guilds_message_activity(
    db: &Database,
    default_days: i64,
    now: i64,
) -> Result<CleanupCounts, LastSeenError> {
    let mut totals = CleanupCounts::default();
    for (guild_id, days) in retention_targets(db, default_days).await? {
        match cleanup_old_message_activity(db, guild_id, days, now).await {
            Ok(counts) => {
                debug!(guild_id, days, deleted = counts.total(), "retention applied");
                totals += counts;
            }
            Err(e) => warn!(guild_id, error = %e, "retention cleanup failed for guild"),
        }
    }
    Ok(totals)
}
