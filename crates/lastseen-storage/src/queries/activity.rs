// SPDX-FileCopyrightText: 2026 LastSeen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Upserts into the daily and hourly message counters.

use lastseen_core::LastSeenError;
use lastseen_core::time::{day_bucket, hour_bucket};
use rusqlite::params;
use tracing::debug;

use crate::database::Database;
use crate::queries::members;

/// Add `count` messages to a member's daily counter.
///
/// Returns `false` without writing when `count` is not positive or the member
/// is unknown.
pub async fn increment_message_activity(
    db: &Database,
    guild_id: i64,
    user_id: i64,
    day: i64,
    count: i64,
) -> Result<bool, LastSeenError> {
    if count <= 0 {
        return Ok(false);
    }
    let day = day_bucket(day);
    db.transact(move |conn| {
        if !members::exists(conn, guild_id, user_id)? {
            debug!(guild_id, user_id, "dropping activity for unknown member");
            return Ok(false);
        }
        conn.execute(
            "INSERT INTO message_activity (guild_id, user_id, day_bucket, message_count)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(guild_id, user_id, day_bucket)
             DO UPDATE SET message_count = message_count + excluded.message_count",
            params![guild_id, user_id, day, count],
        )?;
        Ok(true)
    })
    .await
}

/// Add `count` messages to a member's hourly counter.
///
/// Same drop rules as [`increment_message_activity`]; `hour_of_day` must be 0..=23.
pub async fn increment_message_activity_hourly(
    db: &Database,
    guild_id: i64,
    user_id: i64,
    hour: i64,
    hour_of_day: u8,
    count: i64,
) -> Result<bool, LastSeenError> {
    if count <= 0 {
        return Ok(false);
    }
    if hour_of_day > 23 {
        return Err(LastSeenError::Internal(format!(
            "hour of day out of range: {hour_of_day}"
        )));
    }
    let hour = hour_bucket(hour);
    db.transact(move |conn| {
        if !members::exists(conn, guild_id, user_id)? {
            debug!(guild_id, user_id, "dropping hourly activity for unknown member");
            return Ok(false);
        }
        conn.execute(
            "INSERT INTO message_activity_hourly
                (guild_id, user_id, hour_bucket, hour_of_day, message_count)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(guild_id, user_id, hour_bucket)
             DO UPDATE SET message_count = message_count + excluded.message_count",
            params![guild_id, user_id, hour, hour_of_day, count],
        )?;
        Ok(true)
    })
    .await
}
