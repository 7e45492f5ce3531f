// SPDX-FileCopyrightText: 2026 LastSeen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded per-member role-change log.

use std::str::FromStr;

use lastseen_core::{LastSeenError, RoleAction, RoleChange};
use rusqlite::params;

use crate::database::Database;

/// Entries kept per (guild, user) after each insert.
pub const ROLE_HISTORY_LIMIT: i64 = 20;

/// Longest stored role name, in characters.
pub const MAX_ROLE_NAME_CHARS: usize = 100;

/// Strip control characters and cap the length of a role name.
pub fn sanitize_role_name(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_control())
        .take(MAX_ROLE_NAME_CHARS)
        .collect::<String>()
        .trim()
        .to_string()
}

/// Append a role change and prune the member's log to [`ROLE_HISTORY_LIMIT`].
///
/// Names that are empty after sanitizing are not recorded.
pub async fn record_role_change(
    db: &Database,
    guild_id: i64,
    user_id: i64,
    role_name: &str,
    action: RoleAction,
    timestamp: i64,
) -> Result<bool, LastSeenError> {
    let role_name = sanitize_role_name(role_name);
    if role_name.is_empty() {
        return Ok(false);
    }
    let action = action.to_string();
    db.transact(move |conn| {
        conn.execute(
            "INSERT INTO role_changes (guild_id, user_id, role_name, action, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![guild_id, user_id, role_name, action, timestamp],
        )?;
        conn.execute(
            "DELETE FROM role_changes
             WHERE guild_id = ?1 AND user_id = ?2 AND id NOT IN (
                SELECT id FROM role_changes
                WHERE guild_id = ?1 AND user_id = ?2
                ORDER BY timestamp DESC, id DESC
                LIMIT ?3
             )",
            params![guild_id, user_id, ROLE_HISTORY_LIMIT],
        )?;
        Ok(true)
    })
    .await
}

/// Most recent role changes of a member, newest first, at most `limit`.
pub async fn get_role_history(
    db: &Database,
    guild_id: i64,
    user_id: i64,
    limit: usize,
) -> Result<Vec<RoleChange>, LastSeenError> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    db.transact(move |conn| {
        let mut stmt = conn.prepare(
            "SELECT id, guild_id, user_id, role_name, action, timestamp
             FROM role_changes
             WHERE guild_id = ?1 AND user_id = ?2
             ORDER BY timestamp DESC, id DESC
             LIMIT ?3",
        )?;
        let rows = stmt.query_map(params![guild_id, user_id, limit], |row| {
            let action: String = row.get(4)?;
            let action = RoleAction::from_str(&action).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
            })?;
            Ok(RoleChange {
                id: row.get(0)?,
                guild_id: row.get(1)?,
                user_id: row.get(2)?,
                role_name: row.get(3)?,
                action,
                timestamp: row.get(5)?,
            })
        })?;
        rows.collect()
    })
    .await
}
