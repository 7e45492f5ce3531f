// SPDX-FileCopyrightText: 2026 LastSeen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Guild registration and configuration.
//!
//! Setters first insert the guild row if it is missing, then update the one
//! field they own. A known guild name is never replaced by a setter; only the
//! `Unknown` placeholder is.

use std::str::FromStr;

use lastseen_core::time::now_ts;
use lastseen_core::types::UNKNOWN_GUILD_NAME;
use lastseen_core::{
    ChannelFilter, Guild, LastSeenError, ReportCadence, ReportFrequency, ReportSchedule,
    ReportTypes, RoleFilter,
};
use rusqlite::{Connection, Row, params};
use tracing::warn;

use crate::database::Database;
use crate::models::GuildDefaults;
use crate::queries::{decode_list, optional};

const GUILD_COLUMNS: &str = "guild_id, guild_name, notification_channel_id, inactive_days,
    bot_admin_role_name, user_role_required, user_role_name, track_only_roles,
    allowed_channels, message_retention_days, timezone, positions_initialized, added_at,
    report_enabled, report_frequency, report_weekly_day, report_monthly_day,
    report_channel_id, report_types, last_weekly_report, last_monthly_report";

/// The guild a setter targets, with what to insert if it does not exist yet.
#[derive(Debug, Clone)]
pub struct GuildSeed {
    pub guild_id: i64,
    pub guild_name: Option<String>,
    pub defaults: GuildDefaults,
}

fn guild_from_row(row: &Row<'_>) -> rusqlite::Result<Guild> {
    let frequency: String = row.get(14)?;
    let frequency = ReportFrequency::from_str(&frequency).unwrap_or_else(|_| {
        warn!(value = %frequency, "unknown report frequency, using weekly");
        ReportFrequency::Weekly
    });
    Ok(Guild {
        guild_id: row.get(0)?,
        guild_name: row.get(1)?,
        notification_channel_id: row.get(2)?,
        inactive_days: row.get(3)?,
        bot_admin_role_name: row.get(4)?,
        user_role_required: row.get(5)?,
        user_role_name: row.get(6)?,
        track_only_roles: decode_list("track_only_roles", row.get(7)?, RoleFilter::from_json),
        allowed_channels: decode_list("allowed_channels", row.get(8)?, ChannelFilter::from_json),
        message_retention_days: row.get(9)?,
        timezone: row.get(10)?,
        positions_initialized: row.get(11)?,
        added_at: row.get(12)?,
        reports: ReportSchedule {
            enabled: row.get(13)?,
            frequency,
            weekly_day: row.get::<_, i64>(15)?.clamp(0, 6) as u8,
            monthly_day: row.get::<_, i64>(16)?.clamp(1, 28) as u8,
            channel_id: row.get(17)?,
            types: decode_list("report_types", row.get(18)?, ReportTypes::from_json),
            last_weekly_sent: row.get(19)?,
            last_monthly_sent: row.get(20)?,
        },
    })
}

/// Insert the guild if absent and promote a placeholder name.
pub(crate) fn ensure_guild(conn: &Connection, seed: &GuildSeed) -> rusqlite::Result<()> {
    let name = seed.guild_name.as_deref().unwrap_or(UNKNOWN_GUILD_NAME);
    conn.execute(
        "INSERT OR IGNORE INTO guilds
            (guild_id, guild_name, inactive_days, message_retention_days, bot_admin_role_name, added_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            seed.guild_id,
            name,
            seed.defaults.inactive_days,
            seed.defaults.retention_days,
            seed.defaults.bot_admin_role_name,
            now_ts(),
        ],
    )?;
    if name != UNKNOWN_GUILD_NAME {
        conn.execute(
            "UPDATE guilds SET guild_name = ?2 WHERE guild_id = ?1 AND guild_name = ?3",
            params![seed.guild_id, name, UNKNOWN_GUILD_NAME],
        )?;
    }
    Ok(())
}

async fn update_seeded<F>(db: &Database, seed: &GuildSeed, update: F) -> Result<bool, LastSeenError>
where
    F: FnOnce(&Connection, i64) -> rusqlite::Result<usize> + Send + 'static,
{
    let seed = seed.clone();
    db.transact(move |conn| {
        ensure_guild(conn, &seed)?;
        Ok(update(conn, seed.guild_id)? > 0)
    })
    .await
}

/// Register a guild. Returns `true` only when a new row was inserted.
pub async fn add_guild(
    db: &Database,
    guild_id: i64,
    guild_name: &str,
    inactive_days: i64,
    defaults: &GuildDefaults,
) -> Result<bool, LastSeenError> {
    let name = guild_name.to_string();
    let defaults = defaults.clone();
    db.transact(move |conn| {
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO guilds
                (guild_id, guild_name, inactive_days, message_retention_days, bot_admin_role_name, added_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                guild_id,
                name,
                inactive_days,
                defaults.retention_days,
                defaults.bot_admin_role_name,
                now_ts()
            ],
        )?;
        Ok(inserted > 0)
    })
    .await
}

/// Overwrite the stored name unconditionally.
pub async fn update_guild_name(
    db: &Database,
    guild_id: i64,
    guild_name: &str,
) -> Result<bool, LastSeenError> {
    let name = guild_name.to_string();
    db.transact(move |conn| {
        let n = conn.execute(
            "UPDATE guilds SET guild_name = ?2 WHERE guild_id = ?1",
            params![guild_id, name],
        )?;
        Ok(n > 0)
    })
    .await
}

/// Insert the guild if absent without changing anything else.
pub async fn upsert_guild(db: &Database, seed: &GuildSeed) -> Result<bool, LastSeenError> {
    update_seeded(db, seed, |_, _| Ok(1)).await
}

pub async fn get_guild(db: &Database, guild_id: i64) -> Result<Option<Guild>, LastSeenError> {
    db.transact(move |conn| {
        let sql = format!("SELECT {GUILD_COLUMNS} FROM guilds WHERE guild_id = ?1");
        optional(conn.query_row(&sql, params![guild_id], guild_from_row))
    })
    .await
}

pub async fn list_guilds(db: &Database) -> Result<Vec<Guild>, LastSeenError> {
    db.transact(|conn| {
        let sql = format!("SELECT {GUILD_COLUMNS} FROM guilds ORDER BY guild_id");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], guild_from_row)?;
        rows.collect()
    })
    .await
}

/// Delete a guild and every row that belongs to it.
pub async fn remove_guild(db: &Database, guild_id: i64) -> Result<bool, LastSeenError> {
    db.transact(move |conn| {
        for table in [
            "members",
            "role_changes",
            "message_activity",
            "message_activity_hourly",
        ] {
            conn.execute(
                &format!("DELETE FROM {table} WHERE guild_id = ?1"),
                params![guild_id],
            )?;
        }
        let n = conn.execute("DELETE FROM guilds WHERE guild_id = ?1", params![guild_id])?;
        Ok(n > 0)
    })
    .await
}

pub async fn set_notification_channel(
    db: &Database,
    seed: &GuildSeed,
    channel_id: Option<i64>,
) -> Result<bool, LastSeenError> {
    update_seeded(db, seed, move |conn, id| {
        conn.execute(
            "UPDATE guilds SET notification_channel_id = ?2 WHERE guild_id = ?1",
            params![id, channel_id],
        )
    })
    .await
}

pub async fn set_inactive_days(
    db: &Database,
    seed: &GuildSeed,
    days: i64,
) -> Result<bool, LastSeenError> {
    if days < 1 {
        return Err(LastSeenError::Config(format!(
            "inactive days must be at least 1, got {days}"
        )));
    }
    update_seeded(db, seed, move |conn, id| {
        conn.execute(
            "UPDATE guilds SET inactive_days = ?2 WHERE guild_id = ?1",
            params![id, days],
        )
    })
    .await
}

pub async fn set_retention_days(
    db: &Database,
    seed: &GuildSeed,
    days: i64,
) -> Result<bool, LastSeenError> {
    if days < 1 {
        return Err(LastSeenError::Config(format!(
            "retention days must be at least 1, got {days}"
        )));
    }
    update_seeded(db, seed, move |conn, id| {
        conn.execute(
            "UPDATE guilds SET message_retention_days = ?2 WHERE guild_id = ?1",
            params![id, days],
        )
    })
    .await
}

pub async fn set_timezone(
    db: &Database,
    seed: &GuildSeed,
    timezone: &str,
) -> Result<bool, LastSeenError> {
    let timezone = timezone.trim().to_string();
    if timezone.is_empty() {
        return Err(LastSeenError::Config("timezone must not be empty".into()));
    }
    update_seeded(db, seed, move |conn, id| {
        conn.execute(
            "UPDATE guilds SET timezone = ?2 WHERE guild_id = ?1",
            params![id, timezone],
        )
    })
    .await
}

/// Store the report schedule. Last-sent timestamps are left untouched.
pub async fn set_report_config(
    db: &Database,
    seed: &GuildSeed,
    schedule: &ReportSchedule,
) -> Result<bool, LastSeenError> {
    if schedule.weekly_day > 6 {
        return Err(LastSeenError::Config(format!(
            "weekly report day must be 0..=6, got {}",
            schedule.weekly_day
        )));
    }
    if !(1..=28).contains(&schedule.monthly_day) {
        return Err(LastSeenError::Config(format!(
            "monthly report day must be 1..=28, got {}",
            schedule.monthly_day
        )));
    }
    let schedule = schedule.clone();
    update_seeded(db, seed, move |conn, id| {
        conn.execute(
            "UPDATE guilds SET
                report_enabled = ?2, report_frequency = ?3, report_weekly_day = ?4,
                report_monthly_day = ?5, report_channel_id = ?6, report_types = ?7
             WHERE guild_id = ?1",
            params![
                id,
                schedule.enabled,
                schedule.frequency.to_string(),
                schedule.weekly_day,
                schedule.monthly_day,
                schedule.channel_id,
                schedule.types.to_json(),
            ],
        )
    })
    .await
}

/// Record that a report of `cadence` went out at `ts`.
pub async fn mark_report_sent(
    db: &Database,
    guild_id: i64,
    cadence: ReportCadence,
    ts: i64,
) -> Result<bool, LastSeenError> {
    let sql = match cadence {
        ReportCadence::Weekly => "UPDATE guilds SET last_weekly_report = ?2 WHERE guild_id = ?1",
        ReportCadence::Monthly => "UPDATE guilds SET last_monthly_report = ?2 WHERE guild_id = ?1",
    };
    db.transact(move |conn| Ok(conn.execute(sql, params![guild_id, ts])? > 0))
        .await
}

pub async fn set_bot_admin_role(
    db: &Database,
    seed: &GuildSeed,
    role_name: Option<&str>,
) -> Result<bool, LastSeenError> {
    let role = role_name.map(str::to_string);
    update_seeded(db, seed, move |conn, id| {
        conn.execute(
            "UPDATE guilds SET bot_admin_role_name = ?2 WHERE guild_id = ?1",
            params![id, role],
        )
    })
    .await
}

pub async fn set_user_role_required(
    db: &Database,
    seed: &GuildSeed,
    required: bool,
) -> Result<bool, LastSeenError> {
    update_seeded(db, seed, move |conn, id| {
        conn.execute(
            "UPDATE guilds SET user_role_required = ?2 WHERE guild_id = ?1",
            params![id, required],
        )
    })
    .await
}

pub async fn set_user_role_name(
    db: &Database,
    seed: &GuildSeed,
    role_name: Option<&str>,
) -> Result<bool, LastSeenError> {
    let role = role_name.map(str::to_string);
    update_seeded(db, seed, move |conn, id| {
        conn.execute(
            "UPDATE guilds SET user_role_name = ?2 WHERE guild_id = ?1",
            params![id, role],
        )
    })
    .await
}

pub async fn set_track_only_roles(
    db: &Database,
    seed: &GuildSeed,
    roles: &RoleFilter,
) -> Result<bool, LastSeenError> {
    let encoded = roles.to_json();
    update_seeded(db, seed, move |conn, id| {
        conn.execute(
            "UPDATE guilds SET track_only_roles = ?2 WHERE guild_id = ?1",
            params![id, encoded],
        )
    })
    .await
}

pub async fn set_allowed_channels(
    db: &Database,
    seed: &GuildSeed,
    channels: &ChannelFilter,
) -> Result<bool, LastSeenError> {
    let encoded = channels.to_json();
    update_seeded(db, seed, move |conn, id| {
        conn.execute(
            "UPDATE guilds SET allowed_channels = ?2 WHERE guild_id = ?1",
            params![id, encoded],
        )
    })
    .await
}

/// Retention window of a guild, `None` if the guild is unknown.
pub(crate) fn retention_days(conn: &Connection, guild_id: i64) -> rusqlite::Result<Option<i64>> {
    optional(conn.query_row(
        "SELECT message_retention_days FROM guilds WHERE guild_id = ?1",
        params![guild_id],
        |row| row.get(0),
    ))
}
