// SPDX-FileCopyrightText: 2026 LastSeen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Read-only aggregates over members and message activity.
//!
//! Windows are counted in whole UTC days ending with the day containing
//! `now`: a 7-day window covers today and the six days before it.

use lastseen_core::LastSeenError;
use lastseen_core::time::{SECONDS_PER_DAY, day_bucket, days_ago};
use rusqlite::{Connection, OptionalExtension, params};

use crate::database::Database;
use crate::models::{
    ActivityPeriod, DailyCount, GuildActivityStats, GuildStats, LeaderboardEntry, MemberGrowth,
    RetentionCohort, STAT_WINDOWS, ServerSnapshot,
};

/// First day bucket of a `days`-long window ending today.
pub fn window_start(now: i64, days: i64) -> i64 {
    day_bucket(now) - (days.max(1) - 1) * SECONDS_PER_DAY
}

/// Weekday of a day bucket, 0 = Monday.
pub fn weekday_of(day: i64) -> usize {
    // 1970-01-01 was a Thursday.
    ((day.div_euclid(SECONDS_PER_DAY) + 3).rem_euclid(7)) as usize
}

fn count(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> rusqlite::Result<i64> {
    conn.query_row(sql, params, |row| row.get::<_, Option<i64>>(0))
        .map(Option::unwrap_or_default)
}

fn guild_messages_since(conn: &Connection, guild_id: i64, since: i64) -> rusqlite::Result<i64> {
    count(
        conn,
        "SELECT SUM(message_count) FROM message_activity WHERE guild_id = ?1 AND day_bucket >= ?2",
        params![guild_id, since],
    )
}

fn active_users_since(conn: &Connection, guild_id: i64, since: i64) -> rusqlite::Result<i64> {
    count(
        conn,
        "SELECT COUNT(DISTINCT user_id) FROM message_activity
         WHERE guild_id = ?1 AND day_bucket >= ?2 AND message_count > 0",
        params![guild_id, since],
    )
}

/// Totals over the last `days` days for one member, or the whole guild when
/// `user_id` is `None`.
pub async fn get_message_activity_period(
    db: &Database,
    guild_id: i64,
    user_id: Option<i64>,
    days: i64,
    now: i64,
) -> Result<ActivityPeriod, LastSeenError> {
    let since = window_start(now, days);
    let days = days.max(1);
    db.transact(move |conn| {
        let (total, active_days) = conn.query_row(
            "SELECT COALESCE(SUM(message_count), 0), COUNT(DISTINCT day_bucket)
             FROM message_activity
             WHERE guild_id = ?1 AND (?2 IS NULL OR user_id = ?2) AND day_bucket >= ?3",
            params![guild_id, user_id, since],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
        )?;
        Ok(ActivityPeriod {
            total,
            active_days,
            daily_average: total as f64 / days as f64,
        })
    })
    .await
}

/// Per-day message counts over the window, oldest first, zero-filled.
pub async fn get_message_activity_trend(
    db: &Database,
    guild_id: i64,
    user_id: Option<i64>,
    days: i64,
    now: i64,
) -> Result<Vec<DailyCount>, LastSeenError> {
    let since = window_start(now, days);
    let days = days.max(1);
    db.transact(move |conn| {
        let mut stmt = conn.prepare(
            "SELECT day_bucket, SUM(message_count) FROM message_activity
             WHERE guild_id = ?1 AND (?2 IS NULL OR user_id = ?2) AND day_bucket >= ?3
             GROUP BY day_bucket",
        )?;
        let rows = stmt.query_map(params![guild_id, user_id, since], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
        })?;
        let mut trend: Vec<DailyCount> = (0..days)
            .map(|i| DailyCount {
                day_bucket: since + i * SECONDS_PER_DAY,
                count: 0,
            })
            .collect();
        for row in rows {
            let (day, total) = row?;
            let index = (day - since) / SECONDS_PER_DAY;
            if let Some(slot) = usize::try_from(index).ok().and_then(|i| trend.get_mut(i)) {
                slot.count += total;
            }
        }
        Ok(trend)
    })
    .await
}

pub async fn get_guild_message_activity_stats(
    db: &Database,
    guild_id: i64,
    now: i64,
) -> Result<GuildActivityStats, LastSeenError> {
    db.transact(move |conn| {
        let [w7, w30, w90, w365] = STAT_WINDOWS.map(|days| window_start(now, days));
        Ok(GuildActivityStats {
            messages_7d: guild_messages_since(conn, guild_id, w7)?,
            messages_30d: guild_messages_since(conn, guild_id, w30)?,
            messages_90d: guild_messages_since(conn, guild_id, w90)?,
            messages_365d: guild_messages_since(conn, guild_id, w365)?,
            active_users_7d: active_users_since(conn, guild_id, w7)?,
            active_users_30d: active_users_since(conn, guild_id, w30)?,
        })
    })
    .await
}

/// Current membership picture. `inactive_members` uses the guild's own
/// threshold, or `fallback_inactive_days` for an unregistered guild.
pub async fn get_server_snapshot_stats(
    db: &Database,
    guild_id: i64,
    fallback_inactive_days: i64,
    now: i64,
) -> Result<ServerSnapshot, LastSeenError> {
    db.transact(move |conn| {
        let inactive_days: i64 = conn
            .query_row(
                "SELECT inactive_days FROM guilds WHERE guild_id = ?1",
                params![guild_id],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or(fallback_inactive_days);
        let threshold = days_ago(now, inactive_days);

        let (total, active, online, never, inactive): (i64, i64, i64, i64, i64) = conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(is_active = 1), 0),
                    COALESCE(SUM(is_active = 1 AND last_seen = 0), 0),
                    COALESCE(SUM(is_active = 1 AND last_seen IS NULL), 0),
                    COALESCE(SUM(is_active = 1 AND last_seen > 0 AND last_seen <= ?2), 0)
             FROM members WHERE guild_id = ?1",
            params![guild_id, threshold],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
        )?;

        Ok(ServerSnapshot {
            total_members: total,
            active_members: active,
            departed_members: total - active,
            online_now: online,
            never_seen: never,
            inactive_members: inactive,
            messages_today: guild_messages_since(conn, guild_id, day_bucket(now))?,
        })
    })
    .await
}

pub async fn get_member_growth_stats(
    db: &Database,
    guild_id: i64,
    now: i64,
) -> Result<MemberGrowth, LastSeenError> {
    db.transact(move |conn| {
        let joined = |days: i64| {
            count(
                conn,
                "SELECT COUNT(*) FROM members WHERE guild_id = ?1 AND join_date >= ?2",
                params![guild_id, days_ago(now, days)],
            )
        };
        let left = |days: i64| {
            count(
                conn,
                "SELECT COUNT(*) FROM members
                 WHERE guild_id = ?1 AND is_active = 0 AND left_date >= ?2",
                params![guild_id, days_ago(now, days)],
            )
        };
        Ok(MemberGrowth {
            joined_7d: joined(7)?,
            joined_30d: joined(30)?,
            joined_90d: joined(90)?,
            left_7d: left(7)?,
            left_30d: left(30)?,
            left_90d: left(90)?,
        })
    })
    .await
}

/// For each standard window, the members who joined in it and how many are
/// still active.
pub async fn get_retention_cohorts(
    db: &Database,
    guild_id: i64,
    now: i64,
) -> Result<Vec<RetentionCohort>, LastSeenError> {
    db.transact(move |conn| {
        STAT_WINDOWS
            .iter()
            .map(|&window_days| -> rusqlite::Result<RetentionCohort> {
                let (joined, still_active): (i64, i64) = conn.query_row(
                    "SELECT COUNT(*), COALESCE(SUM(is_active = 1), 0) FROM members
                     WHERE guild_id = ?1 AND join_date >= ?2",
                    params![guild_id, days_ago(now, window_days)],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )?;
                let retention_rate = if joined > 0 {
                    still_active as f64 * 100.0 / joined as f64
                } else {
                    0.0
                };
                Ok(RetentionCohort {
                    window_days,
                    joined,
                    still_active,
                    retention_rate,
                })
            })
            .collect()
    })
    .await
}

/// Members with the most messages in the window, highest first.
pub async fn get_activity_leaderboard(
    db: &Database,
    guild_id: i64,
    days: i64,
    limit: usize,
    now: i64,
) -> Result<Vec<LeaderboardEntry>, LastSeenError> {
    let since = window_start(now, days);
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    db.transact(move |conn| {
        let mut stmt = conn.prepare(
            "SELECT a.user_id, m.username, m.nickname, SUM(a.message_count) AS total
             FROM message_activity a
             JOIN members m ON m.guild_id = a.guild_id AND m.user_id = a.user_id
             WHERE a.guild_id = ?1 AND a.day_bucket >= ?2
             GROUP BY a.user_id
             HAVING total > 0
             ORDER BY total DESC, a.user_id ASC
             LIMIT ?3",
        )?;
        let rows = stmt.query_map(params![guild_id, since, limit], |row| {
            Ok(LeaderboardEntry {
                user_id: row.get(0)?,
                username: row.get(1)?,
                nickname: row.get(2)?,
                total_messages: row.get(3)?,
            })
        })?;
        rows.collect()
    })
    .await
}

/// Messages per UTC hour of day over the window.
pub async fn get_activity_by_hour(
    db: &Database,
    guild_id: i64,
    days: i64,
    now: i64,
) -> Result<[i64; 24], LastSeenError> {
    let since = window_start(now, days);
    db.transact(move |conn| {
        let mut stmt = conn.prepare(
            "SELECT hour_of_day, SUM(message_count) FROM message_activity_hourly
             WHERE guild_id = ?1 AND hour_bucket >= ?2
             GROUP BY hour_of_day",
        )?;
        let rows = stmt.query_map(params![guild_id, since], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
        })?;
        let mut hours = [0_i64; 24];
        for row in rows {
            let (hour, total) = row?;
            if let Some(slot) = usize::try_from(hour).ok().and_then(|h| hours.get_mut(h)) {
                *slot += total;
            }
        }
        Ok(hours)
    })
    .await
}

/// Messages per weekday (Monday first) over the window.
pub async fn get_activity_by_day(
    db: &Database,
    guild_id: i64,
    days: i64,
    now: i64,
) -> Result<[i64; 7], LastSeenError> {
    let since = window_start(now, days);
    db.transact(move |conn| {
        let mut stmt = conn.prepare(
            "SELECT day_bucket, SUM(message_count) FROM message_activity
             WHERE guild_id = ?1 AND day_bucket >= ?2
             GROUP BY day_bucket",
        )?;
        let rows = stmt.query_map(params![guild_id, since], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
        })?;
        let mut weekdays = [0_i64; 7];
        for row in rows {
            let (day, total) = row?;
            weekdays[weekday_of(day)] += total;
        }
        Ok(weekdays)
    })
    .await
}

pub async fn get_guild_stats(db: &Database, guild_id: i64) -> Result<GuildStats, LastSeenError> {
    db.transact(move |conn| {
        let (total, active): (i64, i64) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(is_active = 1), 0) FROM members WHERE guild_id = ?1",
            params![guild_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(GuildStats {
            total_members: total,
            active_members: active,
            left_members: total - active,
        })
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_start_includes_today() {
        let now = 1_772_638_930; // 2026-03-04T15:42:10Z
        assert_eq!(window_start(now, 1), day_bucket(now));
        assert_eq!(window_start(now, 7), day_bucket(now) - 6 * SECONDS_PER_DAY);
        assert_eq!(window_start(now, 0), day_bucket(now));
    }

    #[test]
    fn weekday_of_known_dates() {
        assert_eq!(weekday_of(0), 3); // 1970-01-01, Thursday
        assert_eq!(weekday_of(day_bucket(1_772_638_930)), 2); // 2026-03-04, Wednesday
    }
}
