// SPDX-FileCopyrightText: 2026 LastSeen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Member records: creation, partial updates, presence, and lookups.

use lastseen_core::time::days_ago;
use lastseen_core::types::MemberRoles;
use lastseen_core::{LastSeen, LastSeenError, Member, NicknameHistory};
use rusqlite::types::Value;
use rusqlite::{Connection, Row, params, params_from_iter};

use crate::database::Database;
use crate::models::{MemberFilter, NewMember};
use crate::queries::{decode_list, optional};

pub(crate) const MEMBER_COLUMNS: &str = "guild_id, user_id, username, nickname, nickname_history,
    join_date, join_position, last_seen, is_active, left_date, roles";

pub(crate) fn member_from_row(row: &Row<'_>) -> rusqlite::Result<Member> {
    Ok(Member {
        guild_id: row.get(0)?,
        user_id: row.get(1)?,
        username: row.get(2)?,
        nickname: row.get(3)?,
        nickname_history: decode_list("nickname_history", row.get(4)?, NicknameHistory::from_json),
        join_date: row.get(5)?,
        join_position: row.get(6)?,
        last_seen: LastSeen::from_column(row.get(7)?),
        is_active: row.get(8)?,
        left_date: row.get(9)?,
        roles: decode_list("roles", row.get(10)?, MemberRoles::from_json),
    })
}

fn query_members(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> rusqlite::Result<Vec<Member>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, member_from_row)?;
    rows.collect()
}

pub(crate) fn exists(conn: &Connection, guild_id: i64, user_id: i64) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM members WHERE guild_id = ?1 AND user_id = ?2)",
        params![guild_id, user_id],
        |row| row.get(0),
    )
}

/// Create a member, or replace the profile of an existing one.
///
/// Replacing resets presence to never-seen and marks the member active again,
/// but keeps the nickname history and join position. Genuinely new members get
/// the next join position when the guild's positions have been initialized.
pub async fn add_member(db: &Database, member: &NewMember) -> Result<bool, LastSeenError> {
    let member = member.clone();
    db.transact(move |conn| {
        let is_new = !exists(conn, member.guild_id, member.user_id)?;
        let position = if is_new {
            optional(conn.query_row(
                "SELECT CASE WHEN g.positions_initialized = 1
                        THEN (SELECT COALESCE(MAX(join_position), 0) + 1
                              FROM members WHERE guild_id = g.guild_id)
                        END
                 FROM guilds g WHERE g.guild_id = ?1",
                params![member.guild_id],
                |row| row.get::<_, Option<i64>>(0),
            ))?
            .flatten()
        } else {
            None
        };

        let mut history = NicknameHistory::new();
        if let Some(nick) = &member.nickname {
            history.push(nick);
        }
        let roles: MemberRoles = member.roles.iter().cloned().collect();

        conn.execute(
            "INSERT INTO members
                (guild_id, user_id, username, nickname, nickname_history, join_date,
                 join_position, last_seen, is_active, left_date, roles)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL, 1, NULL, ?8)
             ON CONFLICT(guild_id, user_id) DO UPDATE SET
                username = excluded.username,
                nickname = excluded.nickname,
                join_date = excluded.join_date,
                last_seen = NULL,
                is_active = 1,
                left_date = NULL,
                roles = excluded.roles",
            params![
                member.guild_id,
                member.user_id,
                member.username,
                member.nickname,
                history.to_json(),
                member.join_date,
                position,
                roles.to_json(),
            ],
        )?;
        Ok(true)
    })
    .await
}

pub async fn get_member(
    db: &Database,
    guild_id: i64,
    user_id: i64,
) -> Result<Option<Member>, LastSeenError> {
    db.transact(move |conn| {
        let sql = format!("SELECT {MEMBER_COLUMNS} FROM members WHERE guild_id = ?1 AND user_id = ?2");
        optional(conn.query_row(&sql, params![guild_id, user_id], member_from_row))
    })
    .await
}

pub async fn member_exists(db: &Database, guild_id: i64, user_id: i64) -> Result<bool, LastSeenError> {
    db.transact(move |conn| exists(conn, guild_id, user_id)).await
}

async fn update_one<P>(
    db: &Database,
    sql: &'static str,
    params: P,
) -> Result<bool, LastSeenError>
where
    P: rusqlite::Params + Send + 'static,
{
    db.transact(move |conn| Ok(conn.execute(sql, params)? > 0))
        .await
}

pub async fn update_member_username(
    db: &Database,
    guild_id: i64,
    user_id: i64,
    username: &str,
) -> Result<bool, LastSeenError> {
    update_one(
        db,
        "UPDATE members SET username = ?3 WHERE guild_id = ?1 AND user_id = ?2",
        (guild_id, user_id, username.to_string()),
    )
    .await
}

pub async fn update_member_nickname(
    db: &Database,
    guild_id: i64,
    user_id: i64,
    nickname: Option<&str>,
) -> Result<bool, LastSeenError> {
    update_one(
        db,
        "UPDATE members SET nickname = ?3 WHERE guild_id = ?1 AND user_id = ?2",
        (guild_id, user_id, nickname.map(str::to_string)),
    )
    .await
}

pub async fn update_member_roles(
    db: &Database,
    guild_id: i64,
    user_id: i64,
    roles: &[String],
) -> Result<bool, LastSeenError> {
    let roles: MemberRoles = roles.iter().cloned().collect();
    update_one(
        db,
        "UPDATE members SET roles = ?3 WHERE guild_id = ?1 AND user_id = ?2",
        (guild_id, user_id, roles.to_json()),
    )
    .await
}

/// Append a nickname to the member's history.
///
/// Returns `false` when the member is unknown or the nickname already is the
/// latest entry.
pub async fn update_nickname_history(
    db: &Database,
    guild_id: i64,
    user_id: i64,
    nickname: &str,
) -> Result<bool, LastSeenError> {
    let nickname = nickname.to_string();
    db.transact(move |conn| {
        let raw: Option<Option<String>> = optional(conn.query_row(
            "SELECT nickname_history FROM members WHERE guild_id = ?1 AND user_id = ?2",
            params![guild_id, user_id],
            |row| row.get(0),
        ))?;
        let Some(raw) = raw else {
            return Ok(false);
        };
        let mut history = decode_list("nickname_history", raw, NicknameHistory::from_json);
        if !history.push(&nickname) {
            return Ok(false);
        }
        conn.execute(
            "UPDATE members SET nickname_history = ?3 WHERE guild_id = ?1 AND user_id = ?2",
            params![guild_id, user_id, history.to_json()],
        )?;
        Ok(true)
    })
    .await
}

pub async fn update_last_seen(
    db: &Database,
    guild_id: i64,
    user_id: i64,
    state: LastSeen,
) -> Result<bool, LastSeenError> {
    update_one(
        db,
        "UPDATE members SET last_seen = ?3 WHERE guild_id = ?1 AND user_id = ?2",
        (guild_id, user_id, state.to_column()),
    )
    .await
}

/// Mark a member as present again after a rejoin.
pub async fn set_member_active(
    db: &Database,
    guild_id: i64,
    user_id: i64,
) -> Result<bool, LastSeenError> {
    update_one(
        db,
        "UPDATE members SET is_active = 1, left_date = NULL WHERE guild_id = ?1 AND user_id = ?2",
        (guild_id, user_id),
    )
    .await
}

/// Mark a member as departed at `left_at`.
pub async fn set_member_inactive(
    db: &Database,
    guild_id: i64,
    user_id: i64,
    left_at: i64,
) -> Result<bool, LastSeenError> {
    update_one(
        db,
        "UPDATE members SET is_active = 0, left_date = ?3 WHERE guild_id = ?1 AND user_id = ?2",
        (guild_id, user_id, left_at),
    )
    .await
}

/// Find a member by username, nickname (both case-insensitive), or exact user id.
///
/// Among several matches, active members win, then the one online now, then
/// the most recently offline, then the lowest user id.
pub async fn find_member_by_name(
    db: &Database,
    guild_id: i64,
    term: &str,
) -> Result<Option<Member>, LastSeenError> {
    let term = term.trim().to_string();
    if term.is_empty() {
        return Ok(None);
    }
    db.transact(move |conn| {
        let sql = format!(
            "SELECT {MEMBER_COLUMNS} FROM members
             WHERE guild_id = ?1 AND (
                LOWER(username) = LOWER(?2)
                OR LOWER(nickname) = LOWER(?2)
                OR CAST(user_id AS TEXT) = ?2
             )
             ORDER BY is_active DESC,
                CASE WHEN last_seen = 0 THEN 0 WHEN last_seen > 0 THEN 1 ELSE 2 END,
                last_seen DESC,
                user_id ASC
             LIMIT 1"
        );
        optional(conn.query_row(&sql, params![guild_id, term], member_from_row))
    })
    .await
}

/// Active members offline since at least `days` days before `now`, oldest first.
///
/// Never-seen and currently-online members are excluded by construction.
pub async fn get_inactive_members(
    db: &Database,
    guild_id: i64,
    days: i64,
    now: i64,
) -> Result<Vec<Member>, LastSeenError> {
    let threshold = days_ago(now, days);
    db.transact(move |conn| {
        let sql = format!(
            "SELECT {MEMBER_COLUMNS} FROM members
             WHERE guild_id = ?1 AND is_active = 1
               AND last_seen IS NOT NULL AND last_seen > 0 AND last_seen <= ?2
             ORDER BY last_seen ASC, user_id ASC"
        );
        query_members(conn, &sql, params![guild_id, threshold])
    })
    .await
}

pub async fn get_all_guild_members(
    db: &Database,
    guild_id: i64,
) -> Result<Vec<Member>, LastSeenError> {
    db.transact(move |conn| {
        let sql = format!(
            "SELECT {MEMBER_COLUMNS} FROM members WHERE guild_id = ?1
             ORDER BY join_position IS NULL, join_position, user_id"
        );
        query_members(conn, &sql, params![guild_id])
    })
    .await
}

fn like_pattern(needle: &str) -> String {
    let escaped = needle
        .to_lowercase()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

/// Members matching every set criterion of `filter`, ordered by username.
pub async fn search_members(
    db: &Database,
    guild_id: i64,
    filter: &MemberFilter,
) -> Result<Vec<Member>, LastSeenError> {
    let mut clauses = vec!["guild_id = ?".to_string()];
    let mut values = vec![Value::Integer(guild_id)];

    if let Some(name) = filter.name_contains.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        clauses.push(
            "(LOWER(username) LIKE ? ESCAPE '\\' OR LOWER(COALESCE(nickname, '')) LIKE ? ESCAPE '\\')"
                .to_string(),
        );
        let pattern = like_pattern(name);
        values.push(Value::Text(pattern.clone()));
        values.push(Value::Text(pattern));
    }
    if let Some(role) = &filter.role {
        clauses.push("EXISTS (SELECT 1 FROM json_each(members.roles) WHERE value = ?)".to_string());
        values.push(Value::Text(role.clone()));
    }
    if let Some(active) = filter.active {
        clauses.push("is_active = ?".to_string());
        values.push(Value::Integer(i64::from(active)));
    }
    if let Some(after) = filter.joined_after {
        clauses.push("join_date >= ?".to_string());
        values.push(Value::Integer(after));
    }
    if let Some(before) = filter.joined_before {
        clauses.push("join_date <= ?".to_string());
        values.push(Value::Integer(before));
    }

    let mut sql = format!(
        "SELECT {MEMBER_COLUMNS} FROM members WHERE {} ORDER BY LOWER(username), user_id",
        clauses.join(" AND ")
    );
    if let Some(limit) = filter.limit {
        sql.push_str(" LIMIT ?");
        values.push(Value::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
    }

    db.transact(move |conn| query_members(conn, &sql, params_from_iter(values)))
        .await
}

/// Rank members by join date (ties and unknown dates by user id) and mark the
/// guild's positions as initialized. Returns the number of ranked members.
pub async fn recalculate_join_positions(db: &Database, guild_id: i64) -> Result<usize, LastSeenError> {
    db.transact(move |conn| {
        let ids: Vec<i64> = {
            let mut stmt = conn.prepare(
                "SELECT user_id FROM members WHERE guild_id = ?1
                 ORDER BY join_date IS NULL, join_date, user_id",
            )?;
            let rows = stmt.query_map(params![guild_id], |row| row.get(0))?;
            rows.collect::<rusqlite::Result<_>>()?
        };
        let mut update = conn.prepare(
            "UPDATE members SET join_position = ?3 WHERE guild_id = ?1 AND user_id = ?2",
        )?;
        for (rank, user_id) in ids.iter().enumerate() {
            update.execute(params![guild_id, user_id, rank as i64 + 1])?;
        }
        conn.execute(
            "UPDATE guilds SET positions_initialized = 1 WHERE guild_id = ?1",
            params![guild_id],
        )?;
        Ok(ids.len())
    })
    .await
}

/// Members who joined within the last `days` days, earliest first.
pub async fn get_new_members_period(
    db: &Database,
    guild_id: i64,
    days: i64,
    now: i64,
) -> Result<Vec<Member>, LastSeenError> {
    let since = days_ago(now, days);
    db.transact(move |conn| {
        let sql = format!(
            "SELECT {MEMBER_COLUMNS} FROM members
             WHERE guild_id = ?1 AND join_date >= ?2
             ORDER BY join_date ASC, user_id ASC"
        );
        query_members(conn, &sql, params![guild_id, since])
    })
    .await
}

/// Members who left within the last `days` days, most recent first.
pub async fn get_departed_members_period(
    db: &Database,
    guild_id: i64,
    days: i64,
    now: i64,
) -> Result<Vec<Member>, LastSeenError> {
    let since = days_ago(now, days);
    db.transact(move |conn| {
        let sql = format!(
            "SELECT {MEMBER_COLUMNS} FROM members
             WHERE guild_id = ?1 AND is_active = 0 AND left_date >= ?2
             ORDER BY left_date DESC, user_id ASC"
        );
        query_members(conn, &sql, params![guild_id, since])
    })
    .await
}
