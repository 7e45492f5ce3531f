// SPDX-FileCopyrightText: 2026 LastSeen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedded, numbered schema migrations.
//!
//! SQL files under `migrations/` are compiled in with `embed_migrations!` and
//! applied in version order when the database opens. Refinery records each
//! applied version in `refinery_schema_history`.
//!
//! Databases written by the unversioned bot carry `guilds` and `members`
//! tables with fewer columns. Those are brought up to the V1 layout before
//! the runner starts, so the `IF NOT EXISTS` statements in V1 and every later
//! migration see the columns they expect.

use lastseen_core::LastSeenError;
use rusqlite::{Connection, OptionalExtension};
use tracing::info;

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

/// Columns V1 defines that the unversioned schema lacks, with their definitions.
const LEGACY_GUILD_COLUMNS: &[(&str, &str)] = &[
    ("bot_admin_role_name", "TEXT"),
    ("user_role_required", "INTEGER NOT NULL DEFAULT 0"),
    ("user_role_name", "TEXT"),
    ("track_only_roles", "TEXT NOT NULL DEFAULT '[]'"),
    ("allowed_channels", "TEXT NOT NULL DEFAULT '[]'"),
    ("message_retention_days", "INTEGER NOT NULL DEFAULT 365"),
    ("timezone", "TEXT NOT NULL DEFAULT 'UTC'"),
    ("positions_initialized", "INTEGER NOT NULL DEFAULT 0"),
];

const LEGACY_MEMBER_COLUMNS: &[(&str, &str)] = &[
    ("nickname_history", "TEXT NOT NULL DEFAULT '[]'"),
    ("join_position", "INTEGER"),
    ("left_date", "INTEGER"),
];

/// Apply all pending migrations on `conn`.
pub fn run_migrations(conn: &mut Connection) -> Result<(), LastSeenError> {
    upgrade_unversioned_tables(conn).map_err(LastSeenError::storage)?;

    let report = embedded::migrations::runner()
        .run(conn)
        .map_err(LastSeenError::storage)?;
    let applied = report.applied_migrations();
    if !applied.is_empty() {
        info!(
            count = applied.len(),
            latest = ?applied.last().map(|m| m.version()),
            "schema migrations applied"
        );
    }
    Ok(())
}

/// Add the V1 columns missing from pre-existing `guilds`/`members` tables.
///
/// Runs only while `refinery_schema_history` is absent; once refinery owns the
/// schema, the numbered migrations are the single source of changes.
fn upgrade_unversioned_tables(conn: &Connection) -> rusqlite::Result<()> {
    if table_exists(conn, "refinery_schema_history")? {
        return Ok(());
    }

    let tx = conn.unchecked_transaction()?;
    let mut added = 0usize;
    for (table, wanted) in [
        ("guilds", LEGACY_GUILD_COLUMNS),
        ("members", LEGACY_MEMBER_COLUMNS),
    ] {
        if !table_exists(&tx, table)? {
            continue;
        }
        let present = column_names(&tx, table)?;
        for (column, definition) in wanted {
            if present.iter().any(|c| c.eq_ignore_ascii_case(column)) {
                continue;
            }
            tx.execute_batch(&format!("ALTER TABLE {table} ADD COLUMN {column} {definition}"))?;
            added += 1;
        }
    }
    if table_exists(&tx, "members")? {
        // Unversioned rows stored an empty roles list as NULL.
        tx.execute("UPDATE members SET roles = '[]' WHERE roles IS NULL", [])?;
    }
    tx.commit()?;

    if added > 0 {
        info!(columns = added, "upgraded tables from unversioned schema");
    }
    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |_| Ok(()),
    )
    .optional()
    .map(|found| found.is_some())
}

fn column_names(conn: &Connection, table: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1)")?;
    let names = stmt.query_map([table], |row| row.get(0))?;
    names.collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const UNVERSIONED_SCHEMA: &str = "
        CREATE TABLE guilds (
            guild_id INTEGER PRIMARY KEY,
            guild_name TEXT NOT NULL,
            notification_channel_id INTEGER,
            inactive_days INTEGER DEFAULT 10,
            added_at INTEGER NOT NULL
        );
        CREATE TABLE members (
            guild_id INTEGER NOT NULL,
            user_id INTEGER NOT NULL,
            username TEXT NOT NULL,
            nickname TEXT,
            join_date INTEGER,
            last_seen INTEGER,
            is_active INTEGER DEFAULT 1,
            roles TEXT,
            PRIMARY KEY (guild_id, user_id),
            FOREIGN KEY (guild_id) REFERENCES guilds(guild_id) ON DELETE CASCADE
        );
    ";

    #[test]
    fn fresh_database_reaches_latest_schema() {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();
        let columns = column_names(&conn, "members").unwrap();
        assert!(columns.iter().any(|c| c == "left_date"));
        assert!(column_names(&conn, "guilds").unwrap().iter().any(|c| c == "report_types"));

        // A second open is a no-op.
        run_migrations(&mut conn).unwrap();
    }

    #[test]
    fn unversioned_tables_gain_missing_columns() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(UNVERSIONED_SCHEMA).unwrap();
        conn.execute_batch(
            "INSERT INTO guilds (guild_id, guild_name, inactive_days, added_at) VALUES (1, 'Old', 14, 1);
             INSERT INTO members (guild_id, user_id, username, join_date, last_seen, is_active, roles)
                VALUES (1, 10, 'veteran', 1, 0, 1, NULL);",
        )
        .unwrap();

        run_migrations(&mut conn).unwrap();

        let members = column_names(&conn, "members").unwrap();
        for (column, _) in LEGACY_MEMBER_COLUMNS {
            assert!(members.iter().any(|c| c == column), "missing {column}");
        }
        let (history, roles): (String, String) = conn
            .query_row(
                "SELECT nickname_history, roles FROM members WHERE user_id = 10",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(history, "[]");
        assert_eq!(roles, "[]");

        let (inactive_days, retention): (i64, i64) = conn
            .query_row(
                "SELECT inactive_days, message_retention_days FROM guilds WHERE guild_id = 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(inactive_days, 14);
        assert_eq!(retention, 365);
    }
}
