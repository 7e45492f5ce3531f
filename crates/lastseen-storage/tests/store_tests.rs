// SPDX-FileCopyrightText: 2026 LastSeen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Behavioral tests of the store facade against on-disk databases.

use lastseen_config::model::StorageConfig;
use lastseen_core::time::{SECONDS_PER_DAY, day_bucket};
use lastseen_core::{LastSeen, RoleAction};
use lastseen_storage::{MemberFilter, NewMember, SqliteStore};
use proptest::prelude::*;

// 2026-03-04T15:42:10Z
const NOW: i64 = 1_772_638_930;

fn fixed_now() -> i64 {
    NOW
}

fn config(dir: &tempfile::TempDir) -> StorageConfig {
    StorageConfig {
        database_path: dir.path().join("lastseen.db").display().to_string(),
        wal_mode: true,
        pool_size: 2,
        busy_timeout_ms: 1_000,
    }
}

async fn open_store(dir: &tempfile::TempDir) -> SqliteStore {
    SqliteStore::open(config(dir))
        .await
        .unwrap()
        .with_clock(fixed_now)
}

fn new_member(guild_id: i64, user_id: i64, username: &str, nickname: Option<&str>) -> NewMember {
    NewMember {
        guild_id,
        user_id,
        username: username.to_string(),
        nickname: nickname.map(str::to_string),
        join_date: Some(NOW - 30 * SECONDS_PER_DAY),
        roles: vec!["Member".to_string()],
    }
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

#[tokio::test]
async fn join_offline_message_leave_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;
    let day0 = day_bucket(NOW) - 3 * SECONDS_PER_DAY;
    let user = 42;

    assert!(store.upsert_guild(100, Some("Guild 100")).await);
    assert!(
        store
            .add_member(&NewMember {
                join_date: Some(day0),
                ..new_member(100, user, "walker", None)
            })
            .await
    );
    let joined = store.get_member(100, user).await.unwrap();
    assert_eq!(joined.last_seen, LastSeen::NeverSeen);
    assert!(joined.is_active);
    assert_eq!(joined.roles.as_slice(), ["Member".to_string()]);

    assert!(
        store
            .update_last_seen(100, user, LastSeen::offline_at(day0 + SECONDS_PER_DAY))
            .await
    );
    assert!(
        store
            .increment_message_activity(100, user, day0 + 2 * SECONDS_PER_DAY, 5)
            .await
    );
    assert_eq!(
        store
            .get_message_activity_period(100, Some(user), 30)
            .await
            .total,
        5
    );

    // Active and offline for more than a day: listed until the member leaves.
    assert_eq!(store.get_inactive_members(100, 1).await.len(), 1);
    assert!(store.set_member_inactive(100, user).await);

    let left = store.get_member(100, user).await.unwrap();
    assert!(!left.is_active);
    assert_eq!(left.left_date, Some(NOW));
    assert!(store.get_inactive_members(100, 10).await.is_empty());
    assert!(store.get_inactive_members(100, 1).await.is_empty());
    assert_eq!(store.get_departed_members_period(100, 7).await.len(), 1);
}

#[tokio::test]
async fn role_history_keeps_twenty_newest() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;
    store.add_member(&new_member(1, 7, "roleful", None)).await;

    for i in 0..25 {
        let action = if i % 2 == 0 {
            RoleAction::Added
        } else {
            RoleAction::Removed
        };
        assert!(store.record_role_change(1, 7, &format!("role-{i}"), action).await);
    }

    let history = store.get_role_history(1, 7, 50).await;
    assert_eq!(history.len(), 20);
    assert_eq!(history[0].role_name, "role-24");
    assert_eq!(history[0].action, RoleAction::Added);
    assert_eq!(history[19].role_name, "role-5");

    let limited = store.get_role_history(1, 7, 3).await;
    assert_eq!(limited.len(), 3);
    assert_eq!(limited[2].role_name, "role-22");
}

#[tokio::test]
async fn retention_cutoff_is_exclusive() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;
    store.add_member(&new_member(1, 7, "old", None)).await;

    let cutoff = NOW - 30 * SECONDS_PER_DAY;
    let db = store.database().unwrap();
    db.transact(move |conn| {
        for bucket in [cutoff - SECONDS_PER_DAY, cutoff - 1, cutoff, cutoff + 1] {
            conn.execute(
                "INSERT INTO message_activity (guild_id, user_id, day_bucket, message_count)
                 VALUES (1, 7, ?1, 1)",
                [bucket],
            )?;
        }
        conn.execute(
            "INSERT INTO message_activity_hourly
                (guild_id, user_id, hour_bucket, hour_of_day, message_count)
             VALUES (1, 7, ?1, 0, 1)",
            [cutoff - 1],
        )?;
        Ok(())
    })
    .await
    .unwrap();

    let counts = store.cleanup_old_message_activity(1, 30).await;
    assert_eq!(counts.daily, 2);
    assert_eq!(counts.hourly, 1);

    let remaining: Vec<i64> = db
        .transact(|conn| {
            let mut stmt =
                conn.prepare("SELECT day_bucket FROM message_activity ORDER BY day_bucket")?;
            let rows = stmt.query_map([], |row| row.get(0))?;
            rows.collect::<rusqlite::Result<Vec<i64>>>()
        })
        .await
        .unwrap();
    assert_eq!(remaining, vec![cutoff, cutoff + 1]);
}

#[tokio::test]
async fn cleanup_all_uses_each_guilds_window() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;
    store.add_member(&new_member(1, 7, "short", None)).await;
    store.add_member(&new_member(2, 7, "long", None)).await;
    assert!(store.set_retention_days(1, 7, None).await);

    let ten_days_ago = day_bucket(NOW) - 10 * SECONDS_PER_DAY;
    assert!(store.increment_message_activity(1, 7, ten_days_ago, 3).await);
    assert!(store.increment_message_activity(2, 7, ten_days_ago, 3).await);

    let counts = store.cleanup_all_guilds_message_activity().await;
    assert_eq!(counts.daily, 1);
    assert_eq!(store.get_message_activity_period(1, None, 30).await.total, 0);
    assert_eq!(store.get_message_activity_period(2, None, 30).await.total, 3);
}

#[tokio::test]
async fn orphan_activity_is_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;
    assert!(!store.increment_message_activity(1, 999, NOW, 4).await);
    assert!(!store.increment_message_activity_hourly(1, 999, NOW, 15, 4).await);
    store.add_member(&new_member(1, 999, "late", None)).await;
    assert!(!store.increment_message_activity(1, 999, NOW, 0).await);
    assert!(store.increment_message_activity_hourly(1, 999, NOW, 15, 4).await);
    assert_eq!(store.get_activity_by_hour(1, 7).await[15], 4);
}

#[tokio::test]
async fn setters_keep_known_guild_name() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;

    assert!(store.set_timezone(9, "Europe/Berlin", None).await);
    assert_eq!(store.get_guild_config(9).await.unwrap().guild_name, "Unknown");

    assert!(store.set_notification_channel(9, Some(900), Some("Nine")).await);
    assert_eq!(store.get_guild_config(9).await.unwrap().guild_name, "Nine");

    assert!(store.set_inactive_days(9, 21, Some("Stale")).await);
    assert!(store.upsert_guild(9, Some("Staler")).await);
    let guild = store.get_guild_config(9).await.unwrap();
    assert_eq!(guild.guild_name, "Nine");
    assert_eq!(guild.timezone, "Europe/Berlin");
    assert_eq!(guild.notification_channel_id, Some(900));
    assert_eq!(guild.inactive_days, 21);
}

#[tokio::test]
async fn first_setter_call_names_new_guild() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;

    assert!(store.set_retention_days(12, 90, Some("Twelve")).await);
    let guild = store.get_guild_config(12).await.unwrap();
    assert_eq!(guild.guild_name, "Twelve");
    assert_eq!(guild.message_retention_days, 90);
}

#[tokio::test]
async fn opens_database_from_unversioned_bot() {
    let dir = tempfile::tempdir().unwrap();
    {
        let conn = rusqlite::Connection::open(dir.path().join("lastseen.db")).unwrap();
        conn.execute_batch(
            "CREATE TABLE guilds (
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
            CREATE INDEX idx_members_username ON members(guild_id, username COLLATE NOCASE);
            INSERT INTO guilds VALUES (5, 'Harbor', 77, 14, 1700000000);
            INSERT INTO members VALUES (5, 50, 'keeper', 'Kee', 1700000000, 1772000000, 1, '[\"Member\"]');",
        )
        .unwrap();
    }

    let store = open_store(&dir).await;
    let guild = store.get_guild_config(5).await.unwrap();
    assert_eq!(guild.guild_name, "Harbor");
    assert_eq!(guild.notification_channel_id, Some(77));
    assert_eq!(guild.inactive_days, 14);
    assert_eq!(guild.message_retention_days, 365);

    let member = store.get_member(5, 50).await.unwrap();
    assert_eq!(member.username, "keeper");
    assert_eq!(member.last_seen, LastSeen::OfflineSince(1_772_000_000));
    assert!(member.roles.contains(&"Member".to_string()));
    assert!(member.left_date.is_none());

    assert!(store.update_nickname_history(5, 50, "Kee").await);
    assert!(store.increment_message_activity(5, 50, day_bucket(NOW), 3).await);
    assert_eq!(store.get_message_activity_period(5, Some(50), 1).await.total, 3);
    store.close().await.unwrap();

    // Reopening the upgraded file is a no-op.
    let store = open_store(&dir).await;
    assert!(store.member_exists(5, 50).await);
}

#[tokio::test]
async fn remove_guild_cascades() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;
    store.upsert_guild(3, Some("three")).await;
    store.add_member(&new_member(3, 1, "a", None)).await;
    store.increment_message_activity(3, 1, NOW, 2).await;
    store.record_role_change(3, 1, "Mod", RoleAction::Added).await;

    assert!(store.remove_guild(3).await);
    assert!(store.get_guild_config(3).await.is_none());
    assert!(store.get_all_guild_members(3).await.is_empty());
    assert!(store.get_role_history(3, 1, 10).await.is_empty());
    assert_eq!(store.get_message_activity_period(3, None, 7).await.total, 0);
}

#[tokio::test]
async fn search_filters_combine() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;
    store.add_member(&new_member(1, 1, "alice", Some("Ali"))).await;
    store
        .add_member(&NewMember {
            roles: vec!["Member".into(), "Mod".into()],
            ..new_member(1, 2, "malice", None)
        })
        .await;
    store.add_member(&new_member(1, 3, "bob", None)).await;
    store.set_member_inactive(1, 3).await;

    let by_name = store
        .search_members(
            1,
            &MemberFilter {
                name_contains: Some("LIC".into()),
                ..MemberFilter::default()
            },
        )
        .await;
    assert_eq!(by_name.len(), 2);

    let mods = store
        .search_members(
            1,
            &MemberFilter {
                name_contains: Some("lic".into()),
                role: Some("Mod".into()),
                ..MemberFilter::default()
            },
        )
        .await;
    assert_eq!(mods.len(), 1);
    assert_eq!(mods[0].user_id, 2);

    let departed = store
        .search_members(
            1,
            &MemberFilter {
                active: Some(false),
                ..MemberFilter::default()
            },
        )
        .await;
    assert_eq!(departed.len(), 1);
    assert_eq!(departed[0].username, "bob");
}

#[tokio::test]
async fn find_prefers_active_then_most_recent() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;
    for (user_id, seen) in [(1, NOW - 500), (2, NOW - 100), (3, NOW - 50)] {
        store.add_member(&new_member(1, user_id, "twin", None)).await;
        store
            .update_last_seen(1, user_id, LastSeen::offline_at(seen))
            .await;
    }
    store.set_member_inactive(1, 3).await;
    assert_eq!(store.find_member_by_name(1, "TWIN").await.unwrap().user_id, 2);

    store.update_last_seen(1, 1, LastSeen::OnlineNow).await;
    assert_eq!(store.find_member_by_name(1, "twin").await.unwrap().user_id, 1);
    assert!(store.find_member_by_name(1, "nobody").await.is_none());
}

#[tokio::test]
async fn backup_and_rotation_through_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;
    store.upsert_guild(1, Some("one")).await;

    let folder = dir.path().join("backups");
    let snapshot = store.create_backup(&folder).await.unwrap();
    assert!(snapshot.ends_with("lastseen_backup_20260304_154210.db"));
    assert_eq!(store.cleanup_old_backups(&folder, 5).await, 0);
    assert_eq!(store.cleanup_old_backups(&folder, 0).await, 1);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn find_by_username_nickname_or_id(
        username in "[a-z]{3,12}",
        nickname in "[A-Za-z]{3,12}",
        user_id in 1_000i64..1_000_000,
        upper in any::<bool>(),
    ) {
        runtime().block_on(async {
            let dir = tempfile::tempdir().unwrap();
            let store = open_store(&dir).await;
            store.add_member(&new_member(1, 1, "zz_other", Some("zz_nick"))).await;
            store.add_member(&new_member(1, user_id, &username, Some(&nickname))).await;

            let name_term = if upper { username.to_uppercase() } else { username.clone() };
            let nick_term = if upper { nickname.to_lowercase() } else { nickname.to_uppercase() };
            for term in [name_term, nick_term, user_id.to_string()] {
                let found = store.find_member_by_name(1, &term).await;
                prop_assert_eq!(found.map(|m| m.user_id), Some(user_id));
            }
            Ok(())
        })?;
    }

    #[test]
    fn online_members_are_never_inactive(days in 0i64..400, earlier_offline in any::<bool>()) {
        runtime().block_on(async {
            let dir = tempfile::tempdir().unwrap();
            let store = open_store(&dir).await;
            store.add_member(&new_member(1, 5, "present", None)).await;
            if earlier_offline {
                store.update_last_seen(1, 5, LastSeen::offline_at(NOW - 500 * SECONDS_PER_DAY)).await;
            }
            store.update_last_seen(1, 5, LastSeen::OnlineNow).await;
            let inactive = store.get_inactive_members(1, days).await;
            prop_assert!(inactive.iter().all(|m| m.user_id != 5));
            Ok(())
        })?;
    }

    #[test]
    fn increments_aggregate_like_one_write(n in 1i64..40) {
        runtime().block_on(async {
            let dir = tempfile::tempdir().unwrap();
            let store = open_store(&dir).await;
            store.add_member(&new_member(1, 1, "many", None)).await;
            store.add_member(&new_member(1, 2, "once", None)).await;
            for _ in 0..n {
                store.increment_message_activity(1, 1, NOW, 1).await;
            }
            store.increment_message_activity(1, 2, NOW, n).await;

            let many = store.get_message_activity_period(1, Some(1), 1).await;
            let once = store.get_message_activity_period(1, Some(2), 1).await;
            prop_assert_eq!(many.total, n);
            prop_assert_eq!(many, once);
            Ok(())
        })?;
    }
}
