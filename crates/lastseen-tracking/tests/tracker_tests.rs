// SPDX-FileCopyrightText: 2026 LastSeen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Event mapping against a real on-disk store.

use std::sync::Arc;

use lastseen_config::model::StorageConfig;
use lastseen_core::time::SECONDS_PER_DAY;
use lastseen_core::{ChannelFilter, LastSeen, RoleAction, RoleFilter};
use lastseen_storage::SqliteStore;
use lastseen_tracking::{ActivityBuffer, BufferSettings, MemberSnapshot, Tracker};

// 2026-03-04T15:42:10Z
const NOW: i64 = 1_772_638_930;

fn fixed_now() -> i64 {
    NOW
}

struct Fixture {
    _dir: tempfile::TempDir,
    store: Arc<SqliteStore>,
    tracker: Tracker,
}

async fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let config = StorageConfig {
        database_path: dir.path().join("tracker.db").display().to_string(),
        wal_mode: true,
        pool_size: 2,
        busy_timeout_ms: 1_000,
    };
    let store = Arc::new(SqliteStore::open(config).await.unwrap().with_clock(fixed_now));
    let buffer = Arc::new(ActivityBuffer::new(store.clone(), BufferSettings::default()));
    let tracker = Tracker::new(store.clone(), buffer);
    Fixture {
        _dir: dir,
        store,
        tracker,
    }
}

fn snapshot(user_id: i64, username: &str, roles: &[&str]) -> MemberSnapshot {
    MemberSnapshot {
        guild_id: 10,
        user_id,
        username: username.to_string(),
        nickname: None,
        joined_at: Some(NOW - user_id * SECONDS_PER_DAY),
        roles: roles.iter().map(|r| r.to_string()).collect(),
        bot: false,
    }
}

#[tokio::test]
async fn guild_sync_adds_refreshes_and_ranks() {
    let f = fixture().await;
    let members = vec![
        snapshot(1, "oldest", &["Member"]),
        snapshot(2, "newer", &[]),
        MemberSnapshot {
            bot: true,
            ..snapshot(3, "robot", &[])
        },
    ];

    let first = f.tracker.guild_available(10, "Ten", &members).await;
    assert_eq!(first.added, 2);
    assert_eq!(first.skipped, 1);
    assert_eq!(first.positions_assigned, 2);
    assert!(f.store.get_member(10, 3).await.is_none());

    let renamed = vec![MemberSnapshot {
        nickname: Some("Elder".into()),
        ..snapshot(1, "oldest_renamed", &["Member"])
    }];
    let second = f.tracker.guild_available(10, "Ten", &renamed).await;
    assert_eq!(second.refreshed, 1);
    assert_eq!(second.positions_assigned, 0);

    let member = f.store.get_member(10, 1).await.unwrap();
    assert_eq!(member.username, "oldest_renamed");
    assert_eq!(member.nickname.as_deref(), Some("Elder"));
    assert_eq!(member.nickname_history.latest(), Some("Elder"));
    // Higher ids joined earlier, so member 2 ranks first.
    assert_eq!(f.store.get_member(10, 2).await.unwrap().join_position, Some(1));
}

#[tokio::test]
async fn track_only_roles_limit_new_members() {
    let f = fixture().await;
    f.store.upsert_guild(10, Some("Ten")).await;
    let only_members: RoleFilter = ["Member".to_string()].into_iter().collect();
    assert!(f.store.set_track_only_roles(10, &only_members, None).await);

    let sync = f
        .tracker
        .guild_available(
            10,
            "Ten",
            &[snapshot(1, "in", &["Member"]), snapshot(2, "out", &["Guest"])],
        )
        .await;
    assert_eq!(sync.added, 1);
    assert!(!f.store.member_exists(10, 2).await);

    let promoted = f
        .tracker
        .member_updated(None, &snapshot(2, "out", &["Guest", "Member"]))
        .await;
    assert!(promoted.added);
    assert!(f.store.member_exists(10, 2).await);
}

#[tokio::test]
async fn leave_and_rejoin_keep_history() {
    let f = fixture().await;
    f.store.upsert_guild(10, Some("Ten")).await;
    f.store.set_notification_channel(10, Some(555), None).await;

    assert!(!f.tracker.member_joined(&snapshot(4, "wanderer", &[])).await);
    f.tracker
        .member_updated(
            None,
            &MemberSnapshot {
                nickname: Some("Wandy".into()),
                ..snapshot(4, "wanderer", &[])
            },
        )
        .await;

    let notice = f.tracker.member_left(10, 4).await.unwrap();
    assert_eq!(notice.channel_id, Some(555));
    assert!(!notice.member.is_active);
    assert_eq!(notice.member.left_date, Some(NOW));

    assert!(f.tracker.member_joined(&snapshot(4, "wanderer", &[])).await);
    let back = f.store.get_member(10, 4).await.unwrap();
    assert!(back.is_active);
    assert_eq!(back.left_date, None);
    assert_eq!(back.nickname_history.entries(), ["Wandy".to_string()]);

    assert!(f.tracker.member_left(10, 999).await.is_none());
}

#[tokio::test]
async fn role_diff_is_logged_per_role() {
    let f = fixture().await;
    f.tracker.member_joined(&snapshot(5, "climber", &["Member", "Guest"])).await;

    let before = snapshot(5, "climber", &["Member", "Guest"]);
    let after = snapshot(5, "climber", &["Member", "Mod", "Helper"]);
    let changes = f.tracker.member_updated(Some(&before), &after).await;
    assert_eq!(changes.roles_added, vec!["Mod".to_string(), "Helper".to_string()]);
    assert_eq!(changes.roles_removed, vec!["Guest".to_string()]);

    let stored = f.store.get_member(10, 5).await.unwrap();
    assert_eq!(stored.roles.as_slice(), after.roles.as_slice());

    let history = f.store.get_role_history(10, 5, 10).await;
    assert_eq!(history.len(), 3);
    assert_eq!(
        history.iter().filter(|c| c.action == RoleAction::Added).count(),
        2
    );

    let unchanged = f.tracker.member_updated(Some(&after), &after).await;
    assert!(unchanged.is_empty());
}

#[tokio::test]
async fn presence_and_rename() {
    let f = fixture().await;
    f.tracker.member_joined(&snapshot(6, "flicker", &[])).await;

    assert!(f.tracker.presence_changed(10, 6, true).await);
    assert_eq!(
        f.store.get_member(10, 6).await.unwrap().last_seen,
        LastSeen::OnlineNow
    );
    assert!(f.tracker.presence_changed(10, 6, false).await);
    assert_eq!(
        f.store.get_member(10, 6).await.unwrap().last_seen,
        LastSeen::OfflineSince(NOW)
    );
    assert!(!f.tracker.presence_changed(10, 404, true).await);

    // Went offline an hour ago; a repeated offline update keeps that time.
    let earlier = LastSeen::OfflineSince(NOW - 3_600);
    assert!(f.store.update_last_seen(10, 6, earlier).await);
    assert!(f.tracker.presence_changed(10, 6, false).await);
    assert_eq!(f.store.get_member(10, 6).await.unwrap().last_seen, earlier);

    assert_eq!(f.tracker.user_renamed(6, "flicker2", &[10, 11]).await, 1);
    assert_eq!(f.store.get_member(10, 6).await.unwrap().username, "flicker2");
}

#[tokio::test]
async fn messages_respect_allowed_channels() {
    let f = fixture().await;
    f.tracker.member_joined(&snapshot(7, "chatty", &[])).await;

    assert!(f.tracker.message_sent(10, 100, 7, NOW).await);

    let allowed: ChannelFilter = [200_i64].into_iter().collect();
    f.store.set_allowed_channels(10, &allowed, None).await;
    // The cached filter still admits everything until invalidated.
    assert!(f.tracker.message_sent(10, 100, 7, NOW).await);
    f.tracker.invalidate_guild(10);
    assert!(!f.tracker.message_sent(10, 100, 7, NOW).await);
    assert!(f.tracker.message_sent(10, 200, 7, NOW).await);

    // Changing the setting through the tracker takes effect at once.
    let reopened: ChannelFilter = [100_i64].into_iter().collect();
    assert!(f.tracker.set_allowed_channels(10, &reopened, Some("Ten")).await);
    assert!(f.tracker.message_sent(10, 100, 7, NOW).await);
    assert!(!f.tracker.message_sent(10, 200, 7, NOW).await);

    let report = f.tracker.buffer().flush().await;
    assert_eq!(report.delivered, 2);
    let period = f.store.get_message_activity_period(10, Some(7), 1).await;
    assert_eq!(period.total, 4);
}

#[tokio::test]
async fn chunked_member_lists_rank_after_last_chunk() {
    let f = fixture().await;
    f.tracker
        .guild_available(10, "Ten", &[snapshot(1, "online", &[])])
        .await;
    assert_eq!(f.store.get_member(10, 1).await.unwrap().join_position, Some(1));

    let first = f
        .tracker
        .members_chunk(10, &[snapshot(3, "veteran", &[]), snapshot(1, "online", &[])], false)
        .await;
    assert_eq!((first.added, first.refreshed, first.positions_assigned), (1, 1, 0));

    let last = f
        .tracker
        .members_chunk(10, &[snapshot(2, "middle", &[])], true)
        .await;
    assert_eq!(last.positions_assigned, 3);
    assert_eq!(f.store.get_member(10, 3).await.unwrap().join_position, Some(1));
    assert_eq!(f.store.get_member(10, 1).await.unwrap().join_position, Some(3));
}
