// SPDX-FileCopyrightText: 2026 LastSeen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Maintenance jobs against an on-disk store.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use lastseen_config::model::{BackupConfig, StorageConfig};
use lastseen_core::time::{SECONDS_PER_DAY, day_bucket};
use lastseen_core::{
    LastSeenError, ReportCadence, ReportFrequency, ReportKind, ReportPublisher, ReportSchedule,
};
use lastseen_cron::{BackupJob, BackupOutcome, ReportJob, RetentionJob, build_report};
use lastseen_storage::{NewMember, SqliteStore};

// Wednesday 2026-03-04T15:42:10Z
const NOW: i64 = 1_772_638_930;

fn fixed_now() -> i64 {
    NOW
}

/// Records every published body; fails for the listed channels.
#[derive(Default)]
struct RecordingPublisher {
    sent: Mutex<Vec<(i64, i64, String)>>,
    failing_channels: Vec<i64>,
}

#[async_trait]
impl ReportPublisher for RecordingPublisher {
    async fn publish(&self, guild_id: i64, channel_id: i64, body: &str) -> Result<(), LastSeenError> {
        if self.failing_channels.contains(&channel_id) {
            return Err(LastSeenError::Channel {
                message: format!("channel {channel_id} unavailable"),
                source: None,
            });
        }
        self.sent
            .lock()
            .unwrap()
            .push((guild_id, channel_id, body.to_string()));
        Ok(())
    }
}

async fn open_store(dir: &tempfile::TempDir) -> Arc<SqliteStore> {
    let config = StorageConfig {
        database_path: dir.path().join("jobs.db").display().to_string(),
        wal_mode: true,
        pool_size: 2,
        busy_timeout_ms: 1_000,
    };
    Arc::new(SqliteStore::open(config).await.unwrap().with_clock(fixed_now))
}

fn member(guild_id: i64, user_id: i64, username: &str, joined_days_ago: i64) -> NewMember {
    NewMember {
        guild_id,
        user_id,
        username: username.to_string(),
        nickname: None,
        join_date: Some(NOW - joined_days_ago * SECONDS_PER_DAY),
        roles: Vec::new(),
    }
}

fn weekly_on_wednesday(channel_id: Option<i64>) -> ReportSchedule {
    ReportSchedule {
        enabled: true,
        frequency: ReportFrequency::Weekly,
        weekly_day: 2,
        channel_id,
        ..ReportSchedule::default()
    }
}

#[tokio::test]
async fn report_body_lists_activity_members_and_departures() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;
    store.upsert_guild(1, Some("Harbor")).await;
    store.add_member(&member(1, 10, "anchor", 100)).await;
    store.add_member(&member(1, 11, "buoy", 2)).await;
    store.add_member(&member(1, 12, "drifter", 50)).await;
    store.set_member_inactive(1, 12).await;
    store
        .increment_message_activity(1, 10, day_bucket(NOW), 9)
        .await;
    store
        .increment_message_activity(1, 11, day_bucket(NOW) - SECONDS_PER_DAY, 4)
        .await;

    let guild = store.get_guild_config(1).await.unwrap();
    let body = build_report(&store, &guild, ReportCadence::Weekly).await;

    assert!(body.starts_with("Weekly report for Harbor (last 7 days"));
    assert!(body.contains("Messages: 13"));
    assert!(body.contains("Busiest day: Wednesday (9 messages)"));
    assert!(body.contains("1. anchor - 9 messages"));
    assert!(body.contains("2. buoy - 4 messages"));
    assert!(body.contains("New members: 1\n  buoy"));
    assert!(body.contains("Departures: 1\n  drifter (left 2026-03-04)"));
}

#[tokio::test]
async fn report_sections_follow_subscribed_types() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;
    store.upsert_guild(1, Some("Harbor")).await;
    let schedule = ReportSchedule {
        types: [ReportKind::Departures].into_iter().collect(),
        ..weekly_on_wednesday(Some(7))
    };
    assert!(store.set_report_config(1, &schedule, None).await);

    let guild = store.get_guild_config(1).await.unwrap();
    let body = build_report(&store, &guild, ReportCadence::Weekly).await;
    assert!(body.contains("Departures: 0"));
    assert!(!body.contains("Activity"));
    assert!(!body.contains("New members"));
}

#[tokio::test]
async fn long_member_lists_are_truncated() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;
    store.upsert_guild(1, Some("Harbor")).await;
    for id in 0..30 {
        store.add_member(&member(1, 100 + id, &format!("new{id:02}"), 1)).await;
    }
    let guild = store.get_guild_config(1).await.unwrap();
    let body = build_report(&store, &guild, ReportCadence::Monthly).await;
    assert!(body.contains("New members: 30"));
    assert!(body.contains("...and 5 more"));
    assert!(!body.contains("new29"));
}

#[tokio::test]
async fn report_job_sends_once_per_day() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;
    store.upsert_guild(1, Some("Harbor")).await;
    store.set_report_config(1, &weekly_on_wednesday(Some(70)), None).await;
    // Falls back to the notification channel.
    store.upsert_guild(2, Some("Dock")).await;
    store.set_report_config(2, &weekly_on_wednesday(None), None).await;
    store.set_notification_channel(2, Some(80), None).await;
    // Due, but nowhere to post.
    store.upsert_guild(3, Some("Pier")).await;
    store.set_report_config(3, &weekly_on_wednesday(None), None).await;
    // Scheduled for another day.
    store.upsert_guild(4, Some("Quay")).await;
    store
        .set_report_config(
            4,
            &ReportSchedule {
                weekly_day: 5,
                ..weekly_on_wednesday(Some(90))
            },
            None,
        )
        .await;

    let publisher = Arc::new(RecordingPublisher::default());
    let job = ReportJob::new(store.clone(), publisher.clone());

    let first = job.run().await;
    assert_eq!((first.sent, first.failed, first.skipped), (2, 0, 1));
    assert_eq!(first.unstamped, 0);
    let channels: Vec<i64> = publisher.sent.lock().unwrap().iter().map(|s| s.1).collect();
    assert_eq!(channels.len(), 2);
    assert!(channels.contains(&70) && channels.contains(&80));
    assert_eq!(
        store.get_guild_config(1).await.unwrap().reports.last_weekly_sent,
        Some(NOW)
    );

    let second = job.run().await;
    assert_eq!(second.sent, 0);
    assert_eq!(publisher.sent.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn failed_delivery_is_retried_next_run() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;
    store.upsert_guild(1, Some("Harbor")).await;
    store.set_report_config(1, &weekly_on_wednesday(Some(70)), None).await;

    let publisher = Arc::new(RecordingPublisher {
        failing_channels: vec![70],
        ..RecordingPublisher::default()
    });
    let job = ReportJob::new(store.clone(), publisher);

    assert_eq!(job.run().await.failed, 1);
    assert_eq!(
        store.get_guild_config(1).await.unwrap().reports.last_weekly_sent,
        None
    );
    assert_eq!(job.run().await.failed, 1);
}

/// Deletes the guild while its report is being delivered.
struct RemovingPublisher {
    store: Arc<SqliteStore>,
}

#[async_trait]
impl ReportPublisher for RemovingPublisher {
    async fn publish(&self, guild_id: i64, _channel_id: i64, _body: &str) -> Result<(), LastSeenError> {
        assert!(self.store.remove_guild(guild_id).await);
        Ok(())
    }
}

#[tokio::test]
async fn unstamped_report_is_counted() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;
    store.upsert_guild(1, Some("Harbor")).await;
    store.set_report_config(1, &weekly_on_wednesday(Some(70)), None).await;

    let job = ReportJob::new(
        store.clone(),
        Arc::new(RemovingPublisher {
            store: store.clone(),
        }),
    );
    let run = job.run().await;
    assert_eq!((run.sent, run.unstamped), (1, 1));
}

#[tokio::test]
async fn retention_job_uses_guild_windows() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;
    store.upsert_guild(1, Some("Harbor")).await;
    store.set_retention_days(1, 30, None).await;
    store.add_member(&member(1, 10, "anchor", 400)).await;

    let old = day_bucket(NOW) - 60 * SECONDS_PER_DAY;
    store.increment_message_activity(1, 10, old, 3).await;
    store.increment_message_activity(1, 10, day_bucket(NOW), 1).await;

    let counts = RetentionJob::new(store.clone()).run().await;
    assert_eq!(counts.daily, 1);
    assert_eq!(
        store.get_message_activity_period(1, Some(10), 365).await.total,
        1
    );
    assert_eq!(RetentionJob::new(store).run().await.total(), 0);
}

#[tokio::test(start_paused = true)]
async fn backup_job_respects_interval_and_rotation() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;
    store.upsert_guild(1, Some("Harbor")).await;
    let folder = dir.path().join("snapshots");
    let job = BackupJob::new(
        store,
        BackupConfig {
            enabled: true,
            folder: folder.display().to_string(),
            interval_hours: 1,
            retention_count: 1,
        },
    );

    let BackupOutcome::Created { path, rotated } = job.check().await else {
        panic!("first check should back up");
    };
    assert!(path.exists());
    assert_eq!(rotated, 0);
    assert_eq!(
        path.file_name().unwrap().to_str().unwrap(),
        "lastseen_backup_20260304_154210.db"
    );

    assert_eq!(job.check().await, BackupOutcome::NotDue);

    // An older snapshot from a previous run gets rotated out.
    std::fs::copy(&path, folder.join("lastseen_backup_20250101_000000.db")).unwrap();
    let past = std::time::SystemTime::now() - std::time::Duration::from_secs(86_400);
    std::fs::File::options()
        .write(true)
        .open(folder.join("lastseen_backup_20250101_000000.db"))
        .unwrap()
        .set_modified(past)
        .unwrap();

    tokio::time::advance(std::time::Duration::from_secs(3_601)).await;
    let outcome = job.check().await;
    assert_eq!(
        outcome,
        BackupOutcome::Created {
            path: path.clone(),
            rotated: 1
        }
    );
    assert!(path.exists());
    assert!(!folder.join("lastseen_backup_20250101_000000.db").exists());
}
