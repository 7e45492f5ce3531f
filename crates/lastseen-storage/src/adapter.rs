// SPDX-FileCopyrightText: 2026 LastSeen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The infallible store facade used by the tracker, the jobs, and commands.
//!
//! Every operation delegates to a query module. Failures are logged with the
//! operation name and turned into the documented default: `false`, `None`,
//! an empty list, or an all-zero aggregate. The [`ActivitySink`] impl is the
//! one exception: it returns errors so the activity buffer can retry.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{debug, error};

use lastseen_config::model::StorageConfig;
use lastseen_core::time::now_ts;
use lastseen_core::{
    ActivitySink, ChannelFilter, Guild, LastSeen, LastSeenError, Member, ReportCadence,
    ReportSchedule, RoleAction, RoleChange, RoleFilter,
};

use crate::backup;
use crate::database::Database;
use crate::models::{
    ActivityPeriod, CleanupCounts, DailyCount, DatabaseHealth, GuildActivityStats,
    GuildDefaults, GuildStats, LeaderboardEntry, MemberFilter, MemberGrowth, NewMember,
    RetentionCohort, ServerSnapshot,
};
use crate::queries::guilds::GuildSeed;
use crate::queries::{activity, guilds, members, retention, role_changes, stats};

/// Log a failed operation and fall back to the type's default.
fn settle<T: Default>(op: &'static str, result: Result<T, LastSeenError>) -> T {
    result.unwrap_or_else(|e| {
        error!(op, error = %e, "store operation failed");
        T::default()
    })
}

/// SQLite-backed store.
///
/// The database is opened by [`SqliteStore::initialize`]; until then every
/// operation logs and returns its default.
pub struct SqliteStore {
    config: StorageConfig,
    defaults: GuildDefaults,
    clock: fn() -> i64,
    db: OnceCell<Database>,
}

impl SqliteStore {
    /// Create a store for `config`. No file is touched until [`initialize`](Self::initialize).
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            defaults: GuildDefaults::default(),
            clock: now_ts,
            db: OnceCell::new(),
        }
    }

    /// Create and initialize in one step.
    pub async fn open(config: StorageConfig) -> Result<Self, LastSeenError> {
        let store = Self::new(config);
        store.initialize().await?;
        Ok(store)
    }

    /// Values applied to guild rows created implicitly.
    pub fn with_guild_defaults(mut self, defaults: GuildDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// Replace the source of "now" (Unix seconds) used for windows and stamps.
    pub fn with_clock(mut self, clock: fn() -> i64) -> Self {
        self.clock = clock;
        self
    }

    /// Open the database and apply migrations.
    pub async fn initialize(&self) -> Result<(), LastSeenError> {
        let db = Database::open(&self.config).await?;
        self.db.set(db).map_err(|_| LastSeenError::Storage {
            source: "store already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "sqlite store initialized");
        Ok(())
    }

    /// Checkpoint and close the pool. Later operations return defaults.
    pub async fn close(&self) -> Result<(), LastSeenError> {
        self.database()?.close().await
    }

    /// The underlying pool, for callers that need raw query access.
    pub fn database(&self) -> Result<&Database, LastSeenError> {
        self.db.get().ok_or_else(|| LastSeenError::Storage {
            source: "store not initialized; call initialize() first".into(),
        })
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub fn guild_defaults(&self) -> &GuildDefaults {
        &self.defaults
    }

    /// Current time according to the store's clock.
    pub fn now(&self) -> i64 {
        (self.clock)()
    }

    fn ready(&self, op: &'static str) -> Option<&Database> {
        match self.database() {
            Ok(db) => Some(db),
            Err(e) => {
                error!(op, error = %e, "store operation failed");
                None
            }
        }
    }

    fn seed(&self, guild_id: i64, guild_name: Option<&str>) -> GuildSeed {
        GuildSeed {
            guild_id,
            guild_name: guild_name.map(str::to_string),
            defaults: self.defaults.clone(),
        }
    }

    // --- Guilds ---

    /// Register a guild; `true` when a new row was created.
    pub async fn add_guild(&self, guild_id: i64, guild_name: &str, inactive_days: i64) -> bool {
        let Some(db) = self.ready("add_guild") else {
            return false;
        };
        settle(
            "add_guild",
            guilds::add_guild(db, guild_id, guild_name, inactive_days, &self.defaults).await,
        )
    }

    pub async fn update_guild_name(&self, guild_id: i64, guild_name: &str) -> bool {
        let Some(db) = self.ready("update_guild_name") else {
            return false;
        };
        settle(
            "update_guild_name",
            guilds::update_guild_name(db, guild_id, guild_name).await,
        )
    }

    /// Make sure the guild row exists. A known `guild_name` replaces the placeholder.
    pub async fn upsert_guild(&self, guild_id: i64, guild_name: Option<&str>) -> bool {
        let Some(db) = self.ready("upsert_guild") else {
            return false;
        };
        settle(
            "upsert_guild",
            guilds::upsert_guild(db, &self.seed(guild_id, guild_name)).await,
        )
    }

    pub async fn get_guild_config(&self, guild_id: i64) -> Option<Guild> {
        let db = self.ready("get_guild_config")?;
        settle("get_guild_config", guilds::get_guild(db, guild_id).await)
    }

    pub async fn list_guilds(&self) -> Vec<Guild> {
        let Some(db) = self.ready("list_guilds") else {
            return Vec::new();
        };
        settle("list_guilds", guilds::list_guilds(db).await)
    }

    /// Delete a guild with its members, role log, and activity.
    pub async fn remove_guild(&self, guild_id: i64) -> bool {
        let Some(db) = self.ready("remove_guild") else {
            return false;
        };
        settle("remove_guild", guilds::remove_guild(db, guild_id).await)
    }

    pub async fn set_notification_channel(
        &self,
        guild_id: i64,
        channel_id: Option<i64>,
        guild_name: Option<&str>,
    ) -> bool {
        let Some(db) = self.ready("set_notification_channel") else {
            return false;
        };
        let seed = self.seed(guild_id, guild_name);
        settle(
            "set_notification_channel",
            guilds::set_notification_channel(db, &seed, channel_id).await,
        )
    }

    pub async fn set_inactive_days(
        &self,
        guild_id: i64,
        days: i64,
        guild_name: Option<&str>,
    ) -> bool {
        let Some(db) = self.ready("set_inactive_days") else {
            return false;
        };
        let seed = self.seed(guild_id, guild_name);
        settle(
            "set_inactive_days",
            guilds::set_inactive_days(db, &seed, days).await,
        )
    }

    pub async fn set_retention_days(
        &self,
        guild_id: i64,
        days: i64,
        guild_name: Option<&str>,
    ) -> bool {
        let Some(db) = self.ready("set_retention_days") else {
            return false;
        };
        let seed = self.seed(guild_id, guild_name);
        settle(
            "set_retention_days",
            guilds::set_retention_days(db, &seed, days).await,
        )
    }

    pub async fn set_timezone(
        &self,
        guild_id: i64,
        timezone: &str,
        guild_name: Option<&str>,
    ) -> bool {
        let Some(db) = self.ready("set_timezone") else {
            return false;
        };
        let seed = self.seed(guild_id, guild_name);
        settle(
            "set_timezone",
            guilds::set_timezone(db, &seed, timezone).await,
        )
    }

    /// Store the report schedule. The last-sent stamps in `schedule` are ignored.
    pub async fn set_report_config(
        &self,
        guild_id: i64,
        schedule: &ReportSchedule,
        guild_name: Option<&str>,
    ) -> bool {
        let Some(db) = self.ready("set_report_config") else {
            return false;
        };
        let seed = self.seed(guild_id, guild_name);
        settle(
            "set_report_config",
            guilds::set_report_config(db, &seed, schedule).await,
        )
    }

    pub async fn mark_report_sent(&self, guild_id: i64, cadence: ReportCadence, at: i64) -> bool {
        let Some(db) = self.ready("mark_report_sent") else {
            return false;
        };
        settle(
            "mark_report_sent",
            guilds::mark_report_sent(db, guild_id, cadence, at).await,
        )
    }

    pub async fn set_bot_admin_role(
        &self,
        guild_id: i64,
        role_name: Option<&str>,
        guild_name: Option<&str>,
    ) -> bool {
        let Some(db) = self.ready("set_bot_admin_role") else {
            return false;
        };
        let seed = self.seed(guild_id, guild_name);
        settle(
            "set_bot_admin_role",
            guilds::set_bot_admin_role(db, &seed, role_name).await,
        )
    }

    pub async fn set_user_role_required(
        &self,
        guild_id: i64,
        required: bool,
        guild_name: Option<&str>,
    ) -> bool {
        let Some(db) = self.ready("set_user_role_required") else {
            return false;
        };
        let seed = self.seed(guild_id, guild_name);
        settle(
            "set_user_role_required",
            guilds::set_user_role_required(db, &seed, required).await,
        )
    }

    pub async fn set_user_role_name(
        &self,
        guild_id: i64,
        role_name: Option<&str>,
        guild_name: Option<&str>,
    ) -> bool {
        let Some(db) = self.ready("set_user_role_name") else {
            return false;
        };
        let seed = self.seed(guild_id, guild_name);
        settle(
            "set_user_role_name",
            guilds::set_user_role_name(db, &seed, role_name).await,
        )
    }

    pub async fn set_track_only_roles(
        &self,
        guild_id: i64,
        roles: &RoleFilter,
        guild_name: Option<&str>,
    ) -> bool {
        let Some(db) = self.ready("set_track_only_roles") else {
            return false;
        };
        let seed = self.seed(guild_id, guild_name);
        settle(
            "set_track_only_roles",
            guilds::set_track_only_roles(db, &seed, roles).await,
        )
    }

    pub async fn set_allowed_channels(
        &self,
        guild_id: i64,
        channels: &ChannelFilter,
        guild_name: Option<&str>,
    ) -> bool {
        let Some(db) = self.ready("set_allowed_channels") else {
            return false;
        };
        let seed = self.seed(guild_id, guild_name);
        settle(
            "set_allowed_channels",
            guilds::set_allowed_channels(db, &seed, channels).await,
        )
    }

    // --- Members ---

    /// Create the member or replace its profile; see [`members::add_member`].
    pub async fn add_member(&self, member: &NewMember) -> bool {
        let Some(db) = self.ready("add_member") else {
            return false;
        };
        settle("add_member", members::add_member(db, member).await)
    }

    pub async fn get_member(&self, guild_id: i64, user_id: i64) -> Option<Member> {
        let db = self.ready("get_member")?;
        settle("get_member", members::get_member(db, guild_id, user_id).await)
    }

    pub async fn member_exists(&self, guild_id: i64, user_id: i64) -> bool {
        let Some(db) = self.ready("member_exists") else {
            return false;
        };
        settle(
            "member_exists",
            members::member_exists(db, guild_id, user_id).await,
        )
    }

    pub async fn update_member_username(&self, guild_id: i64, user_id: i64, username: &str) -> bool {
        let Some(db) = self.ready("update_member_username") else {
            return false;
        };
        settle(
            "update_member_username",
            members::update_member_username(db, guild_id, user_id, username).await,
        )
    }

    pub async fn update_member_nickname(
        &self,
        guild_id: i64,
        user_id: i64,
        nickname: Option<&str>,
    ) -> bool {
        let Some(db) = self.ready("update_member_nickname") else {
            return false;
        };
        settle(
            "update_member_nickname",
            members::update_member_nickname(db, guild_id, user_id, nickname).await,
        )
    }

    pub async fn update_member_roles(&self, guild_id: i64, user_id: i64, roles: &[String]) -> bool {
        let Some(db) = self.ready("update_member_roles") else {
            return false;
        };
        settle(
            "update_member_roles",
            members::update_member_roles(db, guild_id, user_id, roles).await,
        )
    }

    /// Append a nickname to the member's history; `true` when the history changed.
    pub async fn update_nickname_history(&self, guild_id: i64, user_id: i64, nickname: &str) -> bool {
        let Some(db) = self.ready("update_nickname_history") else {
            return false;
        };
        settle(
            "update_nickname_history",
            members::update_nickname_history(db, guild_id, user_id, nickname).await,
        )
    }

    pub async fn update_last_seen(&self, guild_id: i64, user_id: i64, state: LastSeen) -> bool {
        let Some(db) = self.ready("update_last_seen") else {
            return false;
        };
        settle(
            "update_last_seen",
            members::update_last_seen(db, guild_id, user_id, state).await,
        )
    }

    pub async fn set_member_active(&self, guild_id: i64, user_id: i64) -> bool {
        let Some(db) = self.ready("set_member_active") else {
            return false;
        };
        settle(
            "set_member_active",
            members::set_member_active(db, guild_id, user_id).await,
        )
    }

    /// Mark the member as departed and stamp the leave time with the store clock.
    pub async fn set_member_inactive(&self, guild_id: i64, user_id: i64) -> bool {
        let Some(db) = self.ready("set_member_inactive") else {
            return false;
        };
        settle(
            "set_member_inactive",
            members::set_member_inactive(db, guild_id, user_id, self.now()).await,
        )
    }

    /// Best match for `term` by username, nickname, or exact user id.
    pub async fn find_member_by_name(&self, guild_id: i64, term: &str) -> Option<Member> {
        let db = self.ready("find_member_by_name")?;
        settle(
            "find_member_by_name",
            members::find_member_by_name(db, guild_id, term).await,
        )
    }

    /// Active members offline for more than `days`, oldest first.
    pub async fn get_inactive_members(&self, guild_id: i64, days: i64) -> Vec<Member> {
        let Some(db) = self.ready("get_inactive_members") else {
            return Vec::new();
        };
        settle(
            "get_inactive_members",
            members::get_inactive_members(db, guild_id, days, self.now()).await,
        )
    }

    pub async fn get_all_guild_members(&self, guild_id: i64) -> Vec<Member> {
        let Some(db) = self.ready("get_all_guild_members") else {
            return Vec::new();
        };
        settle(
            "get_all_guild_members",
            members::get_all_guild_members(db, guild_id).await,
        )
    }

    pub async fn search_members(&self, guild_id: i64, filter: &MemberFilter) -> Vec<Member> {
        let Some(db) = self.ready("search_members") else {
            return Vec::new();
        };
        settle(
            "search_members",
            members::search_members(db, guild_id, filter).await,
        )
    }

    /// Re-rank members by join date. Returns how many positions were written.
    pub async fn recalculate_join_positions(&self, guild_id: i64) -> usize {
        let Some(db) = self.ready("recalculate_join_positions") else {
            return 0;
        };
        settle(
            "recalculate_join_positions",
            members::recalculate_join_positions(db, guild_id).await,
        )
    }

    pub async fn get_new_members_period(&self, guild_id: i64, days: i64) -> Vec<Member> {
        let Some(db) = self.ready("get_new_members_period") else {
            return Vec::new();
        };
        settle(
            "get_new_members_period",
            members::get_new_members_period(db, guild_id, days, self.now()).await,
        )
    }

    pub async fn get_departed_members_period(&self, guild_id: i64, days: i64) -> Vec<Member> {
        let Some(db) = self.ready("get_departed_members_period") else {
            return Vec::new();
        };
        settle(
            "get_departed_members_period",
            members::get_departed_members_period(db, guild_id, days, self.now()).await,
        )
    }

    // --- Role log ---

    pub async fn record_role_change(
        &self,
        guild_id: i64,
        user_id: i64,
        role_name: &str,
        action: RoleAction,
    ) -> bool {
        let Some(db) = self.ready("record_role_change") else {
            return false;
        };
        settle(
            "record_role_change",
            role_changes::record_role_change(db, guild_id, user_id, role_name, action, self.now())
                .await,
        )
    }

    pub async fn get_role_history(&self, guild_id: i64, user_id: i64, limit: usize) -> Vec<RoleChange> {
        let Some(db) = self.ready("get_role_history") else {
            return Vec::new();
        };
        settle(
            "get_role_history",
            role_changes::get_role_history(db, guild_id, user_id, limit).await,
        )
    }

    // --- Message activity ---

    pub async fn increment_message_activity(
        &self,
        guild_id: i64,
        user_id: i64,
        day_bucket: i64,
        count: i64,
    ) -> bool {
        let Some(db) = self.ready("increment_message_activity") else {
            return false;
        };
        settle(
            "increment_message_activity",
            activity::increment_message_activity(db, guild_id, user_id, day_bucket, count).await,
        )
    }

    pub async fn increment_message_activity_hourly(
        &self,
        guild_id: i64,
        user_id: i64,
        hour_bucket: i64,
        hour_of_day: u8,
        count: i64,
    ) -> bool {
        let Some(db) = self.ready("increment_message_activity_hourly") else {
            return false;
        };
        settle(
            "increment_message_activity_hourly",
            activity::increment_message_activity_hourly(
                db,
                guild_id,
                user_id,
                hour_bucket,
                hour_of_day,
                count,
            )
            .await,
        )
    }

    // --- Aggregates ---

    /// Messages of one member, or the whole guild when `user_id` is `None`.
    pub async fn get_message_activity_period(
        &self,
        guild_id: i64,
        user_id: Option<i64>,
        days: i64,
    ) -> ActivityPeriod {
        let Some(db) = self.ready("get_message_activity_period") else {
            return ActivityPeriod::default();
        };
        settle(
            "get_message_activity_period",
            stats::get_message_activity_period(db, guild_id, user_id, days, self.now()).await,
        )
    }

    pub async fn get_message_activity_trend(
        &self,
        guild_id: i64,
        user_id: Option<i64>,
        days: i64,
    ) -> Vec<DailyCount> {
        let Some(db) = self.ready("get_message_activity_trend") else {
            return Vec::new();
        };
        settle(
            "get_message_activity_trend",
            stats::get_message_activity_trend(db, guild_id, user_id, days, self.now()).await,
        )
    }

    pub async fn get_guild_message_activity_stats(&self, guild_id: i64) -> GuildActivityStats {
        let Some(db) = self.ready("get_guild_message_activity_stats") else {
            return GuildActivityStats::default();
        };
        settle(
            "get_guild_message_activity_stats",
            stats::get_guild_message_activity_stats(db, guild_id, self.now()).await,
        )
    }

    pub async fn get_server_snapshot_stats(&self, guild_id: i64) -> ServerSnapshot {
        let Some(db) = self.ready("get_server_snapshot_stats") else {
            return ServerSnapshot::default();
        };
        settle(
            "get_server_snapshot_stats",
            stats::get_server_snapshot_stats(db, guild_id, self.defaults.inactive_days, self.now())
                .await,
        )
    }

    pub async fn get_member_growth_stats(&self, guild_id: i64) -> MemberGrowth {
        let Some(db) = self.ready("get_member_growth_stats") else {
            return MemberGrowth::default();
        };
        settle(
            "get_member_growth_stats",
            stats::get_member_growth_stats(db, guild_id, self.now()).await,
        )
    }

    pub async fn get_retention_cohorts(&self, guild_id: i64) -> Vec<RetentionCohort> {
        let Some(db) = self.ready("get_retention_cohorts") else {
            return Vec::new();
        };
        settle(
            "get_retention_cohorts",
            stats::get_retention_cohorts(db, guild_id, self.now()).await,
        )
    }

    pub async fn get_activity_leaderboard(
        &self,
        guild_id: i64,
        days: i64,
        limit: usize,
    ) -> Vec<LeaderboardEntry> {
        let Some(db) = self.ready("get_activity_leaderboard") else {
            return Vec::new();
        };
        settle(
            "get_activity_leaderboard",
            stats::get_activity_leaderboard(db, guild_id, days, limit, self.now()).await,
        )
    }

    /// Message counts per UTC hour of day.
    pub async fn get_activity_by_hour(&self, guild_id: i64, days: i64) -> [i64; 24] {
        let Some(db) = self.ready("get_activity_by_hour") else {
            return [0; 24];
        };
        settle(
            "get_activity_by_hour",
            stats::get_activity_by_hour(db, guild_id, days, self.now()).await,
        )
    }

    /// Message counts per weekday, Monday first.
    pub async fn get_activity_by_day(&self, guild_id: i64, days: i64) -> [i64; 7] {
        let Some(db) = self.ready("get_activity_by_day") else {
            return [0; 7];
        };
        settle(
            "get_activity_by_day",
            stats::get_activity_by_day(db, guild_id, days, self.now()).await,
        )
    }

    pub async fn get_guild_stats(&self, guild_id: i64) -> GuildStats {
        let Some(db) = self.ready("get_guild_stats") else {
            return GuildStats::default();
        };
        settle("get_guild_stats", stats::get_guild_stats(db, guild_id).await)
    }

    // --- Retention ---

    pub async fn cleanup_old_message_activity(&self, guild_id: i64, retention_days: i64) -> CleanupCounts {
        let Some(db) = self.ready("cleanup_old_message_activity") else {
            return CleanupCounts::default();
        };
        settle(
            "cleanup_old_message_activity",
            retention::cleanup_old_message_activity(db, guild_id, retention_days, self.now())
                .await,
        )
    }

    /// Apply every guild's retention window; guilds without a row use the default.
    pub async fn cleanup_all_guilds_message_activity(&self) -> CleanupCounts {
        let Some(db) = self.ready("cleanup_all_guilds_message_activity") else {
            return CleanupCounts::default();
        };
        settle(
            "cleanup_all_guilds_message_activity",
            retention::cleanup_all_guilds_message_activity(
                db,
                self.defaults.retention_days,
                self.now(),
            )
            .await,
        )
    }

    // --- Backups ---

    /// Snapshot the database into `folder`. Returns the snapshot path.
    pub async fn create_backup(&self, folder: &Path) -> Option<PathBuf> {
        let db = self.ready("create_backup")?;
        let source = db.path().to_path_buf();
        let folder = folder.to_path_buf();
        let at = lastseen_core::time::to_datetime(self.now());
        let result = tokio::task::spawn_blocking(move || backup::create_backup(&source, &folder, at))
            .await
            .map_err(|e| LastSeenError::Internal(format!("backup task failed: {e}")))
            .and_then(|r| r);
        settle("create_backup", result.map(Some))
    }

    /// Keep the `keep` newest snapshots in `folder`. Returns how many were deleted.
    pub async fn cleanup_old_backups(&self, folder: &Path, keep: usize) -> usize {
        let folder = folder.to_path_buf();
        let result = tokio::task::spawn_blocking(move || backup::cleanup_old_backups(&folder, keep))
            .await
            .map_err(|e| LastSeenError::Internal(format!("backup rotation task failed: {e}")))
            .and_then(|r| r);
        settle("cleanup_old_backups", result)
    }

    // --- Health ---

    /// Probe connectivity, reads, and writes.
    pub async fn get_database_health(&self) -> DatabaseHealth {
        let Some(db) = self.ready("get_database_health") else {
            return DatabaseHealth::default();
        };
        let mut health = DatabaseHealth {
            idle_connections: db.idle_count(),
            file_size_bytes: std::fs::metadata(db.path()).map(|m| m.len()).unwrap_or(0),
            ..DatabaseHealth::default()
        };

        health.can_connect = db
            .transact(|conn| conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)))
            .await
            .is_ok();
        if !health.can_connect {
            return health;
        }
        health.can_read = db
            .transact(|conn| conn.query_row("SELECT COUNT(*) FROM guilds", [], |row| row.get::<_, i64>(0)))
            .await
            .is_ok();
        health.can_write = db
            .transact(|conn| {
                conn.execute_batch(
                    "CREATE TEMP TABLE IF NOT EXISTS health_probe (v INTEGER);
                     INSERT INTO health_probe (v) VALUES (1);
                     DELETE FROM health_probe;",
                )
            })
            .await
            .is_ok();
        health
    }
}

#[async_trait]
impl ActivitySink for SqliteStore {
    async fn record_daily(
        &self,
        guild_id: i64,
        user_id: i64,
        day_bucket: i64,
        count: i64,
    ) -> Result<bool, LastSeenError> {
        activity::increment_message_activity(self.database()?, guild_id, user_id, day_bucket, count)
            .await
    }

    async fn record_hourly(
        &self,
        guild_id: i64,
        user_id: i64,
        hour_bucket: i64,
        hour_of_day: u8,
        count: i64,
    ) -> Result<bool, LastSeenError> {
        activity::increment_message_activity_hourly(
            self.database()?,
            guild_id,
            user_id,
            hour_bucket,
            hour_of_day,
            count,
        )
        .await
    }
}
