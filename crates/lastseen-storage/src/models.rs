// SPDX-FileCopyrightText: 2026 LastSeen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Input and result types for store operations.
//!
//! Every aggregate implements `Default` with all-zero values, which is what
//! the store returns when a query fails or matches no rows.

use serde::Serialize;

use lastseen_config::model::BotConfig;
use lastseen_core::types::{DEFAULT_INACTIVE_DAYS, DEFAULT_RETENTION_DAYS};

/// Windows, in days, used by the multi-window aggregates.
pub const STAT_WINDOWS: [i64; 4] = [7, 30, 90, 365];

/// Values applied to guild rows created implicitly by a setter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildDefaults {
    pub inactive_days: i64,
    pub retention_days: i64,
    pub bot_admin_role_name: Option<String>,
}

impl Default for GuildDefaults {
    fn default() -> Self {
        Self {
            inactive_days: DEFAULT_INACTIVE_DAYS,
            retention_days: DEFAULT_RETENTION_DAYS,
            bot_admin_role_name: None,
        }
    }
}

impl From<&BotConfig> for GuildDefaults {
    fn from(bot: &BotConfig) -> Self {
        Self {
            inactive_days: bot.default_inactive_days,
            retention_days: bot.default_retention_days,
            bot_admin_role_name: Some(bot.bot_admin_role_name.clone()),
        }
    }
}

/// A member as first observed, used by `add_member`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMember {
    pub guild_id: i64,
    pub user_id: i64,
    pub username: String,
    pub nickname: Option<String>,
    pub join_date: Option<i64>,
    pub roles: Vec<String>,
}

/// Criteria for `search_members`. Unset fields do not filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberFilter {
    /// Case-insensitive substring of username or nickname.
    pub name_contains: Option<String>,
    /// Exact role name the member must hold.
    pub role: Option<String>,
    pub active: Option<bool>,
    pub joined_after: Option<i64>,
    pub joined_before: Option<i64>,
    pub limit: Option<usize>,
}

/// Message totals for one member or a whole guild over a window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ActivityPeriod {
    pub total: i64,
    /// Days with at least one message.
    pub active_days: i64,
    pub daily_average: f64,
}

/// Message count of one UTC day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DailyCount {
    pub day_bucket: i64,
    pub count: i64,
}

/// Guild-wide message totals over the standard windows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GuildActivityStats {
    pub messages_7d: i64,
    pub messages_30d: i64,
    pub messages_90d: i64,
    pub messages_365d: i64,
    pub active_users_7d: i64,
    pub active_users_30d: i64,
}

/// Point-in-time membership picture of a guild.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ServerSnapshot {
    pub total_members: i64,
    pub active_members: i64,
    pub departed_members: i64,
    pub online_now: i64,
    pub never_seen: i64,
    /// Active members offline for longer than the guild's inactivity threshold.
    pub inactive_members: i64,
    pub messages_today: i64,
}

/// Joins and departures over the standard windows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MemberGrowth {
    pub joined_7d: i64,
    pub joined_30d: i64,
    pub joined_90d: i64,
    pub left_7d: i64,
    pub left_30d: i64,
    pub left_90d: i64,
}

impl MemberGrowth {
    pub fn net_30d(&self) -> i64 {
        self.joined_30d - self.left_30d
    }
}

/// Members who joined within a window and how many of them stayed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RetentionCohort {
    pub window_days: i64,
    pub joined: i64,
    pub still_active: i64,
    /// `still_active / joined` as a percentage, 0 when nobody joined.
    pub retention_rate: f64,
}

/// One row of the activity leaderboard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LeaderboardEntry {
    pub user_id: i64,
    pub username: String,
    pub nickname: Option<String>,
    pub total_messages: i64,
}

impl LeaderboardEntry {
    pub fn display_name(&self) -> String {
        match &self.nickname {
            Some(nick) => format!("{nick} ({})", self.username),
            None => self.username.clone(),
        }
    }
}

/// Member counts of one guild.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GuildStats {
    pub total_members: i64,
    pub active_members: i64,
    pub left_members: i64,
}

/// Result of a database health probe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DatabaseHealth {
    pub can_connect: bool,
    pub can_read: bool,
    pub can_write: bool,
    pub file_size_bytes: u64,
    pub idle_connections: usize,
}

impl DatabaseHealth {
    pub fn is_healthy(&self) -> bool {
        self.can_connect && self.can_read && self.can_write
    }
}

/// Rows removed by a retention pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupCounts {
    pub daily: usize,
    pub hourly: usize,
}

impl CleanupCounts {
    pub fn total(&self) -> usize {
        self.daily + self.hourly
    }
}

impl std::ops::AddAssign for CleanupCounts {
    fn add_assign(&mut self, other: Self) {
        self.daily += other.daily;
        self.hourly += other.hourly;
    }
}
