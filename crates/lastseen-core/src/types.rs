// SPDX-FileCopyrightText: 2026 LastSeen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared across the LastSeen workspace.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Placeholder guild name used until the real name is known.
pub const UNKNOWN_GUILD_NAME: &str = "Unknown";

/// Default inactivity threshold in days.
pub const DEFAULT_INACTIVE_DAYS: i64 = 10;

/// Default message-activity retention window in days.
pub const DEFAULT_RETENTION_DAYS: i64 = 365;

/// Default timezone name for new guilds.
pub const DEFAULT_TIMEZONE: &str = "UTC";

/// Maximum number of nicknames remembered per member.
pub const NICKNAME_HISTORY_LIMIT: usize = 10;

/// Maximum number of role names in a track-only filter.
pub const MAX_TRACKED_ROLES: usize = 25;

/// Maximum number of channel ids in an allowed-channels filter.
pub const MAX_ALLOWED_CHANNELS: usize = 50;

/// Maximum number of role names recorded for a single member.
pub const MAX_MEMBER_ROLES: usize = 250;

/// Presence state of a member as recorded by the store.
///
/// Stored as a nullable integer column: `NULL` for [`LastSeen::NeverSeen`],
/// `0` for [`LastSeen::OnlineNow`], and the offline timestamp otherwise.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum LastSeen {
    /// No presence transition has been observed yet.
    #[default]
    NeverSeen,
    /// The member is currently online.
    OnlineNow,
    /// The member went offline at the given Unix timestamp.
    OfflineSince(i64),
}

impl LastSeen {
    /// Build an offline state; timestamps below 1 are clamped so they never read back as online.
    pub fn offline_at(ts: i64) -> Self {
        Self::OfflineSince(ts.max(1))
    }

    /// Decode the column representation.
    pub fn from_column(value: Option<i64>) -> Self {
        match value {
            None => Self::NeverSeen,
            Some(0) => Self::OnlineNow,
            Some(ts) if ts > 0 => Self::OfflineSince(ts),
            Some(_) => Self::NeverSeen,
        }
    }

    /// Encode into the column representation.
    pub fn to_column(self) -> Option<i64> {
        match self {
            Self::NeverSeen => None,
            Self::OnlineNow => Some(0),
            Self::OfflineSince(ts) => Some(ts.max(1)),
        }
    }

    /// The offline timestamp, if the member is known to be offline.
    pub fn offline_since(self) -> Option<i64> {
        match self {
            Self::OfflineSince(ts) => Some(ts),
            _ => None,
        }
    }
}

/// An insertion-ordered set with a fixed upper bound on its size.
///
/// Duplicates are ignored and inserts beyond the bound are rejected. Used for
/// the list-valued guild and member columns so their shape is fixed in code
/// rather than implied by whatever JSON happens to be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundedSet<T, const N: usize> {
    items: Vec<T>,
}

impl<T, const N: usize> Default for BoundedSet<T, N> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T: PartialEq, const N: usize> BoundedSet<T, N> {
    /// Maximum number of elements.
    pub const CAPACITY: usize = N;

    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an item. Returns `false` for duplicates or when the set is full.
    pub fn insert(&mut self, item: T) -> bool {
        if self.items.len() >= N || self.items.contains(&item) {
            return false;
        }
        self.items.push(item);
        true
    }

    pub fn contains(&self, item: &T) -> bool {
        self.items.contains(item)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn into_vec(self) -> Vec<T> {
        self.items
    }
}

impl<T: PartialEq, const N: usize> FromIterator<T> for BoundedSet<T, N> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut set = Self::new();
        for item in iter {
            if set.len() >= N {
                break;
            }
            set.insert(item);
        }
        set
    }
}

impl<T: PartialEq + Serialize, const N: usize> BoundedSet<T, N> {
    /// Encode as a JSON array for a text column.
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.items).unwrap_or_else(|_| "[]".to_string())
    }
}

impl<T: PartialEq + DeserializeOwned, const N: usize> BoundedSet<T, N> {
    /// Decode a JSON array, truncating to the bound.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        let items: Vec<T> = serde_json::from_str(raw)?;
        Ok(items.into_iter().collect())
    }
}

/// Role names a guild restricts tracking to. Empty means "track everyone".
pub type RoleFilter = BoundedSet<String, MAX_TRACKED_ROLES>;

/// Channel ids a guild counts messages in. Empty means "every channel".
pub type ChannelFilter = BoundedSet<i64, MAX_ALLOWED_CHANNELS>;

/// Role names held by a member.
pub type MemberRoles = BoundedSet<String, MAX_MEMBER_ROLES>;

impl RoleFilter {
    /// Whether a member holding `roles` passes the filter.
    pub fn admits(&self, roles: &[String]) -> bool {
        self.is_empty() || roles.iter().any(|role| self.contains(role))
    }
}

impl ChannelFilter {
    /// Whether messages in `channel_id` are counted.
    pub fn admits_channel(&self, channel_id: i64) -> bool {
        self.is_empty() || self.contains(&channel_id)
    }
}

/// The last [`NICKNAME_HISTORY_LIMIT`] distinct nicknames of a member, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NicknameHistory(Vec<String>);

impl NicknameHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a nickname.
    ///
    /// Returns `false` when it is already the most recent entry. A nickname
    /// seen earlier moves to the end instead of being duplicated, and the
    /// oldest entries are evicted past the limit.
    pub fn push(&mut self, nickname: &str) -> bool {
        if self.latest() == Some(nickname) {
            return false;
        }
        self.0.retain(|existing| existing != nickname);
        self.0.push(nickname.to_string());
        if self.0.len() > NICKNAME_HISTORY_LIMIT {
            let excess = self.0.len() - NICKNAME_HISTORY_LIMIT;
            self.0.drain(..excess);
        }
        true
    }

    pub fn latest(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    pub fn entries(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_else(|_| "[]".to_string())
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        let entries: Vec<String> = serde_json::from_str(raw)?;
        Ok(Self::from(entries))
    }
}

impl From<Vec<String>> for NicknameHistory {
    fn from(entries: Vec<String>) -> Self {
        let mut history = Self::new();
        for entry in entries {
            history.push(&entry);
        }
        history
    }
}

/// Report sections a guild can subscribe to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ReportKind {
    Activity,
    Members,
    Departures,
}

/// Enabled report sections for a guild.
pub type ReportTypes = BoundedSet<ReportKind, 3>;

impl ReportTypes {
    /// All sections enabled.
    pub fn all() -> Self {
        [ReportKind::Activity, ReportKind::Members, ReportKind::Departures]
            .into_iter()
            .collect()
    }
}

/// How often a guild receives scheduled reports.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ReportFrequency {
    #[default]
    Weekly,
    Monthly,
    Both,
}

impl ReportFrequency {
    pub fn includes(self, cadence: ReportCadence) -> bool {
        matches!(
            (self, cadence),
            (Self::Both, _)
                | (Self::Weekly, ReportCadence::Weekly)
                | (Self::Monthly, ReportCadence::Monthly)
        )
    }
}

/// A single report cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum ReportCadence {
    Weekly,
    Monthly,
}

impl ReportCadence {
    /// Length of the reporting window.
    pub fn window_days(self) -> i64 {
        match self {
            Self::Weekly => 7,
            Self::Monthly => 30,
        }
    }

    /// Title-case label used in report headings.
    pub fn label(self) -> &'static str {
        match self {
            Self::Weekly => "Weekly",
            Self::Monthly => "Monthly",
        }
    }
}

/// Scheduled-report settings of a guild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportSchedule {
    pub enabled: bool,
    pub frequency: ReportFrequency,
    /// Weekday for weekly reports, 0 = Monday .. 6 = Sunday.
    pub weekly_day: u8,
    /// Day of month for monthly reports, 1..=28.
    pub monthly_day: u8,
    pub channel_id: Option<i64>,
    pub types: ReportTypes,
    pub last_weekly_sent: Option<i64>,
    pub last_monthly_sent: Option<i64>,
}

impl Default for ReportSchedule {
    fn default() -> Self {
        Self {
            enabled: false,
            frequency: ReportFrequency::Weekly,
            weekly_day: 0,
            monthly_day: 1,
            channel_id: None,
            types: ReportTypes::all(),
            last_weekly_sent: None,
            last_monthly_sent: None,
        }
    }
}

impl ReportSchedule {
    pub fn last_sent(&self, cadence: ReportCadence) -> Option<i64> {
        match cadence {
            ReportCadence::Weekly => self.last_weekly_sent,
            ReportCadence::Monthly => self.last_monthly_sent,
        }
    }
}

/// One tracked community and its configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Guild {
    pub guild_id: i64,
    pub guild_name: String,
    pub notification_channel_id: Option<i64>,
    pub inactive_days: i64,
    pub bot_admin_role_name: Option<String>,
    pub user_role_required: bool,
    pub user_role_name: Option<String>,
    pub track_only_roles: RoleFilter,
    pub allowed_channels: ChannelFilter,
    pub message_retention_days: i64,
    pub timezone: String,
    pub reports: ReportSchedule,
    pub positions_initialized: bool,
    pub added_at: i64,
}

/// A user's membership record within one guild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub guild_id: i64,
    pub user_id: i64,
    pub username: String,
    pub nickname: Option<String>,
    pub nickname_history: NicknameHistory,
    pub join_date: Option<i64>,
    pub join_position: Option<i64>,
    pub last_seen: LastSeen,
    pub is_active: bool,
    pub left_date: Option<i64>,
    pub roles: MemberRoles,
}

impl Member {
    /// Nickname when set, username otherwise.
    pub fn display_name(&self) -> &str {
        self.nickname.as_deref().unwrap_or(&self.username)
    }
}

/// Direction of a role change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum RoleAction {
    Added,
    Removed,
}

/// One entry of a member's bounded role-change log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleChange {
    pub id: i64,
    pub guild_id: i64,
    pub user_id: i64,
    pub role_name: String,
    pub action: RoleAction,
    pub timestamp: i64,
}
