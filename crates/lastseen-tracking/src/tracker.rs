// SPDX-FileCopyrightText: 2026 LastSeen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Maps gateway events onto store mutations.
//!
//! The tracker is platform-neutral: the gateway adapter converts its events
//! into [`MemberSnapshot`]s and plain ids, and the tracker decides which
//! store operations apply. Message events go through the activity buffer;
//! everything else writes through immediately.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use lastseen_core::{ChannelFilter, Guild, LastSeen, Member, RoleAction};
use lastseen_storage::{NewMember, SqliteStore};
use tracing::{debug, info};

use crate::buffer::ActivityBuffer;

/// A member as the gateway currently reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberSnapshot {
    pub guild_id: i64,
    pub user_id: i64,
    pub username: String,
    pub nickname: Option<String>,
    pub joined_at: Option<i64>,
    /// Role names, without the implicit everyone role.
    pub roles: Vec<String>,
    pub bot: bool,
}

impl MemberSnapshot {
    fn to_new_member(&self) -> NewMember {
        NewMember {
            guild_id: self.guild_id,
            user_id: self.user_id,
            username: self.username.clone(),
            nickname: self.nickname.clone(),
            join_date: self.joined_at,
            roles: self.roles.clone(),
        }
    }
}

/// What a guild sync changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GuildSync {
    pub added: usize,
    pub refreshed: usize,
    pub skipped: usize,
    pub positions_assigned: usize,
}

/// Data needed to announce a departure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaveNotice {
    pub member: Member,
    pub channel_id: Option<i64>,
}

/// Changes applied for one member update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberChanges {
    /// The member was not stored before and has been added.
    pub added: bool,
    pub nickname_changed: bool,
    pub username_changed: bool,
    pub roles_added: Vec<String>,
    pub roles_removed: Vec<String>,
}

impl MemberChanges {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Applies gateway events to the store.
pub struct Tracker {
    store: Arc<SqliteStore>,
    buffer: Arc<ActivityBuffer>,
    channel_filters: RwLock<HashMap<i64, ChannelFilter>>,
}

impl Tracker {
    pub fn new(store: Arc<SqliteStore>, buffer: Arc<ActivityBuffer>) -> Self {
        Self {
            store,
            buffer,
            channel_filters: RwLock::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<SqliteStore> {
        &self.store
    }

    pub fn buffer(&self) -> &Arc<ActivityBuffer> {
        &self.buffer
    }

    /// Forget the cached channel filter of a guild after its settings change.
    pub fn invalidate_guild(&self, guild_id: i64) {
        self.channel_filters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&guild_id);
    }

    /// Store the guild's allowed channels and drop the cached filter.
    pub async fn set_allowed_channels(
        &self,
        guild_id: i64,
        channels: &ChannelFilter,
        guild_name: Option<&str>,
    ) -> bool {
        let stored = self
            .store
            .set_allowed_channels(guild_id, channels, guild_name)
            .await;
        self.invalidate_guild(guild_id);
        stored
    }

    /// Register a guild and reconcile its member list.
    ///
    /// Missing members are added when the guild's track-only roles admit
    /// them; known members get their username, nickname, and roles refreshed.
    pub async fn guild_available(
        &self,
        guild_id: i64,
        guild_name: &str,
        members: &[MemberSnapshot],
    ) -> GuildSync {
        let defaults = self.store.guild_defaults();
        if !self
            .store
            .add_guild(guild_id, guild_name, defaults.inactive_days)
            .await
        {
            self.store.update_guild_name(guild_id, guild_name).await;
        }
        self.invalidate_guild(guild_id);

        let guild = self.store.get_guild_config(guild_id).await;
        let mut sync = self.reconcile(guild.as_ref(), members).await;
        if guild.is_some_and(|g| !g.positions_initialized) {
            sync.positions_assigned = self.store.recalculate_join_positions(guild_id).await;
        }
        info!(
            guild_id,
            added = sync.added,
            refreshed = sync.refreshed,
            skipped = sync.skipped,
            "guild synchronized"
        );
        sync
    }

    /// Reconcile one slice of a chunked member list. Join positions are
    /// recomputed once the final chunk has been applied.
    pub async fn members_chunk(
        &self,
        guild_id: i64,
        members: &[MemberSnapshot],
        last_chunk: bool,
    ) -> GuildSync {
        let guild = self.store.get_guild_config(guild_id).await;
        let mut sync = self.reconcile(guild.as_ref(), members).await;
        if last_chunk {
            sync.positions_assigned = self.store.recalculate_join_positions(guild_id).await;
        }
        debug!(guild_id, added = sync.added, last_chunk, "member chunk applied");
        sync
    }

    async fn reconcile(&self, guild: Option<&Guild>, members: &[MemberSnapshot]) -> GuildSync {
        let mut sync = GuildSync::default();
        for snapshot in members {
            if snapshot.bot {
                sync.skipped += 1;
                continue;
            }
            if self
                .store
                .member_exists(snapshot.guild_id, snapshot.user_id)
                .await
            {
                self.refresh_profile(snapshot).await;
                sync.refreshed += 1;
            } else if guild.is_none_or(|g| g.track_only_roles.admits(&snapshot.roles)) {
                if self.store.add_member(&snapshot.to_new_member()).await {
                    sync.added += 1;
                }
            } else {
                sync.skipped += 1;
            }
        }
        sync
    }

    async fn refresh_profile(&self, snapshot: &MemberSnapshot) {
        let (guild_id, user_id) = (snapshot.guild_id, snapshot.user_id);
        self.store
            .update_member_username(guild_id, user_id, &snapshot.username)
            .await;
        self.store
            .update_member_nickname(guild_id, user_id, snapshot.nickname.as_deref())
            .await;
        if let Some(nick) = &snapshot.nickname {
            self.store.update_nickname_history(guild_id, user_id, nick).await;
        }
        self.store
            .update_member_roles(guild_id, user_id, &snapshot.roles)
            .await;
    }

    /// Handle a join. Returns `true` when the member had been seen before.
    pub async fn member_joined(&self, snapshot: &MemberSnapshot) -> bool {
        if snapshot.bot {
            return false;
        }
        let (guild_id, user_id) = (snapshot.guild_id, snapshot.user_id);
        self.store.upsert_guild(guild_id, None).await;

        if self.store.member_exists(guild_id, user_id).await {
            self.store.set_member_active(guild_id, user_id).await;
            self.refresh_profile(snapshot).await;
            info!(guild_id, user_id, "member rejoined");
            true
        } else {
            self.store.add_member(&snapshot.to_new_member()).await;
            info!(guild_id, user_id, "member joined");
            false
        }
    }

    /// Handle a departure: mark the member inactive and stamp the leave time.
    ///
    /// Returns the stored member and the guild's notification channel, or
    /// `None` when the member was never stored.
    pub async fn member_left(&self, guild_id: i64, user_id: i64) -> Option<LeaveNotice> {
        if !self.store.set_member_inactive(guild_id, user_id).await {
            debug!(guild_id, user_id, "departure of untracked member");
            return None;
        }
        let member = self.store.get_member(guild_id, user_id).await?;
        let channel_id = self
            .store
            .get_guild_config(guild_id)
            .await
            .and_then(|g| g.notification_channel_id);
        info!(guild_id, user_id, "member left");
        Some(LeaveNotice { member, channel_id })
    }

    /// Handle a member update. `before` is the previous state when the
    /// gateway cache had it; otherwise the stored row is the baseline.
    pub async fn member_updated(
        &self,
        before: Option<&MemberSnapshot>,
        after: &MemberSnapshot,
    ) -> MemberChanges {
        let mut changes = MemberChanges::default();
        if after.bot {
            return changes;
        }
        let (guild_id, user_id) = (after.guild_id, after.user_id);

        let Some(stored) = self.store.get_member(guild_id, user_id).await else {
            let admitted = self
                .store
                .get_guild_config(guild_id)
                .await
                .is_none_or(|g| g.track_only_roles.admits(&after.roles));
            if admitted {
                changes.added = self.store.add_member(&after.to_new_member()).await;
            }
            return changes;
        };

        let previous_nick = before.map_or(stored.nickname.as_deref(), |b| b.nickname.as_deref());
        if previous_nick != after.nickname.as_deref() {
            self.store
                .update_member_nickname(guild_id, user_id, after.nickname.as_deref())
                .await;
            if let Some(nick) = &after.nickname {
                self.store.update_nickname_history(guild_id, user_id, nick).await;
            }
            changes.nickname_changed = true;
        }

        if stored.username != after.username {
            self.store
                .update_member_username(guild_id, user_id, &after.username)
                .await;
            changes.username_changed = true;
        }

        let previous_roles: Vec<String> = match before {
            Some(b) => b.roles.clone(),
            None => stored.roles.into_vec(),
        };
        let old: HashSet<&String> = previous_roles.iter().collect();
        let new: HashSet<&String> = after.roles.iter().collect();
        changes.roles_added = after.roles.iter().filter(|r| !old.contains(r)).cloned().collect();
        changes.roles_removed = previous_roles.iter().filter(|r| !new.contains(r)).cloned().collect();

        if !changes.roles_added.is_empty() || !changes.roles_removed.is_empty() {
            self.store
                .update_member_roles(guild_id, user_id, &after.roles)
                .await;
            for role in &changes.roles_added {
                self.store
                    .record_role_change(guild_id, user_id, role, RoleAction::Added)
                    .await;
            }
            for role in &changes.roles_removed {
                self.store
                    .record_role_change(guild_id, user_id, role, RoleAction::Removed)
                    .await;
            }
        }

        if !changes.is_empty() {
            debug!(
                guild_id,
                user_id,
                nickname = changes.nickname_changed,
                username = changes.username_changed,
                added = changes.roles_added.len(),
                removed = changes.roles_removed.len(),
                "member updated"
            );
        }
        changes
    }

    /// Propagate a global username change to every listed guild that stores
    /// the user. Returns the number of guilds updated.
    pub async fn user_renamed(&self, user_id: i64, username: &str, guild_ids: &[i64]) -> usize {
        let mut updated = 0;
        for &guild_id in guild_ids {
            if self.store.member_exists(guild_id, user_id).await
                && self
                    .store
                    .update_member_username(guild_id, user_id, username)
                    .await
            {
                updated += 1;
            }
        }
        updated
    }

    /// Record a presence transition: online now, or offline since the store clock.
    ///
    /// Repeated updates with the same status leave the stored state alone, so
    /// an offline member keeps the time they actually went offline. Returns
    /// `false` only when the member is unknown.
    pub async fn presence_changed(&self, guild_id: i64, user_id: i64, online: bool) -> bool {
        let Some(member) = self.store.get_member(guild_id, user_id).await else {
            return false;
        };
        let unchanged = match member.last_seen {
            LastSeen::OnlineNow => online,
            LastSeen::OfflineSince(_) => !online,
            LastSeen::NeverSeen => false,
        };
        if unchanged {
            return true;
        }
        let state = if online {
            LastSeen::OnlineNow
        } else {
            LastSeen::offline_at(self.store.now())
        };
        self.store.update_last_seen(guild_id, user_id, state).await
    }

    /// Count a message unless the guild restricts tracking to other channels.
    /// Returns whether the message was buffered.
    pub async fn message_sent(&self, guild_id: i64, channel_id: i64, user_id: i64, at: i64) -> bool {
        let filter = self.channel_filter(guild_id).await;
        if !filter.admits_channel(channel_id) {
            return false;
        }
        self.buffer.record(guild_id, user_id, at).await;
        true
    }

    async fn channel_filter(&self, guild_id: i64) -> ChannelFilter {
        let cached = self
            .channel_filters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&guild_id)
            .cloned();
        if let Some(filter) = cached {
            return filter;
        }
        let filter = self
            .store
            .get_guild_config(guild_id)
            .await
            .map(|g| g.allowed_channels)
            .unwrap_or_default();
        self.channel_filters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(guild_id, filter.clone());
        filter
    }
}
