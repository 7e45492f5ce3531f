// SPDX-FileCopyrightText: 2026 LastSeen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! serenity event handler.
//!
//! Converts gateway payloads into [`MemberSnapshot`]s and forwards them to
//! the [`Tracker`]. Role ids are resolved to names through the cache; the
//! implicit everyone role is never stored.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serenity::all::{
    ChunkGuildFilter, Context, EventHandler, Guild, GuildId, GuildMemberUpdateEvent,
    GuildMembersChunkEvent, Member, Message, OnlineStatus, Presence, Ready, Role, RoleId, User,
    UserId,
};
use tracing::{debug, info, warn};

use lastseen_tracking::{MemberSnapshot, Tracker};

use crate::notice::leave_message;
use crate::publisher::send_text;

/// Discord snowflakes fit in 63 bits.
pub(crate) fn sql_id(id: u64) -> i64 {
    id as i64
}

fn role_names(roles: &HashMap<RoleId, Role>, guild_id: GuildId, ids: &[RoleId]) -> Vec<String> {
    ids.iter()
        .filter(|id| id.get() != guild_id.get())
        .filter_map(|id| roles.get(id).map(|role| role.name.clone()))
        .collect()
}

fn cached_role_names(ctx: &Context, guild_id: GuildId, ids: &[RoleId]) -> Vec<String> {
    match ctx.cache.guild(guild_id) {
        Some(guild) => role_names(&guild.roles, guild_id, ids),
        None => Vec::new(),
    }
}

fn snapshot(member: &Member, roles: Vec<String>) -> MemberSnapshot {
    MemberSnapshot {
        guild_id: sql_id(member.guild_id.get()),
        user_id: sql_id(member.user.id.get()),
        username: member.user.name.clone(),
        nickname: member.nick.clone(),
        joined_at: member.joined_at.map(|ts| ts.unix_timestamp()),
        roles,
        bot: member.user.bot,
    }
}

fn snapshots<'a>(
    members: impl IntoIterator<Item = &'a Member>,
    roles: &HashMap<RoleId, Role>,
) -> Vec<MemberSnapshot> {
    members
        .into_iter()
        .map(|m| snapshot(m, role_names(roles, m.guild_id, &m.roles)))
        .collect()
}

fn cached_member(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<MemberSnapshot> {
    let guild = ctx.cache.guild(guild_id)?;
    let member = guild.members.get(&user_id)?;
    Some(snapshot(member, role_names(&guild.roles, guild_id, &member.roles)))
}

/// Routes gateway events into the tracker.
pub struct Handler {
    tracker: Arc<Tracker>,
}

impl Handler {
    pub fn new(tracker: Arc<Tracker>) -> Self {
        Self { tracker }
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!(
            user = %ready.user.name,
            guilds = ready.guilds.len(),
            "connected to Discord gateway"
        );
    }

    async fn guild_create(&self, ctx: Context, guild: Guild, _is_new: Option<bool>) {
        let members = snapshots(guild.members.values(), &guild.roles);
        self.tracker
            .guild_available(sql_id(guild.id.get()), &guild.name, &members)
            .await;

        if (guild.member_count as usize) > guild.members.len() {
            debug!(
                guild_id = guild.id.get(),
                cached = guild.members.len(),
                total = guild.member_count,
                "requesting full member list"
            );
            ctx.shard
                .chunk_guild(guild.id, None, false, ChunkGuildFilter::None, None);
        }
    }

    async fn guild_members_chunk(&self, ctx: Context, chunk: GuildMembersChunkEvent) {
        let members = match ctx.cache.guild(chunk.guild_id) {
            Some(guild) => snapshots(chunk.members.values(), &guild.roles),
            None => snapshots(chunk.members.values(), &HashMap::new()),
        };
        let last_chunk = chunk.chunk_index + 1 >= chunk.chunk_count;
        self.tracker
            .members_chunk(sql_id(chunk.guild_id.get()), &members, last_chunk)
            .await;
    }

    async fn guild_member_addition(&self, ctx: Context, new_member: Member) {
        let roles = cached_role_names(&ctx, new_member.guild_id, &new_member.roles);
        self.tracker.member_joined(&snapshot(&new_member, roles)).await;
    }

    async fn guild_member_removal(
        &self,
        ctx: Context,
        guild_id: GuildId,
        user: User,
        _member_data_if_available: Option<Member>,
    ) {
        if user.bot {
            return;
        }
        let Some(notice) = self
            .tracker
            .member_left(sql_id(guild_id.get()), sql_id(user.id.get()))
            .await
        else {
            return;
        };
        let Some(channel_id) = notice.channel_id else {
            debug!(guild_id = guild_id.get(), "no notification channel configured");
            return;
        };
        if let Err(e) = send_text(&ctx.http, channel_id, &leave_message(&notice.member)).await {
            warn!(guild_id = guild_id.get(), channel_id, error = %e, "failed to post leave notice");
        }
    }

    async fn guild_member_update(
        &self,
        ctx: Context,
        old_if_available: Option<Member>,
        _new: Option<Member>,
        event: GuildMemberUpdateEvent,
    ) {
        if event.user.bot {
            return;
        }
        let roles = cached_role_names(&ctx, event.guild_id, &event.roles);
        let after = MemberSnapshot {
            guild_id: sql_id(event.guild_id.get()),
            user_id: sql_id(event.user.id.get()),
            username: event.user.name.clone(),
            nickname: event.nick.clone(),
            joined_at: Some(event.joined_at.unix_timestamp()),
            roles,
            bot: false,
        };
        let before = old_if_available.as_ref().map(|old| {
            snapshot(old, cached_role_names(&ctx, old.guild_id, &old.roles))
        });
        self.tracker.member_updated(before.as_ref(), &after).await;

        // Usernames are global; carry a rename into the other shared guilds.
        if before.is_some_and(|b| b.username != after.username) {
            let others: Vec<i64> = ctx
                .cache
                .guilds()
                .into_iter()
                .filter(|id| *id != event.guild_id)
                .map(|id| sql_id(id.get()))
                .collect();
            self.tracker
                .user_renamed(after.user_id, &after.username, &others)
                .await;
        }
    }

    async fn presence_update(&self, ctx: Context, new_data: Presence) {
        if new_data.user.bot == Some(true) {
            return;
        }
        let Some(guild_id) = new_data.guild_id else {
            return;
        };
        let online = !matches!(new_data.status, OnlineStatus::Offline | OnlineStatus::Invisible);
        let (gid, uid) = (sql_id(guild_id.get()), sql_id(new_data.user.id.get()));

        if self.tracker.presence_changed(gid, uid, online).await {
            return;
        }
        // Unknown member: store it from the cache, then record the presence.
        if let Some(member) = cached_member(&ctx, guild_id, new_data.user.id)
            && !member.bot
            && self.tracker.member_updated(None, &member).await.added
        {
            self.tracker.presence_changed(gid, uid, online).await;
        }
    }

    async fn message(&self, _ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }
        let Some(guild_id) = msg.guild_id else {
            return;
        };
        self.tracker
            .message_sent(
                sql_id(guild_id.get()),
                sql_id(msg.channel_id.get()),
                sql_id(msg.author.id.get()),
                msg.timestamp.unix_timestamp(),
            )
            .await;
    }
}
