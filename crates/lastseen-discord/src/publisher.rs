// SPDX-FileCopyrightText: 2026 LastSeen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Posting plain-text bodies to Discord channels.

use std::sync::Arc;

use async_trait::async_trait;
use lastseen_core::{LastSeenError, ReportPublisher};
use serenity::http::Http;
use serenity::model::id::ChannelId;
use tracing::debug;

/// Discord's per-message content limit, in characters.
pub const MESSAGE_LIMIT: usize = 2000;

/// Split `body` into chunks of at most `limit` characters.
///
/// Chunks break after a newline whenever one fits; a single line longer than
/// `limit` is cut at character boundaries.
pub fn split_message(body: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in body.split_inclusive('\n') {
        let line_len = line.chars().count();
        if current_len + line_len > limit && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if line_len <= limit {
            current.push_str(line);
            current_len += line_len;
            continue;
        }
        for ch in line.chars() {
            if current_len == limit {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            current.push(ch);
            current_len += 1;
        }
    }

    chunks.push(current);
    chunks
        .into_iter()
        .filter(|chunk| !chunk.trim().is_empty())
        .collect()
}

/// Send `body` to `channel_id`, split into message-sized chunks.
pub async fn send_text(http: &Http, channel_id: i64, body: &str) -> Result<(), LastSeenError> {
    let channel = ChannelId::new(channel_id as u64);
    for chunk in split_message(body, MESSAGE_LIMIT) {
        channel
            .say(http, chunk)
            .await
            .map_err(|e| LastSeenError::Channel {
                message: format!("failed to post to channel {channel_id}"),
                source: Some(Box::new(e)),
            })?;
    }
    Ok(())
}

/// Delivers scheduled reports through the bot's HTTP client.
pub struct ChannelReportPublisher {
    http: Arc<Http>,
}

impl ChannelReportPublisher {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ReportPublisher for ChannelReportPublisher {
    async fn publish(&self, guild_id: i64, channel_id: i64, body: &str) -> Result<(), LastSeenError> {
        debug!(guild_id, channel_id, len = body.len(), "posting report");
        send_text(&self.http, channel_id, body).await
    }
}
