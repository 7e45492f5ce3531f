// SPDX-FileCopyrightText: 2026 LastSeen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Discord gateway adapter for the LastSeen activity tracker.
//!
//! Uses serenity for gateway events and channel messages. The adapter stays
//! thin: every event becomes a [`Tracker`] call, and reports and leave
//! notices are posted as plain text.

pub mod handler;
pub mod notice;
pub mod publisher;

use std::sync::Arc;

use lastseen_core::LastSeenError;
use lastseen_tracking::Tracker;
use serenity::Client;
use serenity::all::GatewayIntents;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub use handler::Handler;
pub use notice::leave_message;
pub use publisher::{ChannelReportPublisher, MESSAGE_LIMIT, split_message};

/// Gateway intents the tracker needs: guild and member lifecycle, presences,
/// and message creation (content is not read).
pub fn intents() -> GatewayIntents {
    GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MEMBERS
        | GatewayIntents::GUILD_PRESENCES
        | GatewayIntents::GUILD_MESSAGES
}

/// A configured gateway client that has not started yet.
pub struct DiscordGateway {
    client: Client,
}

impl DiscordGateway {
    /// Build the serenity client. No connection is made until [`run`](Self::run).
    pub async fn connect(token: &str, tracker: Arc<Tracker>) -> Result<Self, LastSeenError> {
        let client = Client::builder(token, intents())
            .event_handler(Handler::new(tracker))
            .await
            .map_err(|e| LastSeenError::Channel {
                message: "failed to build Discord client".into(),
                source: Some(Box::new(e)),
            })?;
        Ok(Self { client })
    }

    /// A report publisher sharing this client's HTTP session.
    pub fn publisher(&self) -> ChannelReportPublisher {
        ChannelReportPublisher::new(self.client.http.clone())
    }

    /// Run the gateway until `cancel` fires or the connection fails.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), LastSeenError> {
        let shards = self.client.shard_manager.clone();
        let watcher = tokio::spawn(async move {
            cancel.cancelled().await;
            info!("disconnecting from Discord");
            shards.shutdown_all().await;
        });

        let result = self.client.start().await.map_err(|e| LastSeenError::Channel {
            message: "Discord gateway stopped".into(),
            source: Some(Box::new(e)),
        });
        watcher.abort();
        result
    }
}
