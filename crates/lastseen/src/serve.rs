// SPDX-FileCopyrightText: 2026 LastSeen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `lastseen serve` command implementation.
//!
//! Wires the store, the activity buffer, the tracker, the maintenance jobs,
//! and the Discord gateway together, then runs until a shutdown signal.
//! Shutdown order: gateway, maintenance loops, final buffer flush, store.

use std::sync::Arc;
use std::time::Duration;

use lastseen_config::LastSeenConfig;
use lastseen_core::LastSeenError;
use lastseen_cron::Maintenance;
use lastseen_discord::DiscordGateway;
use lastseen_storage::{GuildDefaults, SqliteStore};
use lastseen_tracking::{ActivityBuffer, BufferSettings, Tracker, shutdown};
use tracing::{info, warn};

fn bot_token(config: &LastSeenConfig) -> Result<String, LastSeenError> {
    config
        .discord
        .bot_token
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            LastSeenError::Config(
                "discord.bot_token is not set (or export DISCORD_BOT_TOKEN)".to_string(),
            )
        })
}

/// Run the bot until SIGINT/SIGTERM or a fatal gateway error.
pub async fn run_serve(config: LastSeenConfig) -> Result<(), LastSeenError> {
    info!("starting lastseen serve");
    let token = bot_token(&config)?;

    let store = Arc::new(
        SqliteStore::open(config.storage.clone())
            .await?
            .with_guild_defaults(GuildDefaults::from(&config.bot)),
    );
    let health = store.get_database_health().await;
    if health.is_healthy() {
        info!(
            path = %config.storage.database_path,
            size_bytes = health.file_size_bytes,
            "database ready"
        );
    } else {
        warn!(?health, "database health check failed, continuing");
    }

    let settings = BufferSettings::from(&config.buffer);
    let buffer = Arc::new(ActivityBuffer::new(store.clone(), settings));
    let tracker = Arc::new(Tracker::new(store.clone(), buffer.clone()));

    let cancel = shutdown::install_signal_handler();
    buffer.spawn(cancel.clone());

    let gateway = match DiscordGateway::connect(&token, tracker).await {
        Ok(gateway) => gateway,
        Err(e) => {
            cancel.cancel();
            buffer.shutdown().await;
            store.close().await?;
            return Err(e);
        }
    };
    let maintenance = Maintenance::spawn(
        store.clone(),
        Arc::new(gateway.publisher()),
        &config.maintenance,
        &config.backup,
        cancel.clone(),
    );

    let result = gateway.run(cancel.clone()).await;
    if let Err(e) = &result {
        warn!(error = %e, "gateway stopped unexpectedly, shutting down");
    }
    cancel.cancel();

    shutdown::drain(
        "maintenance jobs",
        settings.shutdown_timeout.max(Duration::from_secs(1)),
        maintenance.join(),
    )
    .await;
    let report = buffer.shutdown().await;
    info!(
        delivered = report.delivered,
        abandoned = report.abandoned,
        "activity buffer drained"
    );
    store.close().await?;

    info!("lastseen serve shutdown complete");
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_or_blank_token_is_a_config_error() {
        let mut config = lastseen_config::load_and_validate_str("").unwrap();
        config.discord.bot_token = None;
        assert!(matches!(bot_token(&config), Err(LastSeenError::Config(_))));

        config.discord.bot_token = Some("   ".into());
        assert!(matches!(bot_token(&config), Err(LastSeenError::Config(_))));

        config.discord.bot_token = Some(" abc.def ".into());
        assert_eq!(bot_token(&config).unwrap(), "abc.def");
    }

    #[tokio::test]
    async fn serve_refuses_to_start_without_token() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = lastseen_config::load_and_validate_str("").unwrap();
        config.storage.database_path = dir.path().join("serve.db").display().to_string();
        config.discord.bot_token = None;
        assert!(run_serve(config).await.is_err());
        assert!(!dir.path().join("serve.db").exists());
    }
}
