// SPDX-FileCopyrightText: 2026 LastSeen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Offline maintenance commands: `backup`, `restore`, `export`, `cleanup`,
//! and `check-config`.
//!
//! `backup` and `restore` work on the database file directly with SQLite's
//! online backup API, so `backup` is safe while the bot is running.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use lastseen_config::LastSeenConfig;
use lastseen_core::LastSeenError;
use lastseen_storage::{SqliteStore, backup, export};

/// Output format of `lastseen export`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExportFormat {
    Csv,
    Txt,
}

/// Snapshot the database and rotate old snapshots. Returns the new file.
pub fn run_backup(config: &LastSeenConfig, folder: Option<&Path>) -> Result<PathBuf, LastSeenError> {
    let folder = folder.unwrap_or_else(|| Path::new(&config.backup.folder));
    let db_path = Path::new(&config.storage.database_path);

    let path = backup::create_backup(db_path, folder, Utc::now())?;
    let removed = backup::cleanup_old_backups(folder, config.backup.retention_count)?;

    let size_mb = std::fs::metadata(&path)
        .map(|m| m.len() as f64 / (1024.0 * 1024.0))
        .unwrap_or_default();
    eprintln!(
        "Backup complete: {size_mb:.1} MB written to {} ({removed} old snapshot(s) removed)",
        path.display()
    );
    Ok(path)
}

pub fn run_restore(config: &LastSeenConfig, from: &Path) -> Result<(), LastSeenError> {
    let db_path = Path::new(&config.storage.database_path);
    backup::restore_backup(db_path, from)?;
    eprintln!("Restore complete: {} -> {}", from.display(), db_path.display());
    Ok(())
}

async fn open_store(config: &LastSeenConfig) -> Result<SqliteStore, LastSeenError> {
    Ok(SqliteStore::open(config.storage.clone())
        .await?
        .with_guild_defaults((&config.bot).into()))
}

/// Write every stored member of `guild_id` to `output` or stdout.
pub async fn run_export(
    config: &LastSeenConfig,
    guild_id: i64,
    format: ExportFormat,
    output: Option<&Path>,
) -> Result<(), LastSeenError> {
    let store = open_store(config).await?;
    let members = store.get_all_guild_members(guild_id).await;
    store.close().await?;

    let rendered = match format {
        ExportFormat::Csv => export::members_to_csv(&members)?,
        ExportFormat::Txt => export::members_to_txt(&members),
    };

    match output {
        Some(path) => {
            std::fs::write(path, rendered.as_bytes()).map_err(LastSeenError::storage)?;
            eprintln!("Exported {} member(s) to {}", members.len(), path.display());
        }
        None => std::io::stdout()
            .write_all(rendered.as_bytes())
            .map_err(LastSeenError::storage)?,
    }
    Ok(())
}

/// Purge expired message activity for one guild or all of them.
pub async fn run_cleanup(
    config: &LastSeenConfig,
    guild: Option<i64>,
    days: Option<i64>,
) -> Result<(), LastSeenError> {
    let store = open_store(config).await?;
    let counts = match guild {
        Some(guild_id) => {
            let days = match days {
                Some(days) => days,
                None => store
                    .get_guild_config(guild_id)
                    .await
                    .map_or(config.bot.default_retention_days, |g| g.message_retention_days),
            };
            store.cleanup_old_message_activity(guild_id, days).await
        }
        None => store.cleanup_all_guilds_message_activity().await,
    };
    store.close().await?;
    eprintln!(
        "Cleanup complete: {} daily and {} hourly row(s) removed",
        counts.daily, counts.hourly
    );
    Ok(())
}

/// Print the effective settings for `check-config`. The bot token is never shown.
pub fn print_config_summary(config: &LastSeenConfig) {
    let token = match config.discord.bot_token.as_deref() {
        Some(t) if !t.trim().is_empty() => "set",
        _ => "missing (serve will refuse to start)",
    };
    println!("lastseen: configuration OK");
    println!("  database:      {}", config.storage.database_path);
    println!("  bot token:     {token}");
    println!("  log level:     {}", config.bot.log_level);
    println!(
        "  backups:       {} (every {}h, keep {}, folder {})",
        if config.backup.enabled { "enabled" } else { "disabled" },
        config.backup.interval_hours,
        config.backup.retention_count,
        config.backup.folder
    );
    println!(
        "  buffer flush:  every {}s, up to {} keys",
        config.buffer.flush_interval_secs, config.buffer.max_buffered_keys
    );
}
