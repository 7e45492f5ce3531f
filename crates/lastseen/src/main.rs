// SPDX-FileCopyrightText: 2026 LastSeen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! LastSeen - Discord server-activity tracker.
//!
//! This is the binary entry point: the gateway service plus offline
//! maintenance commands against the same database.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod commands;
mod serve;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use lastseen_config::LastSeenConfig;

use crate::commands::ExportFormat;

/// LastSeen - Discord server-activity tracker.
#[derive(Parser, Debug)]
#[command(name = "lastseen", version, about, long_about = None)]
struct Cli {
    /// Configuration file to load instead of the standard lookup.
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Connect to Discord and track activity until interrupted.
    Serve,
    /// Snapshot the database into the backup folder and rotate old snapshots.
    Backup {
        /// Folder receiving the snapshot (defaults to `backup.folder`).
        #[arg(long)]
        folder: Option<PathBuf>,
    },
    /// Replace the database with a snapshot. Stop the bot first.
    Restore {
        /// Snapshot file to restore from.
        from: PathBuf,
    },
    /// Export a guild's members as CSV or aligned text.
    Export {
        /// Guild to export.
        guild_id: i64,
        #[arg(long, value_enum, default_value_t = ExportFormat::Csv)]
        format: ExportFormat,
        /// Write to this file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Purge message activity older than the retention window.
    Cleanup {
        /// Limit the purge to one guild.
        #[arg(long)]
        guild: Option<i64>,
        /// Override the retention window in days (requires --guild).
        #[arg(long, requires = "guild")]
        days: Option<i64>,
    },
    /// Validate the configuration and exit.
    CheckConfig,
}

fn load_config(path: Option<&std::path::Path>) -> LastSeenConfig {
    let loaded = match path {
        Some(path) => lastseen_config::load_and_validate_path(path),
        None => lastseen_config::load_and_validate(),
    };
    match loaded {
        Ok(config) => config,
        Err(errors) => {
            lastseen_config::render_errors(&errors);
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref());
    init_tracing(&config.bot.log_level);

    let result = match cli.command {
        Some(Commands::Serve) => serve::run_serve(config).await,
        Some(Commands::Backup { folder }) => commands::run_backup(&config, folder.as_deref()).map(|_| ()),
        Some(Commands::Restore { from }) => commands::run_restore(&config, &from),
        Some(Commands::Export {
            guild_id,
            format,
            output,
        }) => commands::run_export(&config, guild_id, format, output.as_deref()).await,
        Some(Commands::Cleanup { guild, days }) => commands::run_cleanup(&config, guild, days).await,
        Some(Commands::CheckConfig) => {
            commands::print_config_summary(&config);
            Ok(())
        }
        None => {
            println!("lastseen: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("lastseen: {e}");
        std::process::exit(1);
    }
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("lastseen={log_level},serenity=warn,warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    #[cfg(not(target_env = "msvc"))]
    fn jemalloc_is_active() {
        use tikv_jemalloc_ctl::{epoch, stats};
        epoch::advance().unwrap();
        let allocated = stats::allocated::read().unwrap();
        assert!(allocated > 0, "jemalloc should report non-zero allocation");
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_export_arguments() {
        let cli = Cli::try_parse_from([
            "lastseen", "--config", "bot.toml", "export", "42", "--format", "txt", "-o", "out.txt",
        ])
        .unwrap();
        assert_eq!(cli.config.as_deref(), Some(std::path::Path::new("bot.toml")));
        match cli.command {
            Some(Commands::Export {
                guild_id,
                format,
                output,
            }) => {
                assert_eq!(guild_id, 42);
                assert_eq!(format, ExportFormat::Txt);
                assert_eq!(output, Some(PathBuf::from("out.txt")));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn cleanup_days_requires_guild() {
        assert!(Cli::try_parse_from(["lastseen", "cleanup", "--days", "30"]).is_err());
        assert!(Cli::try_parse_from(["lastseen", "cleanup", "--guild", "1", "--days", "30"]).is_ok());
    }

    #[test]
    fn binary_loads_config_defaults() {
        let config = lastseen_config::load_and_validate_str("")
            .expect("default config should be valid");
        assert_eq!(config.bot.log_level, "info");
        assert_eq!(config.backup.retention_count, 5);
    }
}
