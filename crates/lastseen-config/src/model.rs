// SPDX-FileCopyrightText: 2026 LastSeen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the LastSeen activity tracker.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level LastSeen configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LastSeenConfig {
    /// Bot-wide behavior and per-guild defaults.
    #[serde(default)]
    pub bot: BotConfig,

    /// Discord gateway settings.
    #[serde(default)]
    pub discord: DiscordConfig,

    /// SQLite storage settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Message-activity buffer settings.
    #[serde(default)]
    pub buffer: BufferConfig,

    /// Database backup settings.
    #[serde(default)]
    pub backup: BackupConfig,

    /// Periodic maintenance job intervals.
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
}

/// Bot-wide behavior and defaults applied to newly registered guilds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BotConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Days without presence before a member counts as inactive.
    #[serde(default = "default_inactive_days")]
    pub default_inactive_days: i64,

    /// Role name granting access to admin commands.
    #[serde(default = "default_bot_admin_role_name")]
    pub bot_admin_role_name: String,

    /// Days of message activity kept per guild.
    #[serde(default = "default_retention_days")]
    pub default_retention_days: i64,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            default_inactive_days: default_inactive_days(),
            bot_admin_role_name: default_bot_admin_role_name(),
            default_retention_days: default_retention_days(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_inactive_days() -> i64 {
    10
}

fn default_bot_admin_role_name() -> String {
    "Bot Admin".to_string()
}

fn default_retention_days() -> i64 {
    365
}

/// Discord gateway configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DiscordConfig {
    /// Bot token. `None` means `serve` refuses to start.
    #[serde(default)]
    pub bot_token: Option<String>,
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,

    /// Number of pooled connections opened at startup.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// SQLite busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
            pool_size: default_pool_size(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("lastseen").join("lastseen.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("lastseen.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

fn default_pool_size() -> usize {
    4
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

/// Message-activity buffer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BufferConfig {
    /// Seconds between periodic flushes.
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,

    /// Pending keys that trigger an immediate flush.
    #[serde(default = "default_max_buffered_keys")]
    pub max_buffered_keys: usize,

    /// Failed flush cycles after which a pending count is discarded.
    #[serde(default = "default_max_flush_retries")]
    pub max_flush_retries: u32,

    /// Upper bound on the final flush during shutdown.
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            flush_interval_secs: default_flush_interval_secs(),
            max_buffered_keys: default_max_buffered_keys(),
            max_flush_retries: default_max_flush_retries(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

fn default_flush_interval_secs() -> u64 {
    30
}

fn default_max_buffered_keys() -> usize {
    10_000
}

fn default_max_flush_retries() -> u32 {
    120
}

fn default_shutdown_timeout_secs() -> u64 {
    10
}

/// Database backup configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BackupConfig {
    /// Run the periodic backup job.
    #[serde(default = "default_backup_enabled")]
    pub enabled: bool,

    /// Directory receiving backup files.
    #[serde(default = "default_backup_folder")]
    pub folder: String,

    /// Minimum hours between two backups.
    #[serde(default = "default_backup_interval_hours")]
    pub interval_hours: u64,

    /// Number of most recent backups kept.
    #[serde(default = "default_backup_retention_count")]
    pub retention_count: usize,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            enabled: default_backup_enabled(),
            folder: default_backup_folder(),
            interval_hours: default_backup_interval_hours(),
            retention_count: default_backup_retention_count(),
        }
    }
}

fn default_backup_enabled() -> bool {
    true
}

fn default_backup_folder() -> String {
    "backups".to_string()
}

fn default_backup_interval_hours() -> u64 {
    24
}

fn default_backup_retention_count() -> usize {
    5
}

/// Intervals of the periodic maintenance jobs.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MaintenanceConfig {
    #[serde(default = "default_retention_interval_secs")]
    pub retention_interval_secs: u64,

    #[serde(default = "default_report_check_interval_secs")]
    pub report_check_interval_secs: u64,

    #[serde(default = "default_backup_check_interval_secs")]
    pub backup_check_interval_secs: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            retention_interval_secs: default_retention_interval_secs(),
            report_check_interval_secs: default_report_check_interval_secs(),
            backup_check_interval_secs: default_backup_check_interval_secs(),
        }
    }
}

fn default_retention_interval_secs() -> u64 {
    86_400
}

fn default_report_check_interval_secs() -> u64 {
    3_600
}

fn default_backup_check_interval_secs() -> u64 {
    3_600
}
