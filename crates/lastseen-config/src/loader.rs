// SPDX-FileCopyrightText: 2026 LastSeen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./lastseen.toml` > `~/.config/lastseen/lastseen.toml` >
//! `/etc/lastseen/lastseen.toml` with environment variable overrides via `LASTSEEN_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::LastSeenConfig;

/// Top-level sections recognized in `LASTSEEN_<SECTION>_<KEY>` variables.
const SECTIONS: &[&str] = &[
    "bot",
    "discord",
    "storage",
    "buffer",
    "backup",
    "maintenance",
];

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/lastseen/lastseen.toml` (system-wide)
/// 3. `~/.config/lastseen/lastseen.toml` (user XDG config)
/// 4. `./lastseen.toml` (local directory)
/// 5. `DISCORD_BOT_TOKEN`, then `LASTSEEN_*` environment variables
pub fn load_config() -> Result<LastSeenConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no environment).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<LastSeenConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(LastSeenConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<LastSeenConfig, figment::Error> {
    tracing::debug!(path = %path.display(), "loading configuration file");
    Figment::new()
        .merge(Serialized::defaults(LastSeenConfig::default()))
        .merge(Toml::file(path))
        .merge(token_alias_provider())
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading (exposed for diagnostic use).
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(LastSeenConfig::default()))
        .merge(Toml::file("/etc/lastseen/lastseen.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("lastseen/lastseen.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("lastseen.toml"))
        .merge(token_alias_provider())
        .merge(env_provider())
}

/// `DISCORD_BOT_TOKEN` is accepted as an alias for `discord.bot_token`.
fn token_alias_provider() -> Env {
    Env::raw()
        .only(&["DISCORD_BOT_TOKEN"])
        .map(|_| "discord.bot_token".into())
}

/// Environment provider mapping `LASTSEEN_<SECTION>_<KEY>` to `section.key`.
///
/// Only the first underscore after a known section name is treated as the
/// separator, so `LASTSEEN_BUFFER_MAX_BUFFERED_KEYS` maps to
/// `buffer.max_buffered_keys`.
fn env_provider() -> Env {
    Env::prefixed("LASTSEEN_").map(|key| section_key(key.as_str()).into())
}

fn section_key(key: &str) -> String {
    for section in SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|rest| rest.strip_prefix('_'))
        {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}
