// SPDX-FileCopyrightText: 2026 LastSeen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as non-empty paths, positive counts, and non-zero intervals.

use crate::diagnostic::ConfigError;
use crate::model::LastSeenConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &LastSeenConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut invalid = |message: String| errors.push(ConfigError::Validation { message });

    if !LOG_LEVELS.contains(&config.bot.log_level.to_ascii_lowercase().as_str()) {
        invalid(format!(
            "bot.log_level `{}` is not one of {}",
            config.bot.log_level,
            LOG_LEVELS.join(", ")
        ));
    }

    if config.bot.default_inactive_days < 1 {
        invalid(format!(
            "bot.default_inactive_days must be at least 1, got {}",
            config.bot.default_inactive_days
        ));
    }

    if config.bot.default_retention_days < 1 {
        invalid(format!(
            "bot.default_retention_days must be at least 1, got {}",
            config.bot.default_retention_days
        ));
    }

    if config.storage.database_path.trim().is_empty() {
        invalid("storage.database_path must not be empty".to_string());
    }

    if config.storage.pool_size < 1 {
        invalid("storage.pool_size must be at least 1".to_string());
    }

    if config.buffer.flush_interval_secs == 0 {
        invalid("buffer.flush_interval_secs must be greater than 0".to_string());
    }

    if config.buffer.max_buffered_keys < 1 {
        invalid("buffer.max_buffered_keys must be at least 1".to_string());
    }

    if config.backup.folder.trim().is_empty() {
        invalid("backup.folder must not be empty".to_string());
    }

    if config.backup.interval_hours < 1 {
        invalid("backup.interval_hours must be at least 1".to_string());
    }

    if config.backup.retention_count < 1 {
        invalid("backup.retention_count must be at least 1".to_string());
    }

    for (name, value) in [
        (
            "maintenance.retention_interval_secs",
            config.maintenance.retention_interval_secs,
        ),
        (
            "maintenance.report_check_interval_secs",
            config.maintenance.report_check_interval_secs,
        ),
        (
            "maintenance.backup_check_interval_secs",
            config.maintenance.backup_check_interval_secs,
        ),
    ] {
        if value == 0 {
            invalid(format!("{name} must be greater than 0"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has_message(errors: &[ConfigError], needle: &str) -> bool {
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains(needle)))
    }

    #[test]
    fn default_config_validates() {
        let config = LastSeenConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn empty_database_path_fails_validation() {
        let mut config = LastSeenConfig::default();
        config.storage.database_path = "".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(has_message(&errors, "database_path"));
    }

    #[test]
    fn zero_pool_size_fails_validation() {
        let mut config = LastSeenConfig::default();
        config.storage.pool_size = 0;
        let errors = validate_config(&config).unwrap_err();
        assert!(has_message(&errors, "pool_size"));
    }

    #[test]
    fn all_errors_are_collected() {
        let mut config = LastSeenConfig::default();
        config.backup.retention_count = 0;
        config.backup.interval_hours = 0;
        config.maintenance.report_check_interval_secs = 0;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(has_message(&errors, "retention_count"));
        assert!(has_message(&errors, "interval_hours"));
        assert!(has_message(&errors, "report_check_interval_secs"));
    }

    #[test]
    fn unknown_log_level_fails_validation() {
        let mut config = LastSeenConfig::default();
        config.bot.log_level = "loud".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(has_message(&errors, "log_level"));
    }

    #[test]
    fn inactive_days_must_be_positive() {
        let mut config = LastSeenConfig::default();
        config.bot.default_inactive_days = 0;
        let errors = validate_config(&config).unwrap_err();
        assert!(has_message(&errors, "default_inactive_days"));
    }

    #[test]
    fn buffer_section_deserializes_with_partial_overrides() {
        let toml_str = r#"
[buffer]
flush_interval_secs = 5
"#;
        let config: LastSeenConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.buffer.flush_interval_secs, 5);
        assert_eq!(config.buffer.max_buffered_keys, 10_000);
        assert_eq!(config.buffer.max_flush_retries, 120);
    }

    #[test]
    fn backup_deny_unknown_fields() {
        let toml_str = r#"
[backup]
retention = 3
"#;
        assert!(toml::from_str::<LastSeenConfig>(toml_str).is_err());
    }
}
