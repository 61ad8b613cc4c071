// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes, such as non-empty database paths and positive durations.

use crate::error::ConfigError;
use crate::model::{MetadataBackend, QueueBackend, TallyConfig};

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &TallyConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.queue.backend == QueueBackend::Sqlite
        && config.queue.database_path.trim().is_empty()
    {
        errors.push(ConfigError::Validation {
            message: "queue.database_path must not be empty for the sqlite backend".to_string(),
        });
    }

    if config.metadata.backend == MetadataBackend::Sqlite
        && config.metadata.database_path.trim().is_empty()
    {
        errors.push(ConfigError::Validation {
            message: "metadata.database_path must not be empty for the sqlite backend"
                .to_string(),
        });
    }

    if config.queue.message_lease_seconds == 0 {
        errors.push(ConfigError::Validation {
            message: "queue.message_lease_seconds must be positive".to_string(),
        });
    }

    if config.queue.receive_poll_interval_ms == 0 {
        errors.push(ConfigError::Validation {
            message: "queue.receive_poll_interval_ms must be positive".to_string(),
        });
    }

    if config.metadata.retention_days == 0 {
        errors.push(ConfigError::Validation {
            message: "metadata.retention_days must be positive".to_string(),
        });
    }

    if config.client.max_num_attempts <= 0 {
        errors.push(ConfigError::Validation {
            message: format!(
                "client.max_num_attempts must be positive, got {}",
                config.client.max_num_attempts
            ),
        });
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&TallyConfig::default()).is_ok());
    }

    #[test]
    fn empty_sqlite_path_is_rejected() {
        let mut config = TallyConfig::default();
        config.queue.database_path = "  ".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].to_string().contains("queue.database_path"));
    }

    #[test]
    fn all_errors_are_collected() {
        let mut config = TallyConfig::default();
        config.queue.message_lease_seconds = 0;
        config.metadata.retention_days = 0;
        config.client.max_num_attempts = 0;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn memory_backend_ignores_database_path() {
        let mut config = TallyConfig::default();
        config.queue.backend = QueueBackend::Memory;
        config.metadata.backend = MetadataBackend::Memory;
        config.queue.database_path = String::new();
        config.metadata.database_path = String::new();
        assert!(validate_config(&config).is_ok());
    }
}
