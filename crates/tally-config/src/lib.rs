// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration system for tally.
//!
//! Provides TOML configuration parsing with strict validation
//! (`deny_unknown_fields`), XDG file hierarchy lookup, and environment
//! variable overrides.
//!
//! # Usage
//!
//! ```no_run
//! use tally_config::load_and_validate;
//!
//! let config = load_and_validate().expect("config errors");
//! println!("queue backend: {:?}", config.queue.backend);
//! ```

pub mod error;
pub mod loader;
pub mod model;
pub mod validation;

pub use error::ConfigError;
pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::{
    ClientConfig, CreationStrategy, FrontendConfig, MetadataBackend, MetadataConfig,
    QueueBackend, QueueConfig, TallyConfig,
};

/// Load configuration from the XDG hierarchy and validate it.
///
/// Returns either a valid `TallyConfig` or the full list of collected
/// errors.
pub fn load_and_validate() -> Result<TallyConfig, Vec<ConfigError>> {
    match loader::load_config() {
        Ok(config) => {
            validation::validate_config(&config)?;
            Ok(config)
        }
        Err(err) => Err(vec![err.into()]),
    }
}

/// Load configuration from a TOML string and validate it.
///
/// Useful for testing and explicit configuration.
pub fn load_and_validate_str(toml_content: &str) -> Result<TallyConfig, Vec<ConfigError>> {
    match loader::load_config_from_str(toml_content) {
        Ok(config) => {
            validation::validate_config(&config)?;
            Ok(config)
        }
        Err(err) => Err(vec![err.into()]),
    }
}
