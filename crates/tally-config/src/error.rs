// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration error type.

use thiserror::Error;

/// A configuration problem: either the sources failed to parse/merge, or a
/// semantic validation rule failed after deserialization.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration parse error: {message}")]
    Parse { message: String },

    #[error("configuration validation error: {message}")]
    Validation { message: String },
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Parse {
            message: err.to_string(),
        }
    }
}
