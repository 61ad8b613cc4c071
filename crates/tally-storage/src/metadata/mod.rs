// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metadata store backends.

pub mod memory;
pub mod sqlite;

pub use memory::{InMemoryJobMetadataChangeFeed, InMemoryJobMetadataStore};
pub use sqlite::{SqliteJobMetadataChangeFeed, SqliteJobMetadataStore};
