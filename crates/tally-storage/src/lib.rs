// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queue and metadata store backends for tally.
//!
//! Provides WAL-mode SQLite persistence with embedded migrations and a
//! single-writer concurrency model via `tokio-rusqlite`, plus in-memory
//! backends (with fault injection) for tests and local runs. Both backend
//! families implement the seams defined in `tally-core`.

pub mod database;
pub mod metadata;
pub mod migrations;
pub mod queue;

pub use database::{Database, DatabaseError};
pub use metadata::{
    InMemoryJobMetadataChangeFeed, InMemoryJobMetadataStore, SqliteJobMetadataChangeFeed,
    SqliteJobMetadataStore,
};
pub use queue::{InMemoryJobQueue, SqliteJobQueue};
