// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background
//! thread. Do NOT create additional Connection instances for writes; clone
//! the handle instead.

use thiserror::Error;
use tokio_rusqlite::Connection;
use tracing::debug;

use crate::migrations;

/// Errors opening or closing the database.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] tokio_rusqlite::Error),

    #[error("migration error: {0}")]
    Migration(#[from] refinery::Error),
}

/// Handle to the SQLite database shared by the queue and metadata backends.
///
/// Cloning is cheap and shares the same underlying connection.
#[derive(Clone)]
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the database at `path`, apply PRAGMAs, and run all
    /// pending migrations.
    pub async fn open(path: &str) -> Result<Self, DatabaseError> {
        let conn = Connection::open(path)
            .await
            .map_err(tokio_rusqlite::Error::from)?;

        conn.call(|conn| -> Result<(), rusqlite::Error> {
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA busy_timeout = 5000;
                 PRAGMA foreign_keys = ON;",
            )?;
            Ok(())
        })
        .await?;

        // Refinery runs synchronously on the connection thread; its outcome
        // rides inside the call's Ok value.
        let report = conn
            .call(|conn| -> Result<Result<(), refinery::Error>, rusqlite::Error> {
                Ok(migrations::run_migrations(conn))
            })
            .await?;
        report?;

        debug!(path, "database opened");
        Ok(Self { conn })
    }

    /// Returns the shared connection handle.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Checkpoint the WAL and close the connection.
    pub async fn close(&self) -> Result<(), DatabaseError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await?;
        debug!("WAL checkpoint complete");
        Ok(())
    }
}
