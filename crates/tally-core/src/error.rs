// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types shared across the queue and metadata store seams.

use thiserror::Error;

/// Boxed error source used for backend causes.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors surfaced by job queue backends.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Backend I/O failure (connect, publish, receive, delete). Surfaced
    /// as-is; retry policy belongs to the caller.
    #[error("queue backend error: {source}")]
    Backend { source: BoxError },

    /// A received message carried an unrecognized body-type attribute.
    #[error("invalid message body type: {0}")]
    InvalidBodyType(String),
}

impl QueueError {
    /// Wrap a backend cause.
    pub fn backend(source: impl Into<BoxError>) -> Self {
        Self::Backend {
            source: source.into(),
        }
    }
}

/// Errors surfaced by metadata store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An insert was attempted for a job key that is already in use.
    #[error("metadata entry for job '{0}' already exists")]
    JobKeyExists(String),

    /// The store's state is in conflict with what an update expected: the
    /// row does not exist (never created, or deleted), or another writer
    /// resolved it first.
    #[error("metadata entry for job '{0}' conflicts with the requested update")]
    Conflict(String),

    /// record_version is store-managed and must not be set on insert.
    #[error("record_version must not be set when inserting metadata for job '{0}'")]
    RecordVersionPreset(String),

    /// Backend I/O failure (connect, read, write). Surfaced as-is; retry
    /// policy belongs to the caller.
    #[error("metadata store backend error: {source}")]
    Backend { source: BoxError },
}

impl StoreError {
    /// Wrap a backend cause.
    pub fn backend(source: impl Into<BoxError>) -> Self {
        Self::Backend {
            source: source.into(),
        }
    }
}
