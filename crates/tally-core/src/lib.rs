// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the tally job coordination layer.
//!
//! This crate provides the shared value types, the error taxonomy, the
//! backend trait seams (queue, metadata store, change feed), and the
//! explicit backoff policy used throughout the workspace. Concrete backends
//! implement the traits defined here.

pub mod backoff;
pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use backoff::BackoffPolicy;
pub use error::{BoxError, QueueError, StoreError};
pub use traits::{JobMetadataChangeFeed, JobMetadataStore, JobQueue};
pub use types::{
    ErrorSummary, Job, JobKey, JobMessage, JobMetadata, JobQueueItem, JobStatus, RequestInfo,
    ResultInfo, ReturnCode, JSON_BODY_TYPE,
};
