// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Worker-side job client for tally.
//!
//! Gets jobs from the queue, correlates them with their metadata entries,
//! and records completion, retry, and error-summary state. Once a job's
//! processing finishes, the worker asks the client to mark it completed in
//! both the queue and the metadata store.

pub mod client;
pub mod model;
pub mod validators;

pub use client::{JobClient, WorkerJobClient};
pub use model::{ErrorReason, JobClientError, JobResult, JobRetryRequest};
pub use validators::{CheckJobStatus, CheckRetryLimit, JobValidator};
