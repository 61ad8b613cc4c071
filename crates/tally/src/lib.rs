// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Aggregation-job lifecycle coordination.
//!
//! Jobs are handed to a pool of workers through a lease-based queue while a
//! durable metadata store tracks each job's lifecycle. No transaction spans
//! the two backends; creation, retrieval, retry, and completion are each
//! individually consistent, and a reconciliation pass repairs jobs stranded
//! between them.
//!
//! This facade crate re-exports the workspace's public surface and provides
//! the [`composition::Services`] root that wires concrete backends from
//! configuration.

pub mod composition;

pub use composition::{CompositionError, Services};
pub use tally_config::{self as config, TallyConfig};
pub use tally_core::{
    BackoffPolicy, ErrorSummary, Job, JobKey, JobMessage, JobMetadata, JobMetadataChangeFeed,
    JobMetadataStore, JobQueue, JobQueueItem, JobStatus, QueueError, RequestInfo, ResultInfo,
    ReturnCode, StoreError,
};
pub use tally_frontend::{
    CreateJobError, CreateJobTask, GetJobError, GetJobTask, ReconcileRunner,
};
pub use tally_jobclient::{
    ErrorReason, JobClient, JobClientError, JobResult, JobRetryRequest, WorkerJobClient,
};

/// Install a `tracing` subscriber honoring `RUST_LOG`, for hosts that do
/// not bring their own.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}
