// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Job queue seam implemented by the concrete queue backends.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::QueueError;
use crate::types::{JobKey, JobQueueItem};

/// Interface for the job processing queue.
///
/// The queue is purely a delivery mechanism: it never answers "has this job
/// been started" (the metadata store does), and the lease is an advisory
/// mutual-exclusion mechanism only. There is no queue-side redelivery
/// limit; attempt counting lives in the metadata store.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Place a job on the queue.
    async fn send_job(&self, job_key: &JobKey, server_job_id: &str) -> Result<(), QueueError>;

    /// Blocking call to receive a message.
    ///
    /// Returns at most one item, waiting up to the backend's configured
    /// maximum before returning `None`. On receipt the message becomes
    /// invisible to other receivers for the configured lease duration and a
    /// fresh receipt is issued.
    async fn receive_job(&self) -> Result<Option<JobQueueItem>, QueueError>;

    /// Acknowledge that a job finished processing so its message can be
    /// deleted, identified solely by the item's receipt. A stale or
    /// already-acknowledged receipt is a benign no-op, never data loss.
    async fn acknowledge_job_completion(&self, item: &JobQueueItem) -> Result<(), QueueError>;

    /// Change the remaining invisibility window of a held message. A zero
    /// duration makes the message eligible for immediate redelivery under a
    /// new receipt.
    async fn modify_job_processing_time(
        &self,
        item: &JobQueueItem,
        processing_time: Duration,
    ) -> Result<(), QueueError>;
}
