// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Change-driven repair of jobs stuck between the store and the queue.
//!
//! A runner polls the metadata change feed and dispatches every changed
//! entry to each registered handler whose predicate matches. Multiple
//! processes may observe the same stale entry, so handlers treat an update
//! conflict as "another writer already resolved it" and swallow it; only
//! store-connectivity failures escalate, letting the calling infrastructure
//! restart the whole pass.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};

use tally_core::types::{ErrorSummary, ResultInfo};
use tally_core::{
    BoxError, JobMetadata, JobMetadataChangeFeed, JobMetadataStore, JobStatus, ReturnCode,
    StoreError,
};

/// Fatal reconciliation failure: the store or feed is unreachable. The
/// supervising infrastructure should restart and retry the pass.
#[derive(Debug, Error)]
#[error("reconciliation pass failed: {source}")]
pub struct ReconcileError {
    source: BoxError,
}

impl ReconcileError {
    fn new(source: impl Into<BoxError>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

/// Reacts to changed metadata entries.
#[async_trait]
pub trait JobMetadataChangeHandler: Send + Sync {
    /// Whether this handler applies to the given entry.
    fn can_handle(&self, metadata: &JobMetadata) -> bool;

    /// Handle one changed entry. Domain-expected outcomes (such as losing
    /// an update race) must be absorbed here; only backend-connectivity
    /// failures may be returned.
    async fn handle(&self, metadata: &JobMetadata) -> Result<(), ReconcileError>;
}

/// Message recorded on jobs that never reached the processing queue.
pub const FAILED_TO_ENQUEUE_MESSAGE: &str =
    "Failed to add job to processing queue. Please re-submit as a new job";

/// Marks jobs as failed when their queue message was never published.
///
/// An entry still RECEIVED when it reaches the feed was accepted but never
/// picked up; forcing it to FINISHED with an internal-error result stops the
/// caller from waiting forever.
pub struct MarkJobFailedToEnqueueHandler {
    store: Arc<dyn JobMetadataStore>,
}

impl MarkJobFailedToEnqueueHandler {
    pub fn new(store: Arc<dyn JobMetadataStore>) -> Self {
        Self { store }
    }

    /// Log the winning writer's entry after losing an update race.
    async fn log_conflict(&self, metadata: &JobMetadata) -> Result<(), ReconcileError> {
        match self
            .store
            .get_job_metadata(metadata.job_key.as_str())
            .await
        {
            Ok(current) => {
                warn!(
                    job_key = %metadata.job_key,
                    current = ?current,
                    "conflict while marking job failed; another writer already resolved it"
                );
                Ok(())
            }
            Err(e) => Err(ReconcileError::new(e)),
        }
    }
}

#[async_trait]
impl JobMetadataChangeHandler for MarkJobFailedToEnqueueHandler {
    fn can_handle(&self, metadata: &JobMetadata) -> bool {
        metadata.job_status == JobStatus::Received
    }

    async fn handle(&self, metadata: &JobMetadata) -> Result<(), ReconcileError> {
        info!(job_key = %metadata.job_key, "marking job as failed to enqueue");
        let mut failed = metadata.clone();
        failed.job_status = JobStatus::Finished;
        failed.result_info = Some(ResultInfo {
            return_code: ReturnCode::InternalError.to_string(),
            return_message: FAILED_TO_ENQUEUE_MESSAGE.to_string(),
            error_summary: ErrorSummary::default(),
            finished_at: Utc::now(),
        });

        match self.store.update_job_metadata(&failed).await {
            Ok(()) => Ok(()),
            // Another process resolved the entry first; the cleanup is no
            // longer required.
            Err(StoreError::Conflict(_)) => self.log_conflict(metadata).await,
            Err(e) => Err(ReconcileError::new(e)),
        }
    }
}

/// Drives the registered handlers from the metadata change feed.
pub struct ReconcileRunner {
    feed: Arc<dyn JobMetadataChangeFeed>,
    handlers: Vec<Box<dyn JobMetadataChangeHandler>>,
    last_success: std::sync::Mutex<Option<DateTime<Utc>>>,
}

impl ReconcileRunner {
    pub fn new(
        feed: Arc<dyn JobMetadataChangeFeed>,
        handlers: Vec<Box<dyn JobMetadataChangeHandler>>,
    ) -> Self {
        Self {
            feed,
            handlers,
            last_success: std::sync::Mutex::new(None),
        }
    }

    /// Pull the next batch of changed entries and dispatch each to every
    /// matching handler. Returns how many entries were handled.
    pub async fn run_pass(&self) -> Result<usize, ReconcileError> {
        let changes = self
            .feed
            .next_changes()
            .await
            .map_err(ReconcileError::new)?;

        let mut handled = 0;
        for metadata in &changes {
            for handler in &self.handlers {
                if handler.can_handle(metadata) {
                    handler.handle(metadata).await?;
                    handled += 1;
                }
            }
        }

        *self.last_success.lock().expect("lock poisoned") = Some(Utc::now());
        Ok(handled)
    }

    /// When the last pass completed, if any. Lets callers observe the
    /// trigger's own liveness instead of assuming it runs.
    pub fn last_success_at(&self) -> Option<DateTime<Utc>> {
        *self.last_success.lock().expect("lock poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tally_core::RequestInfo;
    use tally_storage::{InMemoryJobMetadataChangeFeed, InMemoryJobMetadataStore};

    fn metadata(key: &str) -> JobMetadata {
        let now = Utc::now();
        JobMetadata {
            job_key: tally_core::JobKey::new(key),
            job_status: JobStatus::Received,
            num_attempts: 0,
            server_job_id: "srv-1".to_string(),
            request_info: RequestInfo {
                job_request_id: key.to_string(),
                ..Default::default()
            },
            result_info: None,
            request_received_at: now,
            request_updated_at: now,
            request_processing_started_at: None,
            record_version: 0,
            ttl: 0,
        }
    }

    fn runner_over(store: &Arc<InMemoryJobMetadataStore>) -> ReconcileRunner {
        let feed = Arc::new(InMemoryJobMetadataChangeFeed::new(store.clone()));
        ReconcileRunner::new(
            feed,
            vec![Box::new(MarkJobFailedToEnqueueHandler::new(store.clone()))],
        )
    }

    #[tokio::test]
    async fn stale_received_entry_is_forced_to_finished() {
        let store = Arc::new(InMemoryJobMetadataStore::new(30));
        store.insert_job_metadata(&metadata("job-2")).await.unwrap();
        let runner = runner_over(&store);

        assert_eq!(runner.run_pass().await.unwrap(), 1);

        let repaired = store.get_job_metadata("job-2").await.unwrap().unwrap();
        assert_eq!(repaired.job_status, JobStatus::Finished);
        let result = repaired.result_info.unwrap();
        assert_eq!(result.return_code, ReturnCode::InternalError.to_string());
        assert_eq!(result.return_message, FAILED_TO_ENQUEUE_MESSAGE);
    }

    #[tokio::test]
    async fn second_pass_over_the_finished_entry_is_a_no_op() {
        let store = Arc::new(InMemoryJobMetadataStore::new(30));
        store.insert_job_metadata(&metadata("job-2")).await.unwrap();
        let runner = runner_over(&store);

        assert_eq!(runner.run_pass().await.unwrap(), 1);
        // The repair itself re-surfaces the entry, now FINISHED, which no
        // handler claims.
        assert_eq!(runner.run_pass().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn update_conflict_is_swallowed() {
        let store = Arc::new(InMemoryJobMetadataStore::new(30));
        store.insert_job_metadata(&metadata("job-2")).await.unwrap();
        store.set_conflict_on_update(true);

        let handler = MarkJobFailedToEnqueueHandler::new(store.clone());
        let entry = store.get_job_metadata("job-2").await.unwrap().unwrap();
        handler.handle(&entry).await.unwrap();
    }

    #[tokio::test]
    async fn backend_failure_is_fatal() {
        let store = Arc::new(InMemoryJobMetadataStore::new(30));
        store.insert_job_metadata(&metadata("job-2")).await.unwrap();
        let runner = runner_over(&store);
        store.set_should_fail(true);

        assert!(runner.run_pass().await.is_err());
        assert!(runner.last_success_at().is_none());
    }

    #[tokio::test]
    async fn successful_pass_records_liveness() {
        let store = Arc::new(InMemoryJobMetadataStore::new(30));
        let runner = runner_over(&store);

        assert!(runner.last_success_at().is_none());
        runner.run_pass().await.unwrap();
        assert!(runner.last_success_at().is_some());
    }

    #[tokio::test]
    async fn in_progress_entries_are_left_alone() {
        let store = Arc::new(InMemoryJobMetadataStore::new(30));
        let mut entry = metadata("job-3");
        store.insert_job_metadata(&entry).await.unwrap();
        entry.job_status = JobStatus::InProgress;
        store.update_job_metadata(&entry).await.unwrap();
        let runner = runner_over(&store);

        assert_eq!(runner.run_pass().await.unwrap(), 0);
        let stored = store.get_job_metadata("job-3").await.unwrap().unwrap();
        assert_eq!(stored.job_status, JobStatus::InProgress);
    }
}
