// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The worker-side consumer loop.
//!
//! Pulls jobs from the queue, correlates each delivery with its metadata
//! entry, and records completion or retry state. The receipt held for a
//! delivery lives only in this process; once a terminal result is durably
//! written the queue item is acknowledged, in that order, so a crash in
//! between leaves the job redeliverable rather than silently lost.
//!
//! The lease is advisory: a worker that outlives it may race another worker
//! on the same entry, which the store's conditional update detects.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tracing::{error, info, warn};

use tally_config::ClientConfig;
use tally_core::types::{ErrorSummary, ResultInfo};
use tally_core::{
    BackoffPolicy, Job, JobKey, JobMetadata, JobMetadataStore, JobQueue, JobQueueItem, JobStatus,
};

use crate::model::{ErrorReason, JobClientError, JobResult, JobRetryRequest};
use crate::validators::{CheckJobStatus, CheckRetryLimit, JobValidator};

/// Longest accepted retry delay.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(600);

/// Consumer-side interface for handling jobs.
#[async_trait]
pub trait JobClient: Send + Sync {
    /// Blocking call to receive the next job.
    ///
    /// Returns `None` when no job is available and the pull backoff decides
    /// to stop polling.
    async fn get_job(&self) -> Result<Option<Job>, JobClientError>;

    /// Releases a held job, after an optional delay of at most 10 minutes,
    /// so another worker may pick it up.
    async fn return_job_for_retry(&self, request: JobRetryRequest) -> Result<(), JobClientError>;

    /// Marks a job completed (successfully or with a non-retryable error)
    /// in the metadata store, then acknowledges its queue item.
    async fn mark_job_completed(&self, result: JobResult) -> Result<(), JobClientError>;

    /// Appends an error message to the job's result summary.
    async fn append_job_error_message(
        &self,
        job_key: &JobKey,
        error: &str,
    ) -> Result<(), JobClientError>;
}

/// [`JobClient`] over a queue and metadata store pair.
pub struct WorkerJobClient {
    queue: Arc<dyn JobQueue>,
    store: Arc<dyn JobMetadataStore>,
    pull_backoff: BackoffPolicy,
    lookup_backoff: BackoffPolicy,
    validators: Vec<Box<dyn JobValidator>>,
    // Receipts of jobs this worker holds, by job key string. Needed again
    // at completion time and never persisted.
    cache: DashMap<String, JobQueueItem>,
}

impl WorkerJobClient {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        store: Arc<dyn JobMetadataStore>,
        config: &ClientConfig,
    ) -> Self {
        Self {
            queue,
            store,
            pull_backoff: BackoffPolicy::new(
                config.pull_max_attempts,
                Duration::from_millis(config.pull_base_delay_ms),
                Duration::from_millis(config.pull_jitter_ms),
            ),
            lookup_backoff: BackoffPolicy::new(
                config.lookup_max_attempts,
                Duration::from_millis(config.lookup_base_delay_ms),
                Duration::ZERO,
            ),
            validators: vec![
                Box::new(CheckJobStatus),
                Box::new(CheckRetryLimit::new(config.max_num_attempts)),
            ],
            cache: DashMap::new(),
        }
    }

    /// Replace the default pre-processing checks.
    pub fn with_validators(mut self, validators: Vec<Box<dyn JobValidator>>) -> Self {
        self.validators = validators;
        self
    }

    /// Look up the metadata entry for a received message, retrying to
    /// absorb the lag between the message landing and the row becoming
    /// readable.
    async fn lookup_metadata(
        &self,
        item: &JobQueueItem,
    ) -> Result<Option<JobMetadata>, JobClientError> {
        let mut attempt = 0;
        loop {
            let found = self
                .store
                .get_job_metadata(&item.job_key_string)
                .await
                .map_err(|e| {
                    JobClientError::with_source(
                        ErrorReason::JobPullFailed,
                        format!("failed to look up metadata for job '{}'", item.job_key_string),
                        e,
                    )
                })?;
            if found.is_some() {
                return Ok(found);
            }
            attempt += 1;
            if self.lookup_backoff.is_exhausted(attempt) {
                return Ok(None);
            }
            tokio::time::sleep(self.lookup_backoff.delay_for(attempt)).await;
        }
    }

    fn build_job(item: &JobQueueItem, metadata: &JobMetadata) -> Job {
        Job {
            job_key: metadata.job_key.clone(),
            job_status: metadata.job_status,
            request_info: metadata.request_info.clone(),
            num_attempts: metadata.num_attempts,
            processing_timeout: item.processing_timeout,
            create_time: metadata.request_received_at,
            update_time: metadata.request_updated_at,
            processing_start_time: metadata.request_processing_started_at,
        }
    }

    /// Whether another worker is already processing this job within its
    /// lease.
    fn is_duplicate_delivery(job: &Job) -> bool {
        let Some(started) = job.processing_start_time else {
            return false;
        };
        let timeout =
            chrono::Duration::from_std(job.processing_timeout).unwrap_or(chrono::Duration::zero());
        job.job_status == JobStatus::InProgress && started + timeout > Utc::now()
    }

    /// Record a failed pre-processing check as the job's final result. Only
    /// the return code, message, and finish time change; accumulated error
    /// messages are kept.
    async fn report_failed_check(
        &self,
        job: &Job,
        validator: &dyn JobValidator,
    ) -> Result<(), JobClientError> {
        let current = self
            .store
            .get_job_metadata(job.job_key.as_str())
            .await
            .map_err(|e| {
                JobClientError::with_source(
                    ErrorReason::JobMarkCompletionFailed,
                    format!("failed to report failed check on job '{}'", job.job_key),
                    e,
                )
            })?;
        let Some(current) = current else {
            return Err(JobClientError::new(
                ErrorReason::JobMarkCompletionFailed,
                format!("job '{}' does not exist in the metadata store", job.job_key),
            ));
        };

        let error_summary = current
            .result_info
            .as_ref()
            .map(|r| r.error_summary.clone())
            .unwrap_or_default();
        let mut updated = current;
        updated.job_status = JobStatus::Finished;
        updated.result_info = Some(ResultInfo {
            return_code: validator.validation_error_return_code().to_string(),
            return_message: validator.validation_error_message(),
            error_summary,
            finished_at: Utc::now(),
        });
        self.store.update_job_metadata(&updated).await.map_err(|e| {
            JobClientError::with_source(
                ErrorReason::JobMarkCompletionFailed,
                format!("failed to report failed check on job '{}'", job.job_key),
                e,
            )
        })
    }

    async fn acknowledge(&self, item: &JobQueueItem) -> Result<(), JobClientError> {
        self.queue
            .acknowledge_job_completion(item)
            .await
            .map_err(|e| {
                JobClientError::with_source(
                    ErrorReason::JobPullFailed,
                    format!("failed to acknowledge message for job '{}'", item.job_key_string),
                    e,
                )
            })
    }

    /// Fetch the entry for an operation that requires IN_PROGRESS status.
    async fn current_in_progress(
        &self,
        job_key: &JobKey,
        failure_reason: ErrorReason,
        action: &str,
    ) -> Result<JobMetadata, JobClientError> {
        let current = self
            .store
            .get_job_metadata(job_key.as_str())
            .await
            .map_err(|e| {
                JobClientError::with_source(
                    failure_reason,
                    format!("failed to read metadata for job '{job_key}'"),
                    e,
                )
            })?;
        let Some(current) = current else {
            return Err(JobClientError::new(
                ErrorReason::JobMetadataNotFound,
                format!("metadata entry for job '{job_key}' was not found, cannot {action}"),
            ));
        };
        if current.job_status != JobStatus::InProgress {
            return Err(JobClientError::new(
                ErrorReason::WrongJobStatus,
                format!(
                    "metadata entry for job '{job_key}' indicates job is in status {}, but \
                     expected to be IN_PROGRESS",
                    current.job_status
                ),
            ));
        }
        Ok(current)
    }
}

#[async_trait]
impl JobClient for WorkerJobClient {
    async fn get_job(&self) -> Result<Option<Job>, JobClientError> {
        let mut empty_polls: u32 = 0;
        loop {
            let item = self.queue.receive_job().await.map_err(|e| {
                error!("failed to pull new job from job queue: {e}");
                JobClientError::with_source(
                    ErrorReason::JobPullFailed,
                    "failed to pull new job from job queue",
                    e,
                )
            })?;
            let Some(item) = item else {
                if self.pull_backoff.is_exhausted(empty_polls) {
                    // Pull backoff depleted.
                    return Ok(None);
                }
                tokio::time::sleep(self.pull_backoff.delay_for(empty_polls)).await;
                empty_polls += 1;
                continue;
            };
            empty_polls = 0;

            let Some(metadata) = self.lookup_metadata(&item).await? else {
                // The entry never appeared; the creation that published
                // this message did not complete. Drop the message.
                warn!(
                    job_key = %item.job_key_string,
                    "no metadata entry for received message, deleting it"
                );
                self.acknowledge(&item).await?;
                continue;
            };

            // A server job id mismatch means the entry corresponds to a
            // different queue message; delete this one.
            if !metadata.server_job_id.is_empty()
                && !item.server_job_id.is_empty()
                && metadata.server_job_id != item.server_job_id
            {
                info!(
                    metadata_server_job_id = %metadata.server_job_id,
                    queue_server_job_id = %item.server_job_id,
                    "deleting job queue message because of server job id mismatch"
                );
                self.acknowledge(&item).await?;
                continue;
            }

            let job = Self::build_job(&item, &metadata);

            if let Some(failed) = self.validators.iter().find(|v| !v.validate(&job)) {
                warn!(
                    job_key = %item.job_key_string,
                    check = failed.description(),
                    "job failed a pre-processing check"
                );
                if failed.report_validation_error() {
                    self.report_failed_check(&job, failed.as_ref()).await?;
                }
                self.acknowledge(&item).await?;
                continue;
            }

            if Self::is_duplicate_delivery(&job) {
                // Another worker holds this job within its lease; leave the
                // message to expire naturally.
                info!(job_key = %job.job_key, "skip processing for duplicate job");
                continue;
            }

            let mut updated = metadata;
            updated.job_status = JobStatus::InProgress;
            updated.request_processing_started_at = Some(Utc::now());
            updated.num_attempts += 1;
            self.store.update_job_metadata(&updated).await.map_err(|e| {
                error!("failed to pull new job from job queue: {e}");
                JobClientError::with_source(
                    ErrorReason::JobPullFailed,
                    format!("failed to start job '{}'", job.job_key),
                    e,
                )
            })?;

            // Keep the receipt so completion can acknowledge the message.
            self.cache.insert(item.job_key_string.clone(), item);

            info!(job_key = %job.job_key, "successfully pulled a job from the queue");
            return Ok(Some(job));
        }
    }

    async fn return_job_for_retry(&self, request: JobRetryRequest) -> Result<(), JobClientError> {
        let key = request.job_key.as_str().to_string();
        let item = self.cache.get(&key).map(|entry| entry.value().clone());
        let Some(item) = item else {
            return Err(JobClientError::new(
                ErrorReason::JobReceiptHandleNotFound,
                format!("job cannot be released, this worker holds no receipt for job '{key}'"),
            ));
        };

        let current = self
            .current_in_progress(
                &request.job_key,
                ErrorReason::ReturnJobForRetryFailed,
                "release it",
            )
            .await?;

        if request.delay.is_some_and(|delay| delay > MAX_RETRY_DELAY) {
            return Err(JobClientError::new(
                ErrorReason::JobDelayOutOfRange,
                format!(
                    "job cannot be released, delay for job '{key}' must be between zero and 10 \
                     minutes"
                ),
            ));
        }

        // Reset the entry so the next delivery starts a fresh attempt.
        let mut updated = current;
        updated.job_status = JobStatus::Received;
        if request.result_info.is_some() {
            updated.result_info = request.result_info.clone();
        }
        self.store.update_job_metadata(&updated).await.map_err(|e| {
            error!("failed to release job '{key}': {e}");
            JobClientError::with_source(
                ErrorReason::ReturnJobForRetryFailed,
                format!("failed to release job '{key}'"),
                e,
            )
        })?;

        let delay = request.delay.unwrap_or(Duration::ZERO);
        self.queue
            .modify_job_processing_time(&item, delay)
            .await
            .map_err(|e| {
                error!("failed to release job '{key}': {e}");
                JobClientError::with_source(
                    ErrorReason::ReturnJobForRetryFailed,
                    format!("failed to release job '{key}'"),
                    e,
                )
            })?;

        // Stop tracking the receipt so the delivery is no longer ours.
        self.cache.remove(&key);

        info!(job_key = %key, "successfully released job back to the queue for retry");
        Ok(())
    }

    async fn mark_job_completed(&self, result: JobResult) -> Result<(), JobClientError> {
        let key = result.job_key.as_str().to_string();
        let item = self.cache.get(&key).map(|entry| entry.value().clone());
        let Some(item) = item else {
            return Err(JobClientError::new(
                ErrorReason::JobReceiptHandleNotFound,
                format!("this worker holds no receipt for job '{key}'"),
            ));
        };

        let current = self
            .current_in_progress(
                &result.job_key,
                ErrorReason::JobMarkCompletionFailed,
                "mark it completed",
            )
            .await?;

        // Record the result durably first; acknowledge only afterwards so a
        // crash in between leaves the job redeliverable.
        let mut updated = current;
        updated.job_status = JobStatus::Finished;
        updated.result_info = Some(result.result_info.clone());
        self.store.update_job_metadata(&updated).await.map_err(|e| {
            error!("failed to mark job '{key}' as completed: {e}");
            JobClientError::with_source(
                ErrorReason::JobMarkCompletionFailed,
                format!("failed to mark job '{key}' as completed"),
                e,
            )
        })?;

        self.queue
            .acknowledge_job_completion(&item)
            .await
            .map_err(|e| {
                error!("failed to mark job '{key}' as completed: {e}");
                JobClientError::with_source(
                    ErrorReason::JobMarkCompletionFailed,
                    format!("failed to acknowledge completed job '{key}'"),
                    e,
                )
            })?;

        self.cache.remove(&key);

        info!(job_key = %key, "successfully marked job as completed");
        Ok(())
    }

    async fn append_job_error_message(
        &self,
        job_key: &JobKey,
        error: &str,
    ) -> Result<(), JobClientError> {
        let current = self
            .current_in_progress(
                job_key,
                ErrorReason::JobErrorSummaryUpdateFailed,
                "update its error summary",
            )
            .await?;

        let mut result_info = current.result_info.clone().unwrap_or(ResultInfo {
            return_code: String::new(),
            return_message: String::new(),
            error_summary: ErrorSummary::default(),
            finished_at: Utc::now(),
        });
        result_info.error_summary.error_messages.push(error.to_string());
        result_info.finished_at = Utc::now();

        let mut updated = current;
        updated.result_info = Some(result_info);
        self.store.update_job_metadata(&updated).await.map_err(|e| {
            error!("failed to update error summary for job '{job_key}': {e}");
            JobClientError::with_source(
                ErrorReason::JobErrorSummaryUpdateFailed,
                format!("failed to update error summary for job '{job_key}'"),
                e,
            )
        })?;

        info!(job_key = %job_key, "successfully updated error summary");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tally_core::{RequestInfo, ReturnCode};
    use tally_storage::{InMemoryJobMetadataStore, InMemoryJobQueue};

    fn test_config() -> ClientConfig {
        ClientConfig {
            max_num_attempts: 5,
            pull_max_attempts: 1,
            pull_base_delay_ms: 1,
            pull_jitter_ms: 0,
            lookup_max_attempts: 2,
            lookup_base_delay_ms: 1,
        }
    }

    struct Fixture {
        queue: Arc<InMemoryJobQueue>,
        store: Arc<InMemoryJobMetadataStore>,
        client: WorkerJobClient,
    }

    fn fixture() -> Fixture {
        let queue = Arc::new(InMemoryJobQueue::new(
            Duration::from_secs(600),
            Duration::ZERO,
        ));
        let store = Arc::new(InMemoryJobMetadataStore::new(30));
        let client = WorkerJobClient::new(queue.clone(), store.clone(), &test_config());
        Fixture {
            queue,
            store,
            client,
        }
    }

    fn metadata(key: &str, server_job_id: &str) -> JobMetadata {
        let now = Utc::now();
        JobMetadata {
            job_key: JobKey::new(key),
            job_status: JobStatus::Received,
            num_attempts: 0,
            server_job_id: server_job_id.to_string(),
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

    /// Insert the entry and publish its matching queue message.
    async fn submit(f: &Fixture, entry: &JobMetadata) {
        f.store.insert_job_metadata(entry).await.unwrap();
        f.queue
            .send_job(&entry.job_key, &entry.server_job_id)
            .await
            .unwrap();
    }

    fn success_result(key: &str) -> JobResult {
        JobResult {
            job_key: JobKey::new(key),
            result_info: ResultInfo {
                return_code: ReturnCode::Success.to_string(),
                return_message: "done".to_string(),
                error_summary: ErrorSummary::default(),
                finished_at: Utc::now(),
            },
        }
    }

    #[tokio::test]
    async fn get_job_pulls_and_starts_the_job() {
        let f = fixture();
        submit(&f, &metadata("job-1", "srv-1")).await;

        let job = f.client.get_job().await.unwrap().unwrap();
        assert_eq!(job.job_key.as_str(), "job-1");
        assert_eq!(job.num_attempts, 0);

        let stored = f.store.get_job_metadata("job-1").await.unwrap().unwrap();
        assert_eq!(stored.job_status, JobStatus::InProgress);
        assert_eq!(stored.num_attempts, 1);
        assert!(stored.request_processing_started_at.is_some());
    }

    #[tokio::test]
    async fn get_job_returns_none_when_queue_stays_empty() {
        let f = fixture();
        assert!(f.client.get_job().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn get_job_retries_the_metadata_lookup() {
        let f = fixture();
        submit(&f, &metadata("job-1", "srv-1")).await;
        f.store.fail_next_lookups(1);

        let job = f.client.get_job().await.unwrap();
        assert!(job.is_some(), "second lookup attempt should find the entry");
    }

    #[tokio::test]
    async fn message_without_metadata_is_dropped() {
        let f = fixture();
        f.queue
            .send_job(&JobKey::new("orphan"), "srv-1")
            .await
            .unwrap();

        assert!(f.client.get_job().await.unwrap().is_none());
        assert!(f.queue.is_empty().await, "the orphan message must be deleted");
    }

    #[tokio::test]
    async fn server_job_id_mismatch_drops_the_message() {
        let f = fixture();
        let entry = metadata("job-1", "srv-current");
        f.store.insert_job_metadata(&entry).await.unwrap();
        // A stale message from a superseded submission.
        f.queue
            .send_job(&entry.job_key, "srv-stale")
            .await
            .unwrap();

        assert!(f.client.get_job().await.unwrap().is_none());
        assert!(f.queue.is_empty().await);

        // The entry itself is untouched.
        let stored = f.store.get_job_metadata("job-1").await.unwrap().unwrap();
        assert_eq!(stored.job_status, JobStatus::Received);
        assert_eq!(stored.num_attempts, 0);
    }

    #[tokio::test]
    async fn finished_job_is_acknowledged_without_a_report() {
        let f = fixture();
        let mut entry = metadata("job-1", "srv-1");
        entry.job_status = JobStatus::Finished;
        submit(&f, &entry).await;

        assert!(f.client.get_job().await.unwrap().is_none());
        assert!(f.queue.is_empty().await);

        // The terminal entry keeps whatever result it had.
        let stored = f.store.get_job_metadata("job-1").await.unwrap().unwrap();
        assert_eq!(stored.job_status, JobStatus::Finished);
        assert!(stored.result_info.is_none());
    }

    #[tokio::test]
    async fn exhausted_attempts_are_reported_and_failed() {
        let f = fixture();
        let mut entry = metadata("job-1", "srv-1");
        entry.num_attempts = 5;
        submit(&f, &entry).await;

        assert!(f.client.get_job().await.unwrap().is_none());
        assert!(f.queue.is_empty().await);

        let stored = f.store.get_job_metadata("job-1").await.unwrap().unwrap();
        assert_eq!(stored.job_status, JobStatus::Finished);
        let result = stored.result_info.unwrap();
        assert_eq!(result.return_code, ReturnCode::RetriesExhausted.to_string());
        assert!(result.return_message.contains("5 tries"));
    }

    #[tokio::test]
    async fn in_flight_job_is_not_double_processed() {
        let f = fixture();
        let mut entry = metadata("job-1", "srv-1");
        entry.job_status = JobStatus::InProgress;
        entry.request_processing_started_at = Some(Utc::now());
        submit(&f, &entry).await;

        assert!(f.client.get_job().await.unwrap().is_none());
        // Not acknowledged: the message stays for redelivery after the
        // holder's lease runs out.
        assert_eq!(f.queue.len().await, 1);
    }

    #[tokio::test]
    async fn mark_job_completed_writes_the_result_then_acknowledges() {
        let f = fixture();
        submit(&f, &metadata("job-1", "srv-1")).await;
        f.client.get_job().await.unwrap().unwrap();

        f.client
            .mark_job_completed(success_result("job-1"))
            .await
            .unwrap();

        let stored = f.store.get_job_metadata("job-1").await.unwrap().unwrap();
        assert_eq!(stored.job_status, JobStatus::Finished);
        assert_eq!(
            stored.result_info.unwrap().return_code,
            ReturnCode::Success.to_string()
        );
        assert!(f.queue.is_empty().await);

        // The receipt is gone; completing twice is a typed error.
        let err = f
            .client
            .mark_job_completed(success_result("job-1"))
            .await
            .unwrap_err();
        assert_eq!(err.reason, ErrorReason::JobReceiptHandleNotFound);
    }

    #[tokio::test]
    async fn mark_job_completed_without_a_held_receipt_fails() {
        let f = fixture();
        let err = f
            .client
            .mark_job_completed(success_result("job-1"))
            .await
            .unwrap_err();
        assert_eq!(err.reason, ErrorReason::JobReceiptHandleNotFound);
    }

    #[tokio::test]
    async fn mark_job_completed_requires_in_progress() {
        let f = fixture();
        submit(&f, &metadata("job-1", "srv-1")).await;
        f.client.get_job().await.unwrap().unwrap();

        // Another writer finalized the entry meanwhile.
        let mut entry = f.store.get_job_metadata("job-1").await.unwrap().unwrap();
        entry.job_status = JobStatus::Finished;
        f.store.update_job_metadata(&entry).await.unwrap();

        let err = f
            .client
            .mark_job_completed(success_result("job-1"))
            .await
            .unwrap_err();
        assert_eq!(err.reason, ErrorReason::WrongJobStatus);
        assert!(err.message.contains("FINISHED"));
    }

    #[tokio::test]
    async fn ack_failure_after_the_result_write_leaves_the_job_redeliverable() {
        let f = fixture();
        submit(&f, &metadata("job-1", "srv-1")).await;
        f.client.get_job().await.unwrap().unwrap();

        f.queue.set_should_fail(true);
        let err = f
            .client
            .mark_job_completed(success_result("job-1"))
            .await
            .unwrap_err();
        assert_eq!(err.reason, ErrorReason::JobMarkCompletionFailed);

        // The result is durably recorded and the message still exists, so
        // the job is redeliverable rather than lost.
        let stored = f.store.get_job_metadata("job-1").await.unwrap().unwrap();
        assert_eq!(stored.job_status, JobStatus::Finished);
        f.queue.set_should_fail(false);
        assert_eq!(f.queue.len().await, 1);
    }

    #[tokio::test]
    async fn return_job_for_retry_releases_the_job() {
        let f = fixture();
        submit(&f, &metadata("job-1", "srv-1")).await;
        f.client.get_job().await.unwrap().unwrap();

        let partial = ResultInfo {
            return_code: String::new(),
            return_message: String::new(),
            error_summary: ErrorSummary {
                error_messages: vec!["decryption failed for shard 3".to_string()],
            },
            finished_at: Utc::now(),
        };
        f.client
            .return_job_for_retry(JobRetryRequest {
                job_key: JobKey::new("job-1"),
                delay: None,
                result_info: Some(partial),
            })
            .await
            .unwrap();

        let stored = f.store.get_job_metadata("job-1").await.unwrap().unwrap();
        assert_eq!(stored.job_status, JobStatus::Received);
        assert_eq!(
            stored.result_info.unwrap().error_summary.error_messages,
            vec!["decryption failed for shard 3".to_string()]
        );

        // With a zero delay the job is immediately available again and the
        // next pull counts a fresh attempt.
        let job = f.client.get_job().await.unwrap().unwrap();
        assert_eq!(job.job_key.as_str(), "job-1");
        let stored = f.store.get_job_metadata("job-1").await.unwrap().unwrap();
        assert_eq!(stored.num_attempts, 2);
    }

    #[tokio::test]
    async fn retry_delay_over_ten_minutes_is_rejected() {
        let f = fixture();
        submit(&f, &metadata("job-1", "srv-1")).await;
        f.client.get_job().await.unwrap().unwrap();

        let err = f
            .client
            .return_job_for_retry(JobRetryRequest {
                job_key: JobKey::new("job-1"),
                delay: Some(Duration::from_secs(601)),
                result_info: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.reason, ErrorReason::JobDelayOutOfRange);

        // The job is still held and can be completed normally.
        f.client
            .mark_job_completed(success_result("job-1"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn retry_without_a_held_receipt_fails() {
        let f = fixture();
        let err = f
            .client
            .return_job_for_retry(JobRetryRequest {
                job_key: JobKey::new("job-1"),
                delay: None,
                result_info: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.reason, ErrorReason::JobReceiptHandleNotFound);
    }

    #[tokio::test]
    async fn append_job_error_message_accumulates() {
        let f = fixture();
        submit(&f, &metadata("job-1", "srv-1")).await;
        f.client.get_job().await.unwrap().unwrap();

        let key = JobKey::new("job-1");
        f.client
            .append_job_error_message(&key, "report 12 was malformed")
            .await
            .unwrap();
        f.client
            .append_job_error_message(&key, "report 47 was malformed")
            .await
            .unwrap();

        let stored = f.store.get_job_metadata("job-1").await.unwrap().unwrap();
        assert_eq!(stored.job_status, JobStatus::InProgress);
        assert_eq!(
            stored.result_info.unwrap().error_summary.error_messages,
            vec![
                "report 12 was malformed".to_string(),
                "report 47 was malformed".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn append_job_error_message_requires_an_existing_in_progress_job() {
        let f = fixture();
        let err = f
            .client
            .append_job_error_message(&JobKey::new("ghost"), "oops")
            .await
            .unwrap_err();
        assert_eq!(err.reason, ErrorReason::JobMetadataNotFound);

        f.store
            .insert_job_metadata(&metadata("job-1", "srv-1"))
            .await
            .unwrap();
        let err = f
            .client
            .append_job_error_message(&JobKey::new("job-1"), "oops")
            .await
            .unwrap_err();
        assert_eq!(err.reason, ErrorReason::WrongJobStatus);
    }

    #[tokio::test]
    async fn queue_failure_surfaces_as_pull_failed() {
        let f = fixture();
        f.queue.set_should_fail(true);
        let err = f.client.get_job().await.unwrap_err();
        assert_eq!(err.reason, ErrorReason::JobPullFailed);
    }
}
