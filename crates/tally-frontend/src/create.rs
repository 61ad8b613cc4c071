// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Job creation tasks.
//!
//! Two deliberately distinct strategies exist because the relationship
//! between the store and the queue differs by how the consumer side is
//! wired. They must not be unified: each depends on a different repair
//! mechanism when the second write never happens.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use tally_core::{
    JobKey, JobMetadata, JobMetadataStore, JobQueue, JobStatus, RequestInfo, StoreError,
};

use crate::error::CreateJobError;
use crate::validation::{run_validators, RequestInfoValidator};

/// Accepts a new job request.
#[async_trait]
pub trait CreateJobTask: Send + Sync {
    async fn create_job(&self, request: RequestInfo) -> Result<(), CreateJobError>;
}

/// Build the initial metadata entry for an accepted request.
fn build_job_metadata(request: RequestInfo) -> JobMetadata {
    let now = Utc::now();
    JobMetadata {
        job_key: JobKey::new(request.job_request_id.clone()),
        job_status: JobStatus::Received,
        num_attempts: 0,
        server_job_id: Uuid::new_v4().to_string(),
        request_info: request,
        result_info: None,
        request_received_at: now,
        request_updated_at: now,
        request_processing_started_at: None,
        record_version: 0,
        ttl: 0,
    }
}

fn map_insert_error(err: StoreError, job_request_id: &str) -> CreateJobError {
    match err {
        StoreError::JobKeyExists(_) => {
            CreateJobError::DuplicateJob(job_request_id.to_string())
        }
        other => CreateJobError::internal(other),
    }
}

/// Creation strategy that only inserts the metadata entry.
///
/// Enqueueing is performed asynchronously by the reconciliation path
/// watching the store for new RECEIVED entries, which decouples "job
/// accepted" from "job is guaranteed to be dequeued" and repairs jobs whose
/// enqueue never ran.
pub struct InsertOnlyCreateJobTask {
    store: Arc<dyn JobMetadataStore>,
    validators: Vec<Box<dyn RequestInfoValidator>>,
}

impl InsertOnlyCreateJobTask {
    pub fn new(
        store: Arc<dyn JobMetadataStore>,
        validators: Vec<Box<dyn RequestInfoValidator>>,
    ) -> Self {
        Self { store, validators }
    }
}

#[async_trait]
impl CreateJobTask for InsertOnlyCreateJobTask {
    async fn create_job(&self, request: RequestInfo) -> Result<(), CreateJobError> {
        if let Some(message) = run_validators(&self.validators, &request) {
            return Err(CreateJobError::Validation(message));
        }

        let job_request_id = request.job_request_id.clone();
        let metadata = build_job_metadata(request);
        self.store
            .insert_job_metadata(&metadata)
            .await
            .map_err(|e| map_insert_error(e, &job_request_id))?;
        info!(job_key = %metadata.job_key, "created job");
        Ok(())
    }
}

/// Creation strategy that publishes the queue message before inserting the
/// metadata entry.
///
/// A consumer can only act on a job if a queue message exists, so the
/// message goes first. A race that slips past the existence check is
/// handled by the consumer through the server job id, not prevented here.
pub struct EnqueueFirstCreateJobTask {
    store: Arc<dyn JobMetadataStore>,
    queue: Arc<dyn JobQueue>,
    validators: Vec<Box<dyn RequestInfoValidator>>,
}

impl EnqueueFirstCreateJobTask {
    pub fn new(
        store: Arc<dyn JobMetadataStore>,
        queue: Arc<dyn JobQueue>,
        validators: Vec<Box<dyn RequestInfoValidator>>,
    ) -> Self {
        Self {
            store,
            queue,
            validators,
        }
    }
}

#[async_trait]
impl CreateJobTask for EnqueueFirstCreateJobTask {
    async fn create_job(&self, request: RequestInfo) -> Result<(), CreateJobError> {
        if let Some(message) = run_validators(&self.validators, &request) {
            return Err(CreateJobError::Validation(message));
        }

        let job_request_id = request.job_request_id.clone();
        let metadata = build_job_metadata(request);

        let existing = self
            .store
            .get_job_metadata(&job_request_id)
            .await
            .map_err(CreateJobError::internal)?;
        if existing.is_some() {
            return Err(CreateJobError::DuplicateJob(job_request_id));
        }

        self.queue
            .send_job(&metadata.job_key, &metadata.server_job_id)
            .await
            .map_err(CreateJobError::internal)?;
        self.store
            .insert_job_metadata(&metadata)
            .await
            .map_err(|e| map_insert_error(e, &job_request_id))?;
        info!(job_key = %metadata.job_key, "created job");
        Ok(())
    }
}
