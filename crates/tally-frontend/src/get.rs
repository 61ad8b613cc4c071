// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Job retrieval task.

use std::sync::Arc;

use tally_core::{JobMetadata, JobMetadataStore};

use crate::error::GetJobError;

/// Fetches an existing job's metadata by its job_request_id.
pub struct GetJobTask {
    store: Arc<dyn JobMetadataStore>,
}

impl GetJobTask {
    pub fn new(store: Arc<dyn JobMetadataStore>) -> Self {
        Self { store }
    }

    /// Get an existing job. A missing key is a first-class
    /// [`GetJobError::NotFound`] carrying the requested id.
    pub async fn get_job(&self, job_request_id: &str) -> Result<JobMetadata, GetJobError> {
        match self.store.get_job_metadata(job_request_id).await {
            Ok(Some(metadata)) => Ok(metadata),
            Ok(None) => Err(GetJobError::NotFound(job_request_id.to_string())),
            Err(e) => Err(GetJobError::Internal { source: e.into() }),
        }
    }
}
