// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Caller-facing error types for the frontend tasks.

use thiserror::Error;

use tally_core::BoxError;

/// Outcome of a failed job creation attempt. Callers can distinguish a
/// rejected request, a duplicate submission, and a backend failure.
#[derive(Debug, Error)]
pub enum CreateJobError {
    /// The request failed one or more validators; the message concatenates
    /// every failing validator's output.
    #[error("invalid job request: {0}")]
    Validation(String),

    /// A job with the same job_request_id was already accepted.
    #[error("a job with job_request_id '{0}' already exists")]
    DuplicateJob(String),

    /// The store or queue failed while creating the job.
    #[error("internal error creating job: {source}")]
    Internal { source: BoxError },
}

impl CreateJobError {
    pub fn internal(source: impl Into<BoxError>) -> Self {
        Self::Internal {
            source: source.into(),
        }
    }
}

/// Outcome of a failed job retrieval. Not-found is a first-class,
/// user-facing outcome, not an internal error.
#[derive(Debug, Error)]
pub enum GetJobError {
    #[error("job with job_request_id '{0}' could not be found")]
    NotFound(String),

    #[error("internal error fetching job: {source}")]
    Internal { source: BoxError },
}
