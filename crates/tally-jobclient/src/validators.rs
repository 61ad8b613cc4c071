// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Checks a received job must pass before a worker processes it.
//!
//! A failing check acknowledges the message so it stops circulating; only
//! some checks additionally write the failure into the job's result.

use tracing::{info, warn};

use tally_core::{Job, JobStatus, ReturnCode};

/// A single pre-processing check over a received job.
pub trait JobValidator: Send + Sync {
    /// Returns true when the job may be processed.
    fn validate(&self, job: &Job) -> bool;

    /// Human-readable description, used in logs.
    fn description(&self) -> &'static str;

    /// Message recorded when the check fails and is reported.
    fn validation_error_message(&self) -> String;

    /// Return code recorded when the check fails and is reported.
    fn validation_error_return_code(&self) -> ReturnCode;

    /// Whether a failure is written into the job's result before the
    /// message is acknowledged.
    fn report_validation_error(&self) -> bool;
}

/// Skips jobs whose entry is already FINISHED.
pub struct CheckJobStatus;

impl JobValidator for CheckJobStatus {
    fn validate(&self, job: &Job) -> bool {
        if job.job_status == JobStatus::Finished {
            warn!(job_key = %job.job_key, "job is already finished, nothing to do");
            return false;
        }
        true
    }

    fn description(&self) -> &'static str {
        "check that the received job is in a processable status"
    }

    fn validation_error_message(&self) -> String {
        "Job already finished.".to_string()
    }

    fn validation_error_return_code(&self) -> ReturnCode {
        ReturnCode::UnspecifiedError
    }

    fn report_validation_error(&self) -> bool {
        // The entry already holds its final result; do not overwrite it.
        false
    }
}

/// Fails jobs that have exhausted their processing attempts.
///
/// A worker that crashes mid-processing returns its job to the queue for
/// another worker. This check bounds how many times that can happen.
pub struct CheckRetryLimit {
    max_num_attempts: i32,
}

impl CheckRetryLimit {
    pub fn new(max_num_attempts: i32) -> Self {
        Self { max_num_attempts }
    }
}

impl JobValidator for CheckRetryLimit {
    fn validate(&self, job: &Job) -> bool {
        info!(
            job_key = %job.job_key,
            num_attempts = job.num_attempts,
            limit = self.max_num_attempts,
            "checking attempt budget for received job"
        );
        job.num_attempts < self.max_num_attempts
    }

    fn description(&self) -> &'static str {
        "check that the received job has not exhausted its retries"
    }

    fn validation_error_message(&self) -> String {
        format!(
            "Number of retry attempts exhausted, the job failed to process after {} tries.",
            self.max_num_attempts
        )
    }

    fn validation_error_return_code(&self) -> ReturnCode {
        ReturnCode::RetriesExhausted
    }

    fn report_validation_error(&self) -> bool {
        true
    }
}
