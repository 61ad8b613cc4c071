// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Value types of the job client's operations.

use std::time::Duration;

use strum::Display;
use thiserror::Error;

use tally_core::{BoxError, JobKey, ResultInfo};

/// Final result a worker reports for a job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobResult {
    pub job_key: JobKey,
    pub result_info: ResultInfo,
}

/// Parameters for releasing a held job back to the queue.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRetryRequest {
    pub job_key: JobKey,
    /// Wait before other workers may pick the job up again. At most 10
    /// minutes; defaults to immediate.
    pub delay: Option<Duration>,
    /// Partial result recorded on the entry, e.g. accumulated errors.
    pub result_info: Option<ResultInfo>,
}

/// Distinct failure points of the consumer loop, so calling infrastructure
/// can choose differentiated handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorReason {
    JobPullFailed,
    ReturnJobForRetryFailed,
    JobReceiptHandleNotFound,
    JobMetadataNotFound,
    WrongJobStatus,
    JobMarkCompletionFailed,
    JobErrorSummaryUpdateFailed,
    JobDelayOutOfRange,
    UnspecifiedError,
}

/// A failed job client operation, carrying the reason for differentiated
/// handling by the caller.
#[derive(Debug, Error)]
#[error("{reason}: {message}")]
pub struct JobClientError {
    pub reason: ErrorReason,
    pub message: String,
    #[source]
    pub source: Option<BoxError>,
}

impl JobClientError {
    pub fn new(reason: ErrorReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        reason: ErrorReason,
        message: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self {
            reason,
            message: message.into(),
            source: Some(source.into()),
        }
    }
}
