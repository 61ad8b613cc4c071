// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Frontend tasks for tally: job creation, retrieval, request validation,
//! and change-driven reconciliation between the metadata store and the
//! queue.

pub mod create;
pub mod error;
pub mod get;
pub mod reconcile;
pub mod validation;

pub use create::{CreateJobTask, EnqueueFirstCreateJobTask, InsertOnlyCreateJobTask};
pub use error::{CreateJobError, GetJobError};
pub use get::GetJobTask;
pub use reconcile::{
    JobMetadataChangeHandler, MarkJobFailedToEnqueueHandler, ReconcileError, ReconcileRunner,
};
pub use validation::{
    default_validators, JobRequestIdCharactersValidator, JobRequestIdLengthValidator,
    RequestInfoValidator,
};
