// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metadata store seam implemented by the concrete store backends.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::types::JobMetadata;

/// Interface for the durable job metadata store.
///
/// The store is the single source of truth for job state. Writers never
/// take explicit locks; all mutation safety comes from the conditional
/// write primitives below, so a late second application of any mutation is
/// detected and rejected rather than silently corrupting state.
#[async_trait]
pub trait JobMetadataStore: Send + Sync {
    /// Retrieve metadata for a job. `None` if no entry exists.
    async fn get_job_metadata(
        &self,
        job_key_string: &str,
    ) -> Result<Option<JobMetadata>, StoreError>;

    /// Insert a metadata entry, failing with [`StoreError::JobKeyExists`]
    /// if the key is already in use.
    ///
    /// The absence check is part of the write itself, not a separate read,
    /// so concurrent creators cannot both succeed. The store stamps the
    /// entry's ttl; callers must leave record_version unset
    /// ([`StoreError::RecordVersionPreset`] otherwise).
    async fn insert_job_metadata(&self, metadata: &JobMetadata) -> Result<(), StoreError>;

    /// Overwrite an existing entry, failing with [`StoreError::Conflict`]
    /// if no entry for the key exists.
    ///
    /// Performs a full-row overwrite (last writer wins), stamping
    /// request_updated_at and re-stamping ttl. The conflict outcome is how
    /// racing finalizers detect each other; whether it is expected or fatal
    /// is the caller's decision.
    async fn update_job_metadata(&self, metadata: &JobMetadata) -> Result<(), StoreError>;

    /// Delete entries whose ttl has passed, returning how many were
    /// removed. Backends with native TTL enforcement keep the default no-op.
    async fn sweep_expired(&self) -> Result<u64, StoreError> {
        Ok(0)
    }
}
