// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Change feed seam driving metadata reconciliation.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::types::JobMetadata;

/// Source of recently-changed metadata entries.
///
/// The polling substitute for a store change stream: each call returns the
/// entries updated since the previous call, oldest first. An entry may be
/// delivered more than once across process restarts; consumers must treat
/// deliveries as at-least-once.
#[async_trait]
pub trait JobMetadataChangeFeed: Send + Sync {
    async fn next_changes(&self) -> Result<Vec<JobMetadata>, StoreError>;
}
