// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process implementation of the [`JobMetadataStore`] for tests and
//! local runs.
//!
//! Preserves the exact contract outcomes of the durable backends and adds
//! fault-injection switches so callers can exercise their error paths:
//! force backend errors, force an update conflict, or make the next N
//! lookups miss (emulating the write lag between a queue message landing
//! and its row becoming readable).

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use tally_core::{JobMetadata, JobMetadataChangeFeed, JobMetadataStore, StoreError};

const SECONDS_PER_DAY: i64 = 86_400;

/// In-memory metadata store.
#[derive(Default)]
pub struct InMemoryJobMetadataStore {
    rows: Mutex<BTreeMap<String, JobMetadata>>,
    retention_days: u32,
    should_fail: AtomicBool,
    conflict_on_update: AtomicBool,
    lookup_misses: AtomicU32,
}

impl InMemoryJobMetadataStore {
    pub fn new(retention_days: u32) -> Self {
        Self {
            retention_days,
            ..Default::default()
        }
    }

    /// Make every subsequent operation fail with a backend error, or
    /// restore normal behavior.
    pub fn set_should_fail(&self, should_fail: bool) {
        self.should_fail.store(should_fail, Ordering::SeqCst);
    }

    /// Make every subsequent update fail with a conflict, as if another
    /// writer resolved the row first.
    pub fn set_conflict_on_update(&self, conflict: bool) {
        self.conflict_on_update.store(conflict, Ordering::SeqCst);
    }

    /// Make the next `count` lookups return no row regardless of contents.
    pub fn fail_next_lookups(&self, count: u32) {
        self.lookup_misses.store(count, Ordering::SeqCst);
    }

    /// Snapshot of all stored entries, in key order.
    pub async fn entries(&self) -> Vec<JobMetadata> {
        self.rows.lock().await.values().cloned().collect()
    }

    fn check_fail(&self) -> Result<(), StoreError> {
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(StoreError::backend(std::io::Error::other(
                "metadata store was set to fail",
            )));
        }
        Ok(())
    }

    fn ttl_from_now(&self) -> i64 {
        Utc::now().timestamp() + i64::from(self.retention_days) * SECONDS_PER_DAY
    }
}

#[async_trait]
impl JobMetadataStore for InMemoryJobMetadataStore {
    async fn get_job_metadata(
        &self,
        job_key_string: &str,
    ) -> Result<Option<JobMetadata>, StoreError> {
        self.check_fail()?;
        let misses = self.lookup_misses.load(Ordering::SeqCst);
        if misses > 0 {
            self.lookup_misses.store(misses - 1, Ordering::SeqCst);
            debug!(job_key = job_key_string, "injected lookup miss");
            return Ok(None);
        }
        Ok(self.rows.lock().await.get(job_key_string).cloned())
    }

    async fn insert_job_metadata(&self, metadata: &JobMetadata) -> Result<(), StoreError> {
        self.check_fail()?;
        if metadata.record_version != 0 {
            return Err(StoreError::RecordVersionPreset(
                metadata.job_key.as_str().to_string(),
            ));
        }
        let mut rows = self.rows.lock().await;
        let key = metadata.job_key.as_str().to_string();
        if rows.contains_key(&key) {
            return Err(StoreError::JobKeyExists(key));
        }
        let mut entry = metadata.clone();
        entry.ttl = self.ttl_from_now();
        rows.insert(key, entry);
        Ok(())
    }

    async fn update_job_metadata(&self, metadata: &JobMetadata) -> Result<(), StoreError> {
        self.check_fail()?;
        let key = metadata.job_key.as_str().to_string();
        if self.conflict_on_update.load(Ordering::SeqCst) {
            return Err(StoreError::Conflict(key));
        }
        let mut rows = self.rows.lock().await;
        let Some(existing) = rows.get(&key) else {
            return Err(StoreError::Conflict(key));
        };
        let mut entry = metadata.clone();
        entry.request_updated_at = Utc::now();
        entry.record_version = existing.record_version + 1;
        entry.ttl = self.ttl_from_now();
        rows.insert(key, entry);
        Ok(())
    }

    async fn sweep_expired(&self) -> Result<u64, StoreError> {
        self.check_fail()?;
        let now = Utc::now().timestamp();
        let mut rows = self.rows.lock().await;
        let before = rows.len();
        rows.retain(|_, entry| entry.ttl > now);
        Ok((before - rows.len()) as u64)
    }
}

/// Polling change feed over an in-memory store, watermarked the same way as
/// the durable feed.
pub struct InMemoryJobMetadataChangeFeed {
    store: std::sync::Arc<InMemoryJobMetadataStore>,
    watermark: Mutex<Option<DateTime<Utc>>>,
}

impl InMemoryJobMetadataChangeFeed {
    pub fn new(store: std::sync::Arc<InMemoryJobMetadataStore>) -> Self {
        Self {
            store,
            watermark: Mutex::new(None),
        }
    }
}

#[async_trait]
impl JobMetadataChangeFeed for InMemoryJobMetadataChangeFeed {
    async fn next_changes(&self) -> Result<Vec<JobMetadata>, StoreError> {
        self.store.check_fail()?;
        let mut watermark = self.watermark.lock().await;
        let rows = self.store.rows.lock().await;
        let mut changes: Vec<JobMetadata> = rows
            .values()
            .filter(|entry| watermark.is_none_or(|mark| entry.request_updated_at > mark))
            .cloned()
            .collect();
        changes.sort_by_key(|entry| entry.request_updated_at);
        if let Some(last) = changes.last() {
            *watermark = Some(last.request_updated_at);
        }
        Ok(changes)
    }
}
