// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite-backed implementation of the [`JobMetadataStore`].
//!
//! Both write primitives are conditional writes, not read-then-write
//! checks: insert relies on `ON CONFLICT DO NOTHING` over the primary key
//! and reports a duplicate when nothing was written; update reports a
//! conflict when no row matched. record_version and the timestamps are
//! stamped here, never by callers.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::params;
use tokio::sync::Mutex;
use tracing::{debug, info};

use tally_config::MetadataConfig;
use tally_core::types::{format_timestamp, parse_timestamp};
use tally_core::{
    JobMetadata, JobMetadataChangeFeed, JobMetadataStore, JobStatus, RequestInfo, ResultInfo,
    StoreError,
};

use crate::database::Database;

const SECONDS_PER_DAY: i64 = 86_400;

const METADATA_COLUMNS: &str = "job_key, job_status, num_attempts, server_job_id, request_info,
     result_info, request_received_at, request_updated_at,
     request_processing_started_at, record_version, ttl";

/// Durable metadata store on the shared SQLite database.
pub struct SqliteJobMetadataStore {
    db: Database,
    retention_days: u32,
}

/// Column values exactly as stored, decoded into domain types off the
/// connection thread.
struct RawRow {
    job_key: String,
    job_status: String,
    num_attempts: i32,
    server_job_id: String,
    request_info: String,
    result_info: Option<String>,
    request_received_at: String,
    request_updated_at: String,
    request_processing_started_at: Option<String>,
    record_version: i64,
    ttl: i64,
}

fn read_row(row: &rusqlite::Row<'_>) -> Result<RawRow, rusqlite::Error> {
    Ok(RawRow {
        job_key: row.get(0)?,
        job_status: row.get(1)?,
        num_attempts: row.get(2)?,
        server_job_id: row.get(3)?,
        request_info: row.get(4)?,
        result_info: row.get(5)?,
        request_received_at: row.get(6)?,
        request_updated_at: row.get(7)?,
        request_processing_started_at: row.get(8)?,
        record_version: row.get(9)?,
        ttl: row.get(10)?,
    })
}

fn decode_row(raw: RawRow) -> Result<JobMetadata, StoreError> {
    let request_info: RequestInfo =
        serde_json::from_str(&raw.request_info).map_err(StoreError::backend)?;
    let result_info: Option<ResultInfo> = raw
        .result_info
        .as_deref()
        .map(serde_json::from_str)
        .transpose()
        .map_err(StoreError::backend)?;
    Ok(JobMetadata {
        job_key: tally_core::JobKey::new(raw.job_key),
        job_status: JobStatus::from_str(&raw.job_status).map_err(StoreError::backend)?,
        num_attempts: raw.num_attempts,
        server_job_id: raw.server_job_id,
        request_info,
        result_info,
        request_received_at: parse_timestamp(&raw.request_received_at)
            .map_err(StoreError::backend)?,
        request_updated_at: parse_timestamp(&raw.request_updated_at)
            .map_err(StoreError::backend)?,
        request_processing_started_at: raw
            .request_processing_started_at
            .as_deref()
            .map(parse_timestamp)
            .transpose()
            .map_err(StoreError::backend)?,
        record_version: raw.record_version,
        ttl: raw.ttl,
    })
}

impl SqliteJobMetadataStore {
    /// Create a store over an already-opened database.
    pub fn new(db: Database, config: &MetadataConfig) -> Self {
        Self {
            db,
            retention_days: config.retention_days,
        }
    }

    fn ttl_from_now(&self) -> i64 {
        Utc::now().timestamp() + i64::from(self.retention_days) * SECONDS_PER_DAY
    }
}

#[async_trait]
impl JobMetadataStore for SqliteJobMetadataStore {
    async fn get_job_metadata(
        &self,
        job_key_string: &str,
    ) -> Result<Option<JobMetadata>, StoreError> {
        let job_key = job_key_string.to_string();
        let raw = self
            .db
            .connection()
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {METADATA_COLUMNS} FROM job_metadata WHERE job_key = ?1"
                ))?;
                match stmt.query_row(params![job_key], read_row) {
                    Ok(raw) => Ok(Some(raw)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e),
                }
            })
            .await
            .map_err(StoreError::backend)?;
        raw.map(decode_row).transpose()
    }

    async fn insert_job_metadata(&self, metadata: &JobMetadata) -> Result<(), StoreError> {
        if metadata.record_version != 0 {
            return Err(StoreError::RecordVersionPreset(
                metadata.job_key.as_str().to_string(),
            ));
        }

        let job_key = metadata.job_key.as_str().to_string();
        let job_status = metadata.job_status.to_string();
        let num_attempts = metadata.num_attempts;
        let server_job_id = metadata.server_job_id.clone();
        let request_info =
            serde_json::to_string(&metadata.request_info).map_err(StoreError::backend)?;
        let result_info = metadata
            .result_info
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(StoreError::backend)?;
        let received_at = format_timestamp(metadata.request_received_at);
        let updated_at = format_timestamp(metadata.request_updated_at);
        let started_at = metadata
            .request_processing_started_at
            .map(format_timestamp);
        let ttl = self.ttl_from_now();

        let key_for_query = job_key.clone();
        let inserted = self
            .db
            .connection()
            .call(move |conn| -> Result<usize, rusqlite::Error> {
                Ok(conn.execute(
                    "INSERT INTO job_metadata
                         (job_key, job_status, num_attempts, server_job_id, request_info,
                          result_info, request_received_at, request_updated_at,
                          request_processing_started_at, record_version, ttl)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, ?10)
                     ON CONFLICT (job_key) DO NOTHING",
                    params![
                        key_for_query,
                        job_status,
                        num_attempts,
                        server_job_id,
                        request_info,
                        result_info,
                        received_at,
                        updated_at,
                        started_at,
                        ttl,
                    ],
                )?)
            })
            .await
            .map_err(StoreError::backend)?;

        if inserted == 0 {
            return Err(StoreError::JobKeyExists(job_key));
        }
        info!(job_key = %metadata.job_key, "inserted job metadata");
        Ok(())
    }

    async fn update_job_metadata(&self, metadata: &JobMetadata) -> Result<(), StoreError> {
        let job_key = metadata.job_key.as_str().to_string();
        let job_status = metadata.job_status.to_string();
        let num_attempts = metadata.num_attempts;
        let server_job_id = metadata.server_job_id.clone();
        let request_info =
            serde_json::to_string(&metadata.request_info).map_err(StoreError::backend)?;
        let result_info = metadata
            .result_info
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(StoreError::backend)?;
        let received_at = format_timestamp(metadata.request_received_at);
        let updated_at = format_timestamp(Utc::now());
        let started_at = metadata
            .request_processing_started_at
            .map(format_timestamp);
        let ttl = self.ttl_from_now();

        let key_for_query = job_key.clone();
        let changed = self
            .db
            .connection()
            .call(move |conn| -> Result<usize, rusqlite::Error> {
                Ok(conn.execute(
                    "UPDATE job_metadata SET
                         job_status = ?2,
                         num_attempts = ?3,
                         server_job_id = ?4,
                         request_info = ?5,
                         result_info = ?6,
                         request_received_at = ?7,
                         request_updated_at = ?8,
                         request_processing_started_at = ?9,
                         record_version = record_version + 1,
                         ttl = ?10
                     WHERE job_key = ?1",
                    params![
                        key_for_query,
                        job_status,
                        num_attempts,
                        server_job_id,
                        request_info,
                        result_info,
                        received_at,
                        updated_at,
                        started_at,
                        ttl,
                    ],
                )?)
            })
            .await
            .map_err(StoreError::backend)?;

        if changed == 0 {
            return Err(StoreError::Conflict(job_key));
        }
        debug!(job_key = %metadata.job_key, status = %metadata.job_status, "updated job metadata");
        Ok(())
    }

    async fn sweep_expired(&self) -> Result<u64, StoreError> {
        let now = Utc::now().timestamp();
        let removed = self
            .db
            .connection()
            .call(move |conn| -> Result<usize, rusqlite::Error> {
                Ok(conn.execute("DELETE FROM job_metadata WHERE ttl <= ?1", params![now])?)
            })
            .await
            .map_err(StoreError::backend)?;
        if removed > 0 {
            info!(removed, "swept expired job metadata");
        }
        Ok(removed as u64)
    }
}

/// Polling change feed over the metadata table.
///
/// Tracks a watermark of the newest `request_updated_at` already delivered;
/// each call returns the rows updated past it, oldest first. A fresh feed
/// starts from the beginning of the table, so consumers see every existing
/// row once after a restart.
pub struct SqliteJobMetadataChangeFeed {
    db: Database,
    watermark: Mutex<String>,
}

impl SqliteJobMetadataChangeFeed {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            watermark: Mutex::new(String::new()),
        }
    }
}

#[async_trait]
impl JobMetadataChangeFeed for SqliteJobMetadataChangeFeed {
    async fn next_changes(&self) -> Result<Vec<JobMetadata>, StoreError> {
        let mut watermark = self.watermark.lock().await;
        let since = watermark.clone();
        let raws = self
            .db
            .connection()
            .call(move |conn| -> Result<Vec<RawRow>, rusqlite::Error> {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {METADATA_COLUMNS} FROM job_metadata
                     WHERE request_updated_at > ?1
                     ORDER BY request_updated_at ASC, job_key ASC"
                ))?;
                let rows = stmt.query_map(params![since], read_row)?;
                let mut raws = Vec::new();
                for row in rows {
                    raws.push(row?);
                }
                Ok(raws)
            })
            .await
            .map_err(StoreError::backend)?;

        let mut changes = Vec::with_capacity(raws.len());
        for raw in raws {
            let updated_at = raw.request_updated_at.clone();
            changes.push(decode_row(raw)?);
            // Advance only past rows actually delivered.
            if updated_at > *watermark {
                *watermark = updated_at;
            }
        }
        Ok(changes)
    }
}

/// Build a sqlite store and its change feed over the same database handle.
pub fn with_change_feed(
    db: Database,
    config: &MetadataConfig,
) -> (Arc<SqliteJobMetadataStore>, SqliteJobMetadataChangeFeed) {
    (
        Arc::new(SqliteJobMetadataStore::new(db.clone(), config)),
        SqliteJobMetadataChangeFeed::new(db),
    )
}
