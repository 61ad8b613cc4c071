// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite-backed implementation of the [`JobQueue`].
//!
//! A row with a NULL receipt or an expired lease is visible. Receiving
//! claims the oldest visible row inside a single transaction, stamping a
//! fresh receipt and a lease deadline, so concurrent receivers cannot claim
//! the same delivery. Acknowledging deletes by receipt only; once a lease
//! has expired and the message was re-received, the old receipt matches
//! nothing and the late acknowledge is a no-op.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::params;
use tracing::{debug, info, warn};
use uuid::Uuid;

use tally_config::QueueConfig;
use tally_core::types::{format_timestamp, JobMessage, JSON_BODY_TYPE};
use tally_core::{JobKey, JobQueue, JobQueueItem, QueueError};

use crate::database::Database;

/// Durable job queue on the shared SQLite database.
pub struct SqliteJobQueue {
    db: Database,
    message_lease: Duration,
    receive_max_wait: Duration,
    receive_poll_interval: Duration,
}

impl SqliteJobQueue {
    /// Create a queue over an already-opened database.
    pub fn new(db: Database, config: &QueueConfig) -> Self {
        Self {
            db,
            message_lease: Duration::from_secs(config.message_lease_seconds),
            receive_max_wait: Duration::from_secs(config.receive_max_wait_seconds),
            receive_poll_interval: Duration::from_millis(config.receive_poll_interval_ms),
        }
    }

    /// Enqueue a raw message body with an explicit body-type attribute.
    ///
    /// Normal sends go through [`JobQueue::send_job`]; this exists so tests
    /// and migration tooling can emulate legacy producers whose bodies are
    /// bare job request ids without a body type.
    pub async fn send_raw(&self, body: &str, body_type: Option<&str>) -> Result<(), QueueError> {
        let body = body.to_string();
        let body_type = body_type.map(str::to_string);
        self.db
            .connection()
            .call(move |conn| -> Result<(), rusqlite::Error> {
                conn.execute(
                    "INSERT INTO job_queue (message_body, body_type) VALUES (?1, ?2)",
                    params![body, body_type],
                )?;
                Ok(())
            })
            .await
            .map_err(QueueError::backend)
    }

    /// Claim the oldest visible message, if any, returning the new receipt
    /// plus the raw body and body type.
    ///
    /// Decoding happens in the caller so a malformed body surfaces as an
    /// error while the claim (and its lease) stands, exactly as a remote
    /// queue would behave.
    async fn claim_next(&self) -> Result<Option<(String, String, Option<String>)>, QueueError> {
        let now = format_timestamp(Utc::now());
        let lease_deadline = format_timestamp(
            Utc::now() + chrono::Duration::from_std(self.message_lease).unwrap_or_default(),
        );
        let receipt = Uuid::new_v4().to_string();

        self.db
            .connection()
            .call(move |conn| {
                let tx = conn.transaction()?;

                let result = {
                    let mut stmt = tx.prepare(
                        "SELECT id, message_body, body_type
                         FROM job_queue
                         WHERE receipt IS NULL OR lease_expires_at <= ?1
                         ORDER BY id ASC
                         LIMIT 1",
                    )?;
                    stmt.query_row(params![now], |row| {
                        Ok((
                            row.get::<_, i64>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, Option<String>>(2)?,
                        ))
                    })
                };

                match result {
                    Ok((id, body, body_type)) => {
                        tx.execute(
                            "UPDATE job_queue SET receipt = ?1, lease_expires_at = ?2
                             WHERE id = ?3",
                            params![receipt, lease_deadline, id],
                        )?;
                        tx.commit()?;
                        Ok(Some((receipt, body, body_type)))
                    }
                    Err(rusqlite::Error::QueryReturnedNoRows) => {
                        tx.commit()?;
                        Ok(None)
                    }
                    Err(e) => Err(e),
                }
            })
            .await
            .map_err(QueueError::backend)
    }
}

#[async_trait]
impl JobQueue for SqliteJobQueue {
    async fn send_job(&self, job_key: &JobKey, server_job_id: &str) -> Result<(), QueueError> {
        let body = JobMessage::new(job_key, server_job_id).encode()?;
        self.send_raw(&body, Some(JSON_BODY_TYPE)).await?;
        info!(job_key = %job_key, "placed job on queue");
        Ok(())
    }

    async fn receive_job(&self) -> Result<Option<JobQueueItem>, QueueError> {
        let deadline = tokio::time::Instant::now() + self.receive_max_wait;
        loop {
            if let Some((receipt, body, body_type)) = self.claim_next().await? {
                let message = JobMessage::decode(&body, body_type.as_deref())?;
                let item = JobQueueItem {
                    job_key_string: message.job_request_id,
                    server_job_id: message.server_job_id,
                    receipt_info: receipt,
                    processing_timeout: self.message_lease,
                    processing_start_time: Utc::now(),
                };
                info!(
                    job_key = %item.job_key_string,
                    server_job_id = %item.server_job_id,
                    "received job from queue"
                );
                return Ok(Some(item));
            }
            if tokio::time::Instant::now() >= deadline {
                debug!("no job received from queue");
                return Ok(None);
            }
            tokio::time::sleep(self.receive_poll_interval).await;
        }
    }

    async fn acknowledge_job_completion(&self, item: &JobQueueItem) -> Result<(), QueueError> {
        let receipt = item.receipt_info.clone();
        let removed = self
            .db
            .connection()
            .call(move |conn| -> Result<usize, rusqlite::Error> {
                Ok(conn.execute(
                    "DELETE FROM job_queue WHERE receipt = ?1",
                    params![receipt],
                )?)
            })
            .await
            .map_err(QueueError::backend)?;
        if removed == 0 {
            // Stale or already-acknowledged receipt.
            debug!(job_key = %item.job_key_string, "acknowledge matched no message");
        } else {
            info!(job_key = %item.job_key_string, "acknowledged job completion");
        }
        Ok(())
    }

    async fn modify_job_processing_time(
        &self,
        item: &JobQueueItem,
        processing_time: Duration,
    ) -> Result<(), QueueError> {
        let receipt = item.receipt_info.clone();
        let new_deadline = format_timestamp(
            Utc::now() + chrono::Duration::from_std(processing_time).unwrap_or_default(),
        );
        let changed = self
            .db
            .connection()
            .call(move |conn| -> Result<usize, rusqlite::Error> {
                Ok(conn.execute(
                    "UPDATE job_queue SET lease_expires_at = ?1 WHERE receipt = ?2",
                    params![new_deadline, receipt],
                )?)
            })
            .await
            .map_err(QueueError::backend)?;
        if changed == 0 {
            warn!(job_key = %item.job_key_string, "lease change matched no message");
        } else {
            info!(job_key = %item.job_key_string, "updated processing time for job");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn fast_config() -> QueueConfig {
        QueueConfig {
            message_lease_seconds: 600,
            receive_max_wait_seconds: 0,
            receive_poll_interval_ms: 10,
            ..QueueConfig::default()
        }
    }

    async fn setup_queue(config: QueueConfig) -> (SqliteJobQueue, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("queue.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (SqliteJobQueue::new(db, &config), dir)
    }

    async fn message_count(queue: &SqliteJobQueue) -> i64 {
        queue
            .db
            .connection()
            .call(|conn| -> Result<i64, rusqlite::Error> {
                conn.query_row("SELECT COUNT(*) FROM job_queue", [], |row| row.get(0))
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn send_and_receive_round_trip() {
        let (queue, _dir) = setup_queue(fast_config()).await;

        queue
            .send_job(&JobKey::new("job-1"), "srv-1")
            .await
            .unwrap();

        let item = queue.receive_job().await.unwrap().unwrap();
        assert_eq!(item.job_key_string, "job-1");
        assert_eq!(item.server_job_id, "srv-1");
        assert!(!item.receipt_info.is_empty());
        assert_eq!(item.processing_timeout, Duration::from_secs(600));
    }

    #[tokio::test]
    async fn receive_on_empty_queue_returns_none() {
        let (queue, _dir) = setup_queue(fast_config()).await;
        assert!(queue.receive_job().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn received_message_is_invisible_until_lease_expires() {
        let (queue, _dir) = setup_queue(fast_config()).await;
        queue
            .send_job(&JobKey::new("job-1"), "srv-1")
            .await
            .unwrap();

        let first = queue.receive_job().await.unwrap().unwrap();
        assert!(queue.receive_job().await.unwrap().is_none());

        // Shorten the lease to zero; the message becomes visible again under
        // a fresh receipt.
        queue
            .modify_job_processing_time(&first, Duration::ZERO)
            .await
            .unwrap();
        let second = queue.receive_job().await.unwrap().unwrap();
        assert_eq!(second.job_key_string, "job-1");
        assert_ne!(second.receipt_info, first.receipt_info);
    }

    #[tokio::test]
    async fn acknowledge_removes_the_message() {
        let (queue, _dir) = setup_queue(fast_config()).await;
        queue
            .send_job(&JobKey::new("job-1"), "srv-1")
            .await
            .unwrap();

        let item = queue.receive_job().await.unwrap().unwrap();
        queue.acknowledge_job_completion(&item).await.unwrap();

        assert_eq!(message_count(&queue).await, 0);
        assert!(queue.receive_job().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn double_acknowledge_is_a_benign_no_op() {
        let (queue, _dir) = setup_queue(fast_config()).await;
        queue
            .send_job(&JobKey::new("job-1"), "srv-1")
            .await
            .unwrap();
        queue
            .send_job(&JobKey::new("job-2"), "srv-2")
            .await
            .unwrap();

        let item = queue.receive_job().await.unwrap().unwrap();
        queue.acknowledge_job_completion(&item).await.unwrap();
        queue.acknowledge_job_completion(&item).await.unwrap();

        // The unrelated message is untouched.
        assert_eq!(message_count(&queue).await, 1);
        let other = queue.receive_job().await.unwrap().unwrap();
        assert_eq!(other.job_key_string, "job-2");
    }

    #[tokio::test]
    async fn stale_receipt_cannot_delete_a_redelivered_message() {
        let (queue, _dir) = setup_queue(fast_config()).await;
        queue
            .send_job(&JobKey::new("job-1"), "srv-1")
            .await
            .unwrap();

        let first = queue.receive_job().await.unwrap().unwrap();
        queue
            .modify_job_processing_time(&first, Duration::ZERO)
            .await
            .unwrap();
        let _second = queue.receive_job().await.unwrap().unwrap();

        // The expired delivery's receipt no longer matches anything.
        queue.acknowledge_job_completion(&first).await.unwrap();
        assert_eq!(message_count(&queue).await, 1);
    }

    #[tokio::test]
    async fn legacy_bare_string_body_parses() {
        let (queue, _dir) = setup_queue(fast_config()).await;
        queue.send_raw("abc123", None).await.unwrap();

        let item = queue.receive_job().await.unwrap().unwrap();
        assert_eq!(item.job_key_string, "abc123");
        assert_eq!(item.server_job_id, "");
    }

    #[tokio::test]
    async fn unknown_body_type_is_a_typed_error() {
        let (queue, _dir) = setup_queue(fast_config()).await;
        queue.send_raw("whatever", Some("AVRO")).await.unwrap();

        let result = queue.receive_job().await;
        assert!(matches!(result, Err(QueueError::InvalidBodyType(t)) if t == "AVRO"));
    }

    #[tokio::test]
    async fn messages_are_delivered_oldest_first() {
        let (queue, _dir) = setup_queue(fast_config()).await;
        for n in 1..=3 {
            queue
                .send_job(&JobKey::new(format!("job-{n}")), "srv")
                .await
                .unwrap();
        }
        for n in 1..=3 {
            let item = queue.receive_job().await.unwrap().unwrap();
            assert_eq!(item.job_key_string, format!("job-{n}"));
        }
    }
}
