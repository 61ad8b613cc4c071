// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process implementation of the [`JobQueue`] for tests and local runs.
//!
//! Keeps the same lease discipline as the durable backends: a received
//! message moves into a leased map under a fresh receipt and returns to the
//! visible queue when its deadline passes. A fail switch makes every
//! operation return a backend error, for exercising caller error paths.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, Notify};
use tracing::debug;
use uuid::Uuid;

use tally_core::types::{JobMessage, JSON_BODY_TYPE};
use tally_core::{JobKey, JobQueue, JobQueueItem, QueueError};

#[derive(Debug, Clone)]
struct StoredMessage {
    body: String,
    body_type: Option<String>,
}

struct Leased {
    message: StoredMessage,
    deadline: Instant,
}

#[derive(Default)]
struct Inner {
    visible: VecDeque<StoredMessage>,
    leased: HashMap<String, Leased>,
}

/// In-memory job queue.
pub struct InMemoryJobQueue {
    inner: Mutex<Inner>,
    notify: Notify,
    message_lease: Duration,
    receive_max_wait: Duration,
    should_fail: AtomicBool,
}

impl InMemoryJobQueue {
    pub fn new(message_lease: Duration, receive_max_wait: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            notify: Notify::new(),
            message_lease,
            receive_max_wait,
            should_fail: AtomicBool::new(false),
        }
    }

    /// Make every subsequent operation fail with a backend error, or restore
    /// normal behavior.
    pub fn set_should_fail(&self, should_fail: bool) {
        self.should_fail.store(should_fail, Ordering::SeqCst);
    }

    /// Enqueue a raw message body with an explicit body-type attribute,
    /// emulating a legacy producer.
    pub async fn send_raw(&self, body: &str, body_type: Option<&str>) -> Result<(), QueueError> {
        self.check_fail()?;
        let mut inner = self.inner.lock().await;
        inner.visible.push_back(StoredMessage {
            body: body.to_string(),
            body_type: body_type.map(str::to_string),
        });
        drop(inner);
        self.notify.notify_one();
        Ok(())
    }

    /// Number of messages currently held, visible or leased.
    pub async fn len(&self) -> usize {
        let inner = self.inner.lock().await;
        inner.visible.len() + inner.leased.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn check_fail(&self) -> Result<(), QueueError> {
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(QueueError::backend(std::io::Error::other(
                "queue was set to fail",
            )));
        }
        Ok(())
    }

    /// Move expired leases back to the visible queue, then claim the oldest
    /// visible message.
    async fn claim_next(&self) -> Option<(String, StoredMessage)> {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        let expired: Vec<String> = inner
            .leased
            .iter()
            .filter(|(_, leased)| leased.deadline <= now)
            .map(|(receipt, _)| receipt.clone())
            .collect();
        for receipt in expired {
            if let Some(leased) = inner.leased.remove(&receipt) {
                debug!("lease expired, message visible again");
                inner.visible.push_back(leased.message);
            }
        }

        let message = inner.visible.pop_front()?;
        let receipt = Uuid::new_v4().to_string();
        inner.leased.insert(
            receipt.clone(),
            Leased {
                message: message.clone(),
                deadline: now + self.message_lease,
            },
        );
        Some((receipt, message))
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn send_job(&self, job_key: &JobKey, server_job_id: &str) -> Result<(), QueueError> {
        let body = JobMessage::new(job_key, server_job_id).encode()?;
        self.send_raw(&body, Some(JSON_BODY_TYPE)).await
    }

    async fn receive_job(&self) -> Result<Option<JobQueueItem>, QueueError> {
        let deadline = tokio::time::Instant::now() + self.receive_max_wait;
        loop {
            self.check_fail()?;
            if let Some((receipt, message)) = self.claim_next().await {
                let decoded = JobMessage::decode(&message.body, message.body_type.as_deref())?;
                return Ok(Some(JobQueueItem {
                    job_key_string: decoded.job_request_id,
                    server_job_id: decoded.server_job_id,
                    receipt_info: receipt,
                    processing_timeout: self.message_lease,
                    processing_start_time: Utc::now(),
                }));
            }
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            // Wake early if something is enqueued, otherwise re-check on
            // timeout (a lease may have expired meanwhile).
            let _ = tokio::time::timeout(remaining.min(Duration::from_millis(50)), async {
                self.notify.notified().await;
            })
            .await;
        }
    }

    async fn acknowledge_job_completion(&self, item: &JobQueueItem) -> Result<(), QueueError> {
        self.check_fail()?;
        let mut inner = self.inner.lock().await;
        if inner.leased.remove(&item.receipt_info).is_none() {
            // Stale or already-acknowledged receipt.
            debug!(job_key = %item.job_key_string, "acknowledge matched no message");
        }
        Ok(())
    }

    async fn modify_job_processing_time(
        &self,
        item: &JobQueueItem,
        processing_time: Duration,
    ) -> Result<(), QueueError> {
        self.check_fail()?;
        let mut inner = self.inner.lock().await;
        if let Some(leased) = inner.leased.get_mut(&item.receipt_info) {
            leased.deadline = Instant::now() + processing_time;
        } else {
            debug!(job_key = %item.job_key_string, "lease change matched no message");
        }
        drop(inner);
        self.notify.notify_one();
        Ok(())
    }
}
