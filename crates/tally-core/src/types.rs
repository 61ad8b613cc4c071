// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared value types for the job coordination layer.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::QueueError;

/// Body-type attribute value marking a JSON-encoded queue message body.
/// Messages without the attribute are legacy plain-string bodies.
pub const JSON_BODY_TYPE: &str = "JSON";

/// Unique identifier for a job, chosen by the caller at submission time.
/// Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobKey(pub String);

impl JobKey {
    pub fn new(job_request_id: impl Into<String>) -> Self {
        Self(job_request_id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle status of a job's metadata entry.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Received,
    InProgress,
    Finished,
}

/// Outcome code recorded in a job's result.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ReturnCode {
    Success,
    InternalError,
    RetriesExhausted,
    UnspecifiedError,
}

/// Input parameters of a job request. Immutable after creation; the
/// coordination layer stores and returns it without inspecting the contents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestInfo {
    pub job_request_id: String,
    #[serde(default)]
    pub job_parameters: BTreeMap<String, String>,
    #[serde(default)]
    pub input_data_bucket_name: String,
    #[serde(default)]
    pub input_data_blob_prefix: String,
    #[serde(default)]
    pub output_data_bucket_name: String,
    #[serde(default)]
    pub output_data_blob_prefix: String,
}

/// Accumulated error messages for a job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorSummary {
    #[serde(default)]
    pub error_messages: Vec<String>,
}

/// Result of a finished (or failing) job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultInfo {
    pub return_code: String,
    pub return_message: String,
    #[serde(default)]
    pub error_summary: ErrorSummary,
    pub finished_at: DateTime<Utc>,
}

/// The durable metadata record for one job, keyed by [`JobKey`]. Created
/// once, mutated as processing proceeds, terminal at FINISHED, and removed
/// only by the store's TTL sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct JobMetadata {
    pub job_key: JobKey,
    pub job_status: JobStatus,
    pub num_attempts: i32,
    /// Generated at creation; detects duplicate re-delivery independent of
    /// the job key.
    pub server_job_id: String,
    pub request_info: RequestInfo,
    pub result_info: Option<ResultInfo>,
    pub request_received_at: DateTime<Utc>,
    pub request_updated_at: DateTime<Utc>,
    pub request_processing_started_at: Option<DateTime<Utc>>,
    /// Store-managed. Asserts that the record already existed on update; it
    /// is not a version vector and is never compared by writers.
    pub record_version: i64,
    /// Absolute expiry, epoch seconds. Stamped by the store on insert and
    /// update.
    pub ttl: i64,
}

/// The queue-side projection of one delivery of a job message. The receipt
/// is only valid for this delivery and is never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct JobQueueItem {
    pub job_key_string: String,
    pub server_job_id: String,
    /// Opaque token required to acknowledge or extend the lease.
    pub receipt_info: String,
    /// Lease duration granted at receipt time.
    pub processing_timeout: Duration,
    pub processing_start_time: DateTime<Utc>,
}

/// Client-facing merge of a job's metadata and queue lease info. Not
/// persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub job_key: JobKey,
    pub job_status: JobStatus,
    pub request_info: RequestInfo,
    pub num_attempts: i32,
    pub processing_timeout: Duration,
    pub create_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
    pub processing_start_time: Option<DateTime<Utc>>,
}

/// Wire body of a queue message.
///
/// Serialized as camelCase JSON and tagged with [`JSON_BODY_TYPE`]. Untagged
/// messages are legacy deliveries whose entire body is the bare job request
/// id; both formats must stay parseable across format-upgrade boundaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobMessage {
    pub job_request_id: String,
    #[serde(default)]
    pub server_job_id: String,
}

impl JobMessage {
    pub fn new(job_key: &JobKey, server_job_id: impl Into<String>) -> Self {
        Self {
            job_request_id: job_key.as_str().to_string(),
            server_job_id: server_job_id.into(),
        }
    }

    /// Encode to the JSON wire body.
    pub fn encode(&self) -> Result<String, QueueError> {
        serde_json::to_string(self).map_err(QueueError::backend)
    }

    /// Decode a message body according to its body-type attribute.
    pub fn decode(body: &str, body_type: Option<&str>) -> Result<Self, QueueError> {
        match body_type {
            // Legacy message: the body is the job request id itself.
            None => Ok(Self {
                job_request_id: body.to_string(),
                server_job_id: String::new(),
            }),
            Some(JSON_BODY_TYPE) => serde_json::from_str(body).map_err(QueueError::backend),
            Some(other) => Err(QueueError::InvalidBodyType(other.to_string())),
        }
    }
}

/// Format a timestamp the way rows and queue entries store it: RFC3339 with
/// millisecond precision and a trailing `Z`.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a timestamp previously written by [`format_timestamp`].
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|t| t.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_status_string_round_trip() {
        use std::str::FromStr;
        for status in [JobStatus::Received, JobStatus::InProgress, JobStatus::Finished] {
            let parsed = JobStatus::from_str(&status.to_string()).unwrap();
            assert_eq!(status, parsed);
        }
        assert_eq!(JobStatus::InProgress.to_string(), "IN_PROGRESS");
    }

    #[test]
    fn job_message_encodes_camel_case() {
        let message = JobMessage::new(&JobKey::new("job-1"), "srv-1");
        let body = message.encode().unwrap();
        assert_eq!(body, r#"{"jobRequestId":"job-1","serverJobId":"srv-1"}"#);
    }

    #[test]
    fn job_message_decodes_tagged_json_body() {
        let decoded = JobMessage::decode(
            r#"{"jobRequestId":"job-1","serverJobId":"srv-1"}"#,
            Some(JSON_BODY_TYPE),
        )
        .unwrap();
        assert_eq!(decoded.job_request_id, "job-1");
        assert_eq!(decoded.server_job_id, "srv-1");
    }

    #[test]
    fn job_message_decodes_legacy_bare_string_body() {
        let decoded = JobMessage::decode("abc123", None).unwrap();
        assert_eq!(decoded.job_request_id, "abc123");
        assert_eq!(decoded.server_job_id, "");
    }

    #[test]
    fn job_message_rejects_unknown_body_type() {
        let result = JobMessage::decode("abc123", Some("XML"));
        assert!(matches!(result, Err(QueueError::InvalidBodyType(t)) if t == "XML"));
    }

    #[test]
    fn timestamp_round_trip_preserves_millis() {
        let now = Utc::now();
        let parsed = parse_timestamp(&format_timestamp(now)).unwrap();
        assert_eq!(parsed.timestamp_millis(), now.timestamp_millis());
    }

    #[test]
    fn request_info_json_round_trip() {
        let mut info = RequestInfo {
            job_request_id: "job-1".into(),
            ..Default::default()
        };
        info.job_parameters
            .insert("attribution_report_to".into(), "https://origin.example".into());
        let json = serde_json::to_string(&info).unwrap();
        let back: RequestInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(info, back);
    }
}
