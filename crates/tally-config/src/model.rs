// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup. Backend and strategy selection are closed enums:
//! a deployment picks its backends once, here, not dynamically.

use serde::{Deserialize, Serialize};

/// Top-level tally configuration.
///
/// Loaded from TOML files following the XDG hierarchy, with environment
/// variable overrides. All sections are optional and default to a purely
/// local (SQLite) deployment.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TallyConfig {
    /// Job queue backend settings.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Metadata store backend settings.
    #[serde(default)]
    pub metadata: MetadataConfig,

    /// Worker-side job client settings.
    #[serde(default)]
    pub client: ClientConfig,

    /// Job creation settings.
    #[serde(default)]
    pub frontend: FrontendConfig,
}

/// Which queue backend a deployment uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueueBackend {
    /// Durable single-node queue backed by SQLite.
    #[default]
    Sqlite,
    /// In-process queue for tests and local runs.
    Memory,
}

/// Job queue backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QueueConfig {
    #[serde(default)]
    pub backend: QueueBackend,

    /// Path of the queue database file (sqlite backend only).
    #[serde(default = "default_queue_database_path")]
    pub database_path: String,

    /// Lease granted to each received message. If the message is not
    /// acknowledged within this window it becomes visible again.
    #[serde(default = "default_message_lease_seconds")]
    pub message_lease_seconds: u64,

    /// Longest a receive call blocks waiting for a message.
    #[serde(default = "default_receive_max_wait_seconds")]
    pub receive_max_wait_seconds: u64,

    /// Polling cadence inside a blocking receive.
    #[serde(default = "default_receive_poll_interval_ms")]
    pub receive_poll_interval_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backend: QueueBackend::default(),
            database_path: default_queue_database_path(),
            message_lease_seconds: default_message_lease_seconds(),
            receive_max_wait_seconds: default_receive_max_wait_seconds(),
            receive_poll_interval_ms: default_receive_poll_interval_ms(),
        }
    }
}

fn default_queue_database_path() -> String {
    "tally.db".to_string()
}

fn default_message_lease_seconds() -> u64 {
    600
}

fn default_receive_max_wait_seconds() -> u64 {
    5
}

fn default_receive_poll_interval_ms() -> u64 {
    250
}

/// Which metadata store backend a deployment uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MetadataBackend {
    #[default]
    Sqlite,
    Memory,
}

/// Metadata store backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MetadataConfig {
    #[serde(default)]
    pub backend: MetadataBackend,

    /// Path of the metadata database file (sqlite backend only). May equal
    /// the queue path, in which case the two share one database handle.
    #[serde(default = "default_metadata_database_path")]
    pub database_path: String,

    /// Days until a metadata entry becomes eligible for the TTL sweep.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            backend: MetadataBackend::default(),
            database_path: default_metadata_database_path(),
            retention_days: default_retention_days(),
        }
    }
}

fn default_metadata_database_path() -> String {
    "tally.db".to_string()
}

fn default_retention_days() -> u32 {
    365
}

/// Worker-side job client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Jobs whose attempt count reaches this limit are failed instead of
    /// being processed again.
    #[serde(default = "default_max_num_attempts")]
    pub max_num_attempts: i32,

    /// Empty-queue polls before get_job gives up and returns no job.
    #[serde(default = "default_pull_max_attempts")]
    pub pull_max_attempts: u32,

    /// Base delay between empty-queue polls; doubles each attempt.
    #[serde(default = "default_pull_base_delay_ms")]
    pub pull_base_delay_ms: u64,

    /// Random jitter added to each pull delay.
    #[serde(default = "default_pull_jitter_ms")]
    pub pull_jitter_ms: u64,

    /// Metadata lookups attempted per received message, absorbing the lag
    /// between a message landing and its row becoming readable.
    #[serde(default = "default_lookup_max_attempts")]
    pub lookup_max_attempts: u32,

    /// Base delay between metadata lookup retries; doubles each attempt.
    #[serde(default = "default_lookup_base_delay_ms")]
    pub lookup_base_delay_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_num_attempts: default_max_num_attempts(),
            pull_max_attempts: default_pull_max_attempts(),
            pull_base_delay_ms: default_pull_base_delay_ms(),
            pull_jitter_ms: default_pull_jitter_ms(),
            lookup_max_attempts: default_lookup_max_attempts(),
            lookup_base_delay_ms: default_lookup_base_delay_ms(),
        }
    }
}

fn default_max_num_attempts() -> i32 {
    5
}

fn default_pull_max_attempts() -> u32 {
    5
}

fn default_pull_base_delay_ms() -> u64 {
    1000
}

fn default_pull_jitter_ms() -> u64 {
    250
}

fn default_lookup_max_attempts() -> u32 {
    6
}

fn default_lookup_base_delay_ms() -> u64 {
    1000
}

/// How a creation task coordinates the store and the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CreationStrategy {
    /// Insert the metadata entry only; a downstream reconciliation pass
    /// repairs jobs that never reach the queue.
    #[default]
    InsertOnly,
    /// Publish the queue message before inserting the metadata entry, so a
    /// consumer can always act on an accepted job.
    EnqueueFirst,
}

/// Job creation configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FrontendConfig {
    #[serde(default)]
    pub creation_strategy: CreationStrategy,
}
