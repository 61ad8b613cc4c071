// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Composition root: wires concrete backends behind the queue/store seams.
//!
//! Backends are selected once, from configuration, via explicit
//! constructors. Nothing here is discovered dynamically.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use tally_config::{CreationStrategy, MetadataBackend, QueueBackend, TallyConfig};
use tally_core::{JobMetadataChangeFeed, JobMetadataStore, JobQueue};
use tally_frontend::{
    default_validators, CreateJobTask, EnqueueFirstCreateJobTask, GetJobTask,
    InsertOnlyCreateJobTask, MarkJobFailedToEnqueueHandler, ReconcileRunner,
};
use tally_jobclient::{JobClient, WorkerJobClient};
use tally_storage::{
    Database, DatabaseError, InMemoryJobMetadataChangeFeed, InMemoryJobMetadataStore,
    InMemoryJobQueue, SqliteJobMetadataChangeFeed, SqliteJobMetadataStore, SqliteJobQueue,
};

/// Failure wiring the configured backends together.
#[derive(Debug, Error)]
pub enum CompositionError {
    #[error("failed to open database: {0}")]
    Database(#[from] DatabaseError),
}

/// The wired subsystems of one deployment.
pub struct Services {
    pub queue: Arc<dyn JobQueue>,
    pub store: Arc<dyn JobMetadataStore>,
    pub create_job_task: Arc<dyn CreateJobTask>,
    pub get_job_task: GetJobTask,
    pub reconciler: ReconcileRunner,
    pub job_client: Arc<dyn JobClient>,
}

/// One `Database` handle per path, shared between the queue and the store
/// when they point at the same file (single-writer discipline).
#[derive(Default)]
struct DatabaseCache {
    by_path: HashMap<String, Database>,
}

impl DatabaseCache {
    async fn open(&mut self, path: &str) -> Result<Database, DatabaseError> {
        if let Some(db) = self.by_path.get(path) {
            return Ok(db.clone());
        }
        let db = Database::open(path).await?;
        self.by_path.insert(path.to_string(), db.clone());
        Ok(db)
    }
}

impl Services {
    /// Build every subsystem from the given configuration.
    pub async fn from_config(config: &TallyConfig) -> Result<Self, CompositionError> {
        let mut databases = DatabaseCache::default();

        let queue: Arc<dyn JobQueue> = match config.queue.backend {
            QueueBackend::Sqlite => {
                let db = databases.open(&config.queue.database_path).await?;
                Arc::new(SqliteJobQueue::new(db, &config.queue))
            }
            QueueBackend::Memory => Arc::new(InMemoryJobQueue::new(
                std::time::Duration::from_secs(config.queue.message_lease_seconds),
                std::time::Duration::from_secs(config.queue.receive_max_wait_seconds),
            )),
        };

        let (store, feed): (Arc<dyn JobMetadataStore>, Arc<dyn JobMetadataChangeFeed>) =
            match config.metadata.backend {
                MetadataBackend::Sqlite => {
                    let db = databases.open(&config.metadata.database_path).await?;
                    (
                        Arc::new(SqliteJobMetadataStore::new(db.clone(), &config.metadata)),
                        Arc::new(SqliteJobMetadataChangeFeed::new(db)),
                    )
                }
                MetadataBackend::Memory => {
                    let store = Arc::new(InMemoryJobMetadataStore::new(
                        config.metadata.retention_days,
                    ));
                    (
                        store.clone(),
                        Arc::new(InMemoryJobMetadataChangeFeed::new(store)),
                    )
                }
            };

        let create_job_task: Arc<dyn CreateJobTask> = match config.frontend.creation_strategy {
            CreationStrategy::InsertOnly => Arc::new(InsertOnlyCreateJobTask::new(
                store.clone(),
                default_validators(),
            )),
            CreationStrategy::EnqueueFirst => Arc::new(EnqueueFirstCreateJobTask::new(
                store.clone(),
                queue.clone(),
                default_validators(),
            )),
        };

        let reconciler = ReconcileRunner::new(
            feed,
            vec![Box::new(MarkJobFailedToEnqueueHandler::new(store.clone()))],
        );

        let job_client: Arc<dyn JobClient> = Arc::new(WorkerJobClient::new(
            queue.clone(),
            store.clone(),
            &config.client,
        ));

        info!(
            queue_backend = ?config.queue.backend,
            metadata_backend = ?config.metadata.backend,
            creation_strategy = ?config.frontend.creation_strategy,
            "services wired"
        );

        Ok(Self {
            queue,
            get_job_task: GetJobTask::new(store.clone()),
            store,
            create_job_task,
            reconciler,
            job_client,
        })
    }
}
