//! SurrealDB-backed implementation of the worker's storage seams.

use std::collections::BTreeSet;

use queue_core::{
    JobDescriptor, JobId, JobRecord, JobStore, Queue, QueueStore, StoreError, StoreFuture,
};

use crate::DbError;
use crate::repositories::{JobRepository, QueueRepository};

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        StoreError::Backend(err.to_string())
    }
}

/// Queue and job store over the shared database connection.
///
/// The connection must be initialized with [`crate::init`] first.
#[derive(Debug, Default, Clone, Copy)]
pub struct SurrealStore;

impl SurrealStore {
    pub fn new() -> Self {
        Self
    }

    /// Make sure every named queue exists.
    pub async fn register_queues<I, S>(&self, names: I) -> Result<(), DbError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            QueueRepository::ensure(&Queue::new(name)).await?;
        }
        Ok(())
    }
}

impl QueueStore for SurrealStore {
    fn list_queues(&self) -> StoreFuture<'_, BTreeSet<String>> {
        Box::pin(async move {
            let queues = QueueRepository::list().await?;
            Ok(queues.into_iter().map(|q| q.name).collect())
        })
    }

    fn enqueue(&self, descriptor: JobDescriptor) -> StoreFuture<'_, JobId> {
        Box::pin(async move {
            if !QueueRepository::exists(&descriptor.queue).await? {
                return Err(StoreError::UnknownQueue(descriptor.queue));
            }

            let record = JobRecord::new(descriptor);
            JobRepository::create(&record).await?;
            if let Err(e) = QueueRepository::push(&record.queue, record.id).await {
                tracing::error!(
                    "[JOB ID: {}] - created but could not be queued on {}: {}",
                    record.id,
                    record.queue,
                    e
                );
                return Err(e.into());
            }

            tracing::debug!("[JOB ID: {}] - enqueued on {}", record.id, record.queue);
            Ok(record.id)
        })
    }

    fn dequeue<'a>(&'a self, queue: &'a str) -> StoreFuture<'a, Option<JobRecord>> {
        Box::pin(async move {
            loop {
                let Some(entry) = QueueRepository::claim(queue).await? else {
                    return Ok(None);
                };
                match JobRepository::get(entry.job_id).await {
                    Ok(record) => return Ok(Some(record)),
                    Err(DbError::NotFound(_)) => {
                        tracing::warn!(
                            "[JOB ID: {}] - queued on {} but no job record exists, dropping entry",
                            entry.job_id,
                            queue
                        );
                    }
                    Err(e) => {
                        // The job is still deliverable: put it back before reporting.
                        if let Err(release_err) = QueueRepository::release(&entry).await {
                            tracing::error!(
                                "[JOB ID: {}] - could not be read ({}) nor returned to {}: {}",
                                entry.job_id,
                                e,
                                queue,
                                release_err
                            );
                        }
                        return Err(e.into());
                    }
                }
            }
        })
    }
}

impl JobStore for SurrealStore {
    fn create<'a>(&'a self, record: &'a JobRecord) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            JobRepository::create(record).await?;
            Ok(())
        })
    }

    fn get(&self, id: JobId) -> StoreFuture<'_, Option<JobRecord>> {
        Box::pin(async move {
            match JobRepository::get(id).await {
                Ok(record) => Ok(Some(record)),
                Err(DbError::NotFound(_)) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
    }

    fn update<'a>(&'a self, record: &'a JobRecord) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            match JobRepository::update(record).await {
                Ok(_) => Ok(true),
                Err(DbError::NotFound(_)) => Ok(false),
                Err(e) => Err(e.into()),
            }
        })
    }
}
