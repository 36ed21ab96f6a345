//! Storage seams consumed by the worker.
//!
//! Two implementations exist: [`crate::MemoryStore`] here and the
//! SurrealDB-backed store in the `db` package.

use std::collections::BTreeSet;

use futures_util::future::BoxFuture;
use thiserror::Error;

use crate::{JobDescriptor, JobId, JobRecord};

/// Future type returned by store operations.
pub type StoreFuture<'a, T> = BoxFuture<'a, Result<T, StoreError>>;

/// Errors reported by a store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Unknown queue: {0}")]
    UnknownQueue(String),
    #[error("Job already exists: {0}")]
    Duplicate(JobId),
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Named FIFO queues of pending jobs.
pub trait QueueStore: Send + Sync + 'static {
    /// Names of all queues workers may bind to.
    fn list_queues(&self) -> StoreFuture<'_, BTreeSet<String>>;

    /// Persist a `New` record for the descriptor and append it to its queue.
    fn enqueue(&self, descriptor: JobDescriptor) -> StoreFuture<'_, JobId>;

    /// Atomically claim the oldest pending job of `queue`, if any.
    ///
    /// Never blocks waiting for work. A job is handed to at most one caller.
    fn dequeue<'a>(&'a self, queue: &'a str) -> StoreFuture<'a, Option<JobRecord>>;
}

/// Persistence of job records.
pub trait JobStore: Send + Sync + 'static {
    fn create<'a>(&'a self, record: &'a JobRecord) -> StoreFuture<'a, ()>;

    fn get(&self, id: JobId) -> StoreFuture<'_, Option<JobRecord>>;

    /// Overwrite the stored record. Returns `false` when no record has that id.
    fn update<'a>(&'a self, record: &'a JobRecord) -> StoreFuture<'a, bool>;
}
