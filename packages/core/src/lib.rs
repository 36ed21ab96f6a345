//! Core domain types for the background job worker.
//!
//! This crate contains shared types used across all packages:
//! - JobDescriptor, JobRecord and JobStatus for work items
//! - WorkerIdentity and JobEvent for observability
//! - QueueStore and JobStore, the storage seams, with an in-memory store
//! - Clock, so execution budgets can be driven by tests

mod clock;
mod events;
mod job;
mod memory;
mod queue;
mod store;
mod worker;

pub use clock::{Clock, ManualClock, SystemClock};
pub use events::{JobEvent, WorkerExit};
pub use job::{JobDescriptor, JobId, JobRecord, JobStatus, TransitionError, next_ulid};
pub use memory::MemoryStore;
pub use queue::{DEFAULT_QUEUES, Queue, QueueStats};
pub use store::{JobStore, QueueStore, StoreError, StoreFuture};
pub use worker::WorkerIdentity;
