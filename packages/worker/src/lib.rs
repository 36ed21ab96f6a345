//! Background job worker.
//!
//! A worker binds to one named queue, takes jobs from it one at a time,
//! runs each job's command through the [`RunnableRegistry`] and records the
//! outcome on the job record. It stops by itself once its execution budget
//! is used up.
//!
//! # Architecture
//!
//! - `WorkerActor` - Ractor actor driving the poll loop
//! - `JobExecutor` - Claims, runs, classifies and persists a single job
//! - `RunnableRegistry` - Maps command names to what runs them
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use queue_core::MemoryStore;
//! use worker::{RunnableRegistry, ProcessRunnable, WorkerConfig, WorkerDeps, run_worker};
//!
//! let mut runnables = RunnableRegistry::new();
//! runnables.register(ProcessRunnable::new("echo", "echo"));
//!
//! let store = Arc::new(MemoryStore::new(["default"]));
//! let deps = WorkerDeps::new(store, Arc::new(runnables));
//! let exit = run_worker(WorkerConfig::new("default"), deps).await?;
//! ```

mod executor;
mod messages;
mod process;
mod runnable;
mod worker_actor;

pub use executor::{JobExecutor, PersistPolicy};
pub use messages::WorkerMessage;
pub use process::ProcessRunnable;
pub use runnable::{FnRunnable, RunFuture, RunOutcome, Runnable, RunnableRegistry};
pub use worker_actor::{
    DEFAULT_MAX_EXECUTION_TIME, RunningWorker, WorkerActor, WorkerConfig, WorkerDeps, WorkerError,
    budget_exhausted, run_worker, spawn_worker,
};

/// Re-export ractor types for convenience.
pub use ractor::{Actor, ActorRef};
