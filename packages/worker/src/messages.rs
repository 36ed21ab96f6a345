//! Message types for the worker actor.

/// Messages for the WorkerActor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerMessage {
    /// Run one loop iteration: check the budget, then try to take a job.
    Poll,

    /// Stop once the job in flight, if any, has finished.
    Shutdown,
}
