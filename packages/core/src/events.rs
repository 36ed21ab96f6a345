//! Event types for observing workers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{JobId, JobStatus};

/// Why a worker stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerExit {
    /// The execution-time budget elapsed.
    MaxExecutionTimeReached,
    /// The worker was asked to stop.
    Shutdown,
}

impl std::fmt::Display for WorkerExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerExit::MaxExecutionTimeReached => write!(f, "max execution time reached"),
            WorkerExit::Shutdown => write!(f, "shutdown requested"),
        }
    }
}

/// Events emitted by a worker while it processes its queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    /// A worker bound to a queue and started polling.
    WorkerStarted {
        pid: u32,
        queue: String,
        timestamp: DateTime<Utc>,
    },
    /// A job was claimed and its command is about to run.
    JobStarted {
        job_id: JobId,
        queue: String,
        command_line: String,
        timestamp: DateTime<Utc>,
    },
    /// A job completed successfully.
    JobCompleted {
        job_id: JobId,
        queue: String,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    /// A job failed.
    JobFailed {
        job_id: JobId,
        queue: String,
        return_code: Option<i32>,
        error: Option<String>,
        timestamp: DateTime<Utc>,
    },
    /// A dequeued record was not claimable and was left untouched.
    JobSkipped {
        job_id: JobId,
        queue: String,
        status: JobStatus,
        timestamp: DateTime<Utc>,
    },
    /// A worker stopped polling.
    WorkerStopped {
        pid: u32,
        queue: String,
        reason: WorkerExit,
        timestamp: DateTime<Utc>,
    },
}

impl JobEvent {
    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            JobEvent::WorkerStarted { timestamp, .. } => *timestamp,
            JobEvent::JobStarted { timestamp, .. } => *timestamp,
            JobEvent::JobCompleted { timestamp, .. } => *timestamp,
            JobEvent::JobFailed { timestamp, .. } => *timestamp,
            JobEvent::JobSkipped { timestamp, .. } => *timestamp,
            JobEvent::WorkerStopped { timestamp, .. } => *timestamp,
        }
    }

    /// Get the queue this event belongs to.
    pub fn queue(&self) -> &str {
        match self {
            JobEvent::WorkerStarted { queue, .. } => queue,
            JobEvent::JobStarted { queue, .. } => queue,
            JobEvent::JobCompleted { queue, .. } => queue,
            JobEvent::JobFailed { queue, .. } => queue,
            JobEvent::JobSkipped { queue, .. } => queue,
            JobEvent::WorkerStopped { queue, .. } => queue,
        }
    }

    /// Get the job ID associated with this event, if any.
    pub fn job_id(&self) -> Option<JobId> {
        match self {
            JobEvent::JobStarted { job_id, .. } => Some(*job_id),
            JobEvent::JobCompleted { job_id, .. } => Some(*job_id),
            JobEvent::JobFailed { job_id, .. } => Some(*job_id),
            JobEvent::JobSkipped { job_id, .. } => Some(*job_id),
            _ => None,
        }
    }

    /// Get a short description of this event for logging.
    pub fn description(&self) -> String {
        match self {
            JobEvent::WorkerStarted { pid, queue, .. } => {
                format!("Worker {} started on {}", pid, queue)
            }
            JobEvent::JobStarted {
                job_id,
                command_line,
                ..
            } => format!("Job {} started `{}`", job_id, command_line),
            JobEvent::JobCompleted {
                job_id,
                duration_ms,
                ..
            } => format!("Job {} completed in {}ms", job_id, duration_ms),
            JobEvent::JobFailed {
                job_id,
                return_code,
                error,
                ..
            } => {
                let code = return_code.map_or_else(|| "none".to_string(), |c| c.to_string());
                let error = error.as_deref().unwrap_or("no error output");
                format!("Job {} failed (code {}): {}", job_id, code, error)
            }
            JobEvent::JobSkipped { job_id, status, .. } => {
                format!("Job {} skipped, already {}", job_id, status)
            }
            JobEvent::WorkerStopped { pid, reason, .. } => {
                format!("Worker {} stopped: {}", pid, reason)
            }
        }
    }
}
