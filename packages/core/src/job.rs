//! Job domain types: the immutable descriptor and the mutable record.

use std::collections::BTreeMap;
use std::sync::{LazyLock, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ulid::{Generator, Ulid};

static ULIDS: LazyLock<Mutex<Generator>> = LazyLock::new(|| Mutex::new(Generator::new()));

/// A ULID strictly greater than every other one handed out by this process.
///
/// Plain `Ulid::new()` is random within a millisecond, which would break
/// ordering by id for jobs created back to back.
pub fn next_ulid() -> Ulid {
    let mut generator = ULIDS.lock().unwrap_or_else(|e| e.into_inner());
    generator.generate().unwrap_or_else(|_| Ulid::new())
}

/// Unique identifier for a job, using ULID for chronological sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Ulid);

impl JobId {
    /// Create a new unique job ID.
    pub fn new() -> Self {
        Self(next_ulid())
    }

    /// Parse a job ID from a string.
    pub fn parse(s: &str) -> Result<Self, ulid::DecodeError> {
        Ok(Self(Ulid::from_string(s)?))
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Current status of a job in its lifecycle.
///
/// The only legal path is `New -> Running -> {Completed | Failed}`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job is waiting in its queue.
    #[default]
    New,
    /// Job has been claimed by a worker and its command is executing.
    Running,
    /// Command returned a success exit code.
    Completed,
    /// Command returned a non-success exit code or could not be run.
    Failed,
}

impl JobStatus {
    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Get a simple status string for display.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::New => "new",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Parse the string form produced by [`JobStatus::as_str`].
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "new" => Some(JobStatus::New),
            "running" => Some(JobStatus::Running),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected status change on a [`JobRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("job {job_id}: illegal transition {from} -> {to}")]
pub struct TransitionError {
    pub job_id: JobId,
    pub from: JobStatus,
    pub to: JobStatus,
}

/// Immutable description of a unit of work, as handed to `enqueue`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDescriptor {
    /// Name of the runnable to invoke.
    pub command: String,
    /// Ordered arguments passed to the runnable.
    #[serde(default)]
    pub args: Vec<String>,
    /// Target queue name.
    pub queue: String,
    /// Free-form context, e.g. the user who triggered the job.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl JobDescriptor {
    pub fn new(queue: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            queue: queue.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// Set the arguments for this job.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Persisted status and result of one unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Unique identifier for this job.
    pub id: JobId,
    /// Queue the job was enqueued on.
    pub queue: String,
    /// Runnable name, copied from the descriptor.
    pub command: String,
    /// Arguments, copied from the descriptor.
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
    /// Current status.
    pub status: JobStatus,
    /// Exit status of the command. Unset when the invocation itself failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_code: Option<i32>,
    /// Captured standard output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Captured standard error, or the description of the invocation error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Tag of the worker that claimed the job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker: Option<String>,
    /// When the job was created.
    pub created_at: DateTime<Utc>,
    /// When the job was last updated.
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// Create a new record in the `New` state from a descriptor.
    pub fn new(descriptor: JobDescriptor) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            queue: descriptor.queue,
            command: descriptor.command,
            args: descriptor.args,
            metadata: descriptor.metadata,
            status: JobStatus::New,
            return_code: None,
            output: None,
            error: None,
            worker: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            finished_at: None,
        }
    }

    /// The full invocation, command followed by its arguments.
    pub fn command_line(&self) -> String {
        std::iter::once(self.command.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Claim the job for a worker: `New -> Running`.
    pub fn start(&mut self, worker: impl Into<String>) -> Result<(), TransitionError> {
        self.transition(JobStatus::New, JobStatus::Running)?;
        let now = Utc::now();
        self.worker = Some(worker.into());
        self.started_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Record a normal completion with a success exit code: `Running -> Completed`.
    pub fn complete(
        &mut self,
        return_code: i32,
        output: Option<String>,
        error: Option<String>,
    ) -> Result<(), TransitionError> {
        self.transition(JobStatus::Running, JobStatus::Completed)?;
        self.return_code = Some(return_code);
        self.output = output;
        self.error = error;
        self.finish();
        Ok(())
    }

    /// Record a failure: `Running -> Failed`.
    ///
    /// `return_code` is `None` when the command never produced an exit status.
    pub fn fail(
        &mut self,
        return_code: Option<i32>,
        output: Option<String>,
        error: Option<String>,
    ) -> Result<(), TransitionError> {
        self.transition(JobStatus::Running, JobStatus::Failed)?;
        self.return_code = return_code;
        self.output = output;
        self.error = error;
        self.finish();
        Ok(())
    }

    fn transition(&mut self, from: JobStatus, to: JobStatus) -> Result<(), TransitionError> {
        if self.status != from {
            return Err(TransitionError {
                job_id: self.id,
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    fn finish(&mut self) {
        let now = Utc::now();
        self.finished_at = Some(now);
        self.updated_at = now;
    }
}
