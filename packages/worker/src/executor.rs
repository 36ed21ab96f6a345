//! Job executor: claim, run, classify, persist.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures_util::FutureExt;
use queue_core::{JobEvent, JobRecord, JobStatus, JobStore};
use tokio::sync::broadcast;

use crate::runnable::{RunOutcome, RunnableRegistry};

/// How hard to try before giving up on persisting a job record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistPolicy {
    /// Total update attempts, including the first one.
    pub attempts: u32,
    /// Delay before the second attempt; doubled for each further one.
    pub initial_backoff: Duration,
}

impl Default for PersistPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_backoff: Duration::from_millis(100),
        }
    }
}

/// Runs claimed jobs for one worker.
pub struct JobExecutor {
    runnables: Arc<RunnableRegistry>,
    jobs: Arc<dyn JobStore>,
    worker_tag: String,
    persist_policy: PersistPolicy,
    event_tx: Option<broadcast::Sender<JobEvent>>,
}

impl JobExecutor {
    pub fn new(
        runnables: Arc<RunnableRegistry>,
        jobs: Arc<dyn JobStore>,
        worker_tag: impl Into<String>,
    ) -> Self {
        Self {
            runnables,
            jobs,
            worker_tag: worker_tag.into(),
            persist_policy: PersistPolicy::default(),
            event_tx: None,
        }
    }

    /// Set the retry policy for job record updates.
    pub fn with_persist_policy(mut self, policy: PersistPolicy) -> Self {
        self.persist_policy = policy;
        self
    }

    /// Set the event broadcaster.
    pub fn with_event_tx(mut self, tx: broadcast::Sender<JobEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Execute one job. Every outcome ends up in `record`.
    ///
    /// The record is persisted once when it turns `running` and once more
    /// with its final state, whichever way the command ended.
    pub async fn execute(&self, record: &mut JobRecord) {
        if let Err(e) = record.start(self.worker_tag.clone()) {
            tracing::error!("[JOB ID: {}] - not started: {}", record.id, e);
            return;
        }
        self.persist(record).await;

        let command_line = record.command_line();
        tracing::info!("[JOB ID: {}] - started command `{}`.", record.id, command_line);
        self.broadcast(JobEvent::JobStarted {
            job_id: record.id,
            queue: record.queue.clone(),
            command_line,
            timestamp: Utc::now(),
        });

        let start = Instant::now();
        let outcome = self.invoke(record).await;
        let elapsed = start.elapsed();
        let duration = format!("{:.3}", elapsed.as_secs_f64());

        let transition = match outcome {
            RunOutcome::Exited {
                return_code: Some(0),
                output,
                error,
            } => record.complete(0, non_empty(output), non_empty(error)),
            RunOutcome::Exited {
                return_code,
                output,
                error,
            } => record.fail(return_code, non_empty(output), non_empty(error)),
            RunOutcome::Raised { error, output } => {
                record.fail(None, output.and_then(non_empty), Some(error))
            }
        };
        if let Err(e) = transition {
            tracing::error!("[JOB ID: {}] - {}", record.id, e);
        }

        if record.status == JobStatus::Completed {
            tracing::info!(
                "[JOB ID: {}] - successfully completed in {} seconds.",
                record.id,
                duration
            );
            self.broadcast(JobEvent::JobCompleted {
                job_id: record.id,
                queue: record.queue.clone(),
                duration_ms: elapsed.as_millis().try_into().unwrap_or(u64::MAX),
                timestamp: Utc::now(),
            });
        } else {
            tracing::error!(
                "[JOB ID: {}] - failed with error code {} after {} seconds. STDERR: {}. STDOUT: {}.",
                record.id,
                record
                    .return_code
                    .map_or_else(|| "none".to_string(), |c| c.to_string()),
                duration,
                record.error.as_deref().unwrap_or_default(),
                record.output.as_deref().unwrap_or_default()
            );
            self.broadcast(JobEvent::JobFailed {
                job_id: record.id,
                queue: record.queue.clone(),
                return_code: record.return_code,
                error: record.error.clone(),
                timestamp: Utc::now(),
            });
        }

        self.persist(record).await;
    }

    /// Resolve and run the record's command. Panics inside the runnable are
    /// reported as raised errors.
    async fn invoke(&self, record: &JobRecord) -> RunOutcome {
        let Some(runnable) = self.runnables.get(&record.command) else {
            return RunOutcome::raised(format!(
                "No runnable registered for command: {}",
                record.command
            ));
        };

        // `run` itself may panic before handing back a future, so the call
        // goes inside the guarded block too.
        match AssertUnwindSafe(async { runnable.run(&record.args).await })
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                RunOutcome::raised(format!("command panicked: {}", message))
            }
        }
    }

    /// Write the record, retrying with backoff. Returns whether it was stored.
    ///
    /// When every attempt fails, or the store no longer knows the record,
    /// the full record goes to the `dead_letter` log target.
    pub async fn persist(&self, record: &JobRecord) -> bool {
        let attempts = self.persist_policy.attempts.max(1);
        let mut backoff = self.persist_policy.initial_backoff;
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.jobs.update(record).await {
                Ok(true) => return true,
                Ok(false) => {
                    dead_letter(record, "job record not found");
                    return false;
                }
                Err(e) => {
                    tracing::warn!(
                        "[JOB ID: {}] - update attempt {}/{} failed: {}",
                        record.id,
                        attempt,
                        attempts,
                        e
                    );
                    last_error = e.to_string();
                    if attempt < attempts {
                        tokio::time::sleep(backoff).await;
                        backoff = backoff.saturating_mul(2);
                    }
                }
            }
        }

        dead_letter(record, &last_error);
        false
    }

    fn broadcast(&self, event: JobEvent) {
        if let Some(ref tx) = self.event_tx {
            let _ = tx.send(event);
        }
    }
}

fn dead_letter(record: &JobRecord, reason: &str) {
    let snapshot = serde_json::to_string(record)
        .unwrap_or_else(|e| format!("<unserializable record: {}>", e));
    tracing::error!(
        target: "dead_letter",
        "[JOB ID: {}] - could not persist status {} ({}): {}",
        record.id,
        record.status,
        reason,
        snapshot
    );
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() { None } else { Some(s) }
}
