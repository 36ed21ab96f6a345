//! Worker actor: polls one queue until its execution budget runs out.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use queue_core::{
    Clock, JobEvent, JobStatus, JobStore, QueueStore, StoreError, SystemClock, WorkerExit,
    WorkerIdentity,
};
use ractor::concurrency::JoinHandle;
use ractor::{Actor, ActorProcessingErr, ActorRef};
use tokio::sync::{broadcast, oneshot};

use crate::executor::JobExecutor;
use crate::messages::WorkerMessage;
use crate::runnable::RunnableRegistry;

/// A worker exits after this long unless configured otherwise.
pub const DEFAULT_MAX_EXECUTION_TIME: Duration = Duration::from_secs(86_400);

/// What a worker does and for how long.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Queue the worker is bound to.
    pub queue: String,
    /// Wall-clock budget. Zero disables self-termination.
    pub max_execution_time: Duration,
    /// Pause after an empty poll. Zero polls again immediately.
    pub idle_delay: Duration,
}

impl WorkerConfig {
    pub fn new(queue: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            max_execution_time: DEFAULT_MAX_EXECUTION_TIME,
            idle_delay: Duration::ZERO,
        }
    }

    pub fn with_max_execution_time(mut self, max: Duration) -> Self {
        self.max_execution_time = max;
        self
    }

    pub fn with_idle_delay(mut self, delay: Duration) -> Self {
        self.idle_delay = delay;
        self
    }
}

/// Collaborators injected into a worker.
#[derive(Clone)]
pub struct WorkerDeps {
    pub queues: Arc<dyn QueueStore>,
    pub jobs: Arc<dyn JobStore>,
    pub runnables: Arc<RunnableRegistry>,
    pub clock: Arc<dyn Clock>,
    pub event_tx: Option<broadcast::Sender<JobEvent>>,
}

impl WorkerDeps {
    /// Use `store` for both the queue and the job records, with the system clock.
    pub fn new<S>(store: Arc<S>, runnables: Arc<RunnableRegistry>) -> Self
    where
        S: QueueStore + JobStore,
    {
        Self {
            queues: store.clone(),
            jobs: store,
            runnables,
            clock: Arc::new(SystemClock),
            event_tx: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Set the event broadcaster.
    pub fn with_event_tx(mut self, tx: broadcast::Sender<JobEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }
}

/// Errors that keep a worker from running.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("queue `{0}` does not exist")]
    UnknownQueue(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("failed to spawn worker: {0}")]
    Spawn(String),

    #[error("worker stopped without reporting why")]
    Crashed,
}

/// Whether a worker started at `started` has used up `max` by `now`.
///
/// A zero budget never runs out.
pub fn budget_exhausted(started: DateTime<Utc>, now: DateTime<Utc>, max: Duration) -> bool {
    if max.is_zero() {
        return false;
    }
    match TimeDelta::from_std(max) {
        Ok(max) => now - started > max,
        Err(_) => false,
    }
}

/// State for the worker actor.
pub struct WorkerActorState {
    pub identity: WorkerIdentity,
    pub config: WorkerConfig,
    queues: Arc<dyn QueueStore>,
    clock: Arc<dyn Clock>,
    executor: JobExecutor,
    event_tx: Option<broadcast::Sender<JobEvent>>,
    /// Set once the worker decides to stop.
    exit: Option<WorkerExit>,
    exit_tx: Option<oneshot::Sender<WorkerExit>>,
    /// Jobs handed to the executor so far.
    pub processed: u64,
}

impl WorkerActorState {
    fn broadcast(&self, event: JobEvent) {
        if let Some(ref tx) = self.event_tx {
            let _ = tx.send(event);
        }
    }

    fn stop(&mut self, myself: &ActorRef<WorkerMessage>, exit: WorkerExit) {
        self.exit = Some(exit);
        myself.stop(None);
    }

    /// Schedule the next poll after `delay`.
    fn poll_after(&self, myself: &ActorRef<WorkerMessage>, delay: Duration) {
        if delay.is_zero() {
            let _ = myself.send_message(WorkerMessage::Poll);
            return;
        }
        let myself = myself.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // The worker may have stopped in the meantime.
            let _ = myself.send_message(WorkerMessage::Poll);
        });
    }
}

/// Worker actor arguments.
pub struct WorkerArgs {
    pub config: WorkerConfig,
    pub deps: WorkerDeps,
    pub exit_tx: oneshot::Sender<WorkerExit>,
}

/// Worker actor that drains one queue, one job at a time.
pub struct WorkerActor;

impl Actor for WorkerActor {
    type Msg = WorkerMessage;
    type State = WorkerActorState;
    type Arguments = WorkerArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        let WorkerArgs {
            config,
            deps,
            exit_tx,
        } = args;

        let identity = WorkerIdentity::current(config.queue.clone(), deps.clock.now());
        tracing::info!("{} - starting to process background jobs...", identity.tag());

        let mut executor = JobExecutor::new(deps.runnables, deps.jobs, identity.claim_tag());
        if let Some(tx) = deps.event_tx.clone() {
            executor = executor.with_event_tx(tx);
        }

        let state = WorkerActorState {
            identity,
            config,
            queues: deps.queues,
            clock: deps.clock,
            executor,
            event_tx: deps.event_tx,
            exit: None,
            exit_tx: Some(exit_tx),
            processed: 0,
        };
        state.broadcast(JobEvent::WorkerStarted {
            pid: state.identity.pid,
            queue: state.config.queue.clone(),
            timestamp: Utc::now(),
        });

        myself.send_message(WorkerMessage::Poll)?;
        Ok(state)
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            WorkerMessage::Shutdown => {
                tracing::info!("{} - shutting down worker...", state.identity.tag());
                state.stop(&myself, WorkerExit::Shutdown);
            }

            WorkerMessage::Poll => {
                if state.exit.is_some() {
                    return Ok(());
                }

                if budget_exhausted(
                    state.identity.created_at,
                    state.clock.now(),
                    state.config.max_execution_time,
                ) {
                    tracing::info!(
                        "{} - worker max execution time reached, exiting gracefully worker...",
                        state.identity.tag()
                    );
                    state.stop(&myself, WorkerExit::MaxExecutionTimeReached);
                    return Ok(());
                }

                let record = match state.queues.dequeue(&state.config.queue).await {
                    Ok(Some(record)) => record,
                    Ok(None) => {
                        state.poll_after(&myself, state.config.idle_delay);
                        return Ok(());
                    }
                    Err(e) => {
                        tracing::error!(
                            "{} - failed to dequeue: {}",
                            state.identity.tag(),
                            e
                        );
                        state.poll_after(&myself, state.config.idle_delay);
                        return Ok(());
                    }
                };

                if record.queue != state.config.queue || record.status != JobStatus::New {
                    tracing::warn!(
                        "{} - [JOB ID: {}] - skipped, status {} on queue {}",
                        state.identity.tag(),
                        record.id,
                        record.status,
                        record.queue
                    );
                    state.broadcast(JobEvent::JobSkipped {
                        job_id: record.id,
                        queue: record.queue.clone(),
                        status: record.status,
                        timestamp: Utc::now(),
                    });
                } else {
                    let mut record = record;
                    tracing::info!(
                        "{} - launching job with ID: {}",
                        state.identity.tag(),
                        record.id
                    );
                    state.executor.execute(&mut record).await;
                    state.processed += 1;
                }

                myself.send_message(WorkerMessage::Poll)?;
            }
        }

        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        let reason = state.exit.unwrap_or(WorkerExit::Shutdown);
        tracing::info!(
            "{} - stopped after {} job(s): {}",
            state.identity.tag(),
            state.processed,
            reason
        );
        state.broadcast(JobEvent::WorkerStopped {
            pid: state.identity.pid,
            queue: state.config.queue.clone(),
            reason,
            timestamp: Utc::now(),
        });
        if let Some(tx) = state.exit_tx.take() {
            let _ = tx.send(reason);
        }
        Ok(())
    }
}

/// Handle to a running worker.
pub struct RunningWorker {
    actor: ActorRef<WorkerMessage>,
    join: JoinHandle<()>,
    exit: oneshot::Receiver<WorkerExit>,
}

impl RunningWorker {
    pub fn actor(&self) -> &ActorRef<WorkerMessage> {
        &self.actor
    }

    /// Ask the worker to stop after its current job.
    pub fn shutdown(&self) {
        if let Err(e) = self.actor.send_message(WorkerMessage::Shutdown) {
            tracing::debug!("worker already stopped: {}", e);
        }
    }

    /// Wait for the worker to stop and report why it did.
    pub async fn wait(self) -> Result<WorkerExit, WorkerError> {
        self.join
            .await
            .map_err(|e| WorkerError::Spawn(e.to_string()))?;
        self.exit.await.map_err(|_| WorkerError::Crashed)
    }
}

/// Validate the queue and start a worker actor on it.
pub async fn spawn_worker(
    config: WorkerConfig,
    deps: WorkerDeps,
) -> Result<RunningWorker, WorkerError> {
    let known = deps.queues.list_queues().await.map_err(|e| {
        tracing::error!("failed to list queues: {}", e);
        WorkerError::Store(e)
    })?;
    if !known.contains(&config.queue) {
        tracing::error!(
            "queue `{}` does not exist, known queues: {:?}",
            config.queue,
            known
        );
        return Err(WorkerError::UnknownQueue(config.queue));
    }

    let (exit_tx, exit) = oneshot::channel();
    let args = WorkerArgs {
        config,
        deps,
        exit_tx,
    };
    let (actor, join) = Actor::spawn(None, WorkerActor, args)
        .await
        .map_err(|e| WorkerError::Spawn(e.to_string()))?;

    Ok(RunningWorker { actor, join, exit })
}

/// Run a worker to completion.
pub async fn run_worker(config: WorkerConfig, deps: WorkerDeps) -> Result<WorkerExit, WorkerError> {
    spawn_worker(config, deps).await?.wait().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_is_strictly_exceeded() {
        let t0 = Utc::now();
        let max = Duration::from_secs(10);
        assert!(!budget_exhausted(t0, t0, max));
        assert!(!budget_exhausted(t0, t0 + TimeDelta::seconds(10), max));
        assert!(budget_exhausted(t0, t0 + TimeDelta::seconds(11), max));
    }

    #[test]
    fn zero_budget_never_runs_out() {
        let t0 = Utc::now();
        assert!(!budget_exhausted(t0, t0 + TimeDelta::days(365), Duration::ZERO));
    }
}
