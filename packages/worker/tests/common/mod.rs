#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{DateTime, TimeDelta, Utc};
use queue_core::{JobId, JobRecord, JobStore, ManualClock, StoreError, StoreFuture};
use worker::{FnRunnable, RunFuture, RunOutcome, RunnableRegistry};

/// Runnable that echoes its arguments, joined by spaces, and succeeds.
pub fn echo_runnable() -> FnRunnable<impl Fn(&[String]) -> RunFuture + Send + Sync + 'static> {
    FnRunnable::new("echo", |args: &[String]| {
        let line = format!("{}\n", args.join(" "));
        Box::pin(async move { RunOutcome::exited(0, line, "") })
    })
}

/// Runnable that counts its invocations.
pub fn counting_runnable(
    command: &str,
    calls: Arc<AtomicU32>,
) -> FnRunnable<impl Fn(&[String]) -> RunFuture + Send + Sync + 'static> {
    FnRunnable::new(command, move |_args: &[String]| {
        calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async { RunOutcome::exited(0, "", "") })
    })
}

pub fn registry_with_echo() -> Arc<RunnableRegistry> {
    let mut registry = RunnableRegistry::new();
    registry.register(echo_runnable());
    Arc::new(registry)
}

pub fn t0() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// A clock that moves one second forward on every reading.
pub fn ticking_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::with_step(t0(), TimeDelta::seconds(1)))
}

/// Job store whose updates fail a fixed number of times before succeeding.
#[derive(Debug, Default)]
pub struct FlakyJobStore {
    failures_left: AtomicU32,
    pub update_calls: AtomicU32,
}

impl FlakyJobStore {
    pub fn failing(times: u32) -> Self {
        Self {
            failures_left: AtomicU32::new(times),
            update_calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.update_calls.load(Ordering::SeqCst)
    }
}

impl JobStore for FlakyJobStore {
    fn create<'a>(&'a self, _record: &'a JobRecord) -> StoreFuture<'a, ()> {
        Box::pin(async { Ok(()) })
    }

    fn get(&self, _id: JobId) -> StoreFuture<'_, Option<JobRecord>> {
        Box::pin(async { Ok(None) })
    }

    fn update<'a>(&'a self, _record: &'a JobRecord) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            self.update_calls.fetch_add(1, Ordering::SeqCst);
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(StoreError::Backend("connection reset".into()));
            }
            Ok(true)
        })
    }
}

/// Log output captured from a test subscriber.
#[derive(Clone, Default)]
pub struct CapturedLogs {
    logs: Arc<std::sync::Mutex<Vec<u8>>>,
}

impl CapturedLogs {
    pub fn contents(&self) -> String {
        let logs = self.logs.lock().unwrap();
        String::from_utf8_lossy(&logs).to_string()
    }
}

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.logs.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Run `f` on a fresh current-thread runtime with every log line captured.
pub fn with_tracing<F, Fut>(f: F) -> (String, Fut::Output)
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future,
{
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_writer(logs.clone())
        .with_ansi(false)
        .without_time()
        .finish();

    let result = tracing::subscriber::with_default(subscriber, || {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(f())
    });

    (logs.contents(), result)
}
