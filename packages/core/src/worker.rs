//! Process-scoped identity of a running worker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who is processing a queue. Lives only as long as the worker process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerIdentity {
    pub pid: u32,
    /// Queue this worker is bound to.
    pub queue: String,
    /// Operating system user the process runs as.
    pub user: String,
    pub created_at: DateTime<Utc>,
}

impl WorkerIdentity {
    pub fn new(
        pid: u32,
        queue: impl Into<String>,
        user: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            pid,
            queue: queue.into(),
            user: user.into(),
            created_at,
        }
    }

    /// Identity of the current process bound to `queue`.
    pub fn current(queue: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self::new(std::process::id(), queue, current_user(), created_at)
    }

    /// Log prefix, `[WORKER PID: <pid>][<queue>]`.
    pub fn tag(&self) -> String {
        format!("[WORKER PID: {}][{}]", self.pid, self.queue)
    }

    /// Short form stored on the job records this worker claims.
    pub fn claim_tag(&self) -> String {
        format!("{}@{}:{}", self.user, self.pid, self.queue)
    }
}

fn current_user() -> String {
    ["USER", "USERNAME"]
        .iter()
        .find_map(|key| std::env::var(key).ok().filter(|v| !v.is_empty()))
        .unwrap_or_else(|| "unknown".to_string())
}
