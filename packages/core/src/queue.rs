//! Queue names and per-queue counters.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::JobStatus;

/// Queues every deployment knows about unless configured otherwise.
pub const DEFAULT_QUEUES: [&str; 5] = ["default", "prio", "email", "cache", "update"];

/// A named channel of pending jobs. Workers bind to exactly one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Queue {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Queue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Queue names are non-empty and limited to ASCII letters, digits, `_`, `-` and `.`.
    pub fn is_valid_name(name: &str) -> bool {
        !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    }
}

/// Number of jobs per status in one queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueStats {
    /// Jobs still `new`.
    pub pending: u64,
    pub running: u64,
    pub completed: u64,
    pub failed: u64,
}

impl QueueStats {
    /// Fold per-status counts. Missing statuses count as zero.
    pub fn from_counts(counts: &BTreeMap<JobStatus, u64>) -> Self {
        let count = |status| counts.get(&status).copied().unwrap_or(0);
        Self {
            pending: count(JobStatus::New),
            running: count(JobStatus::Running),
            completed: count(JobStatus::Completed),
            failed: count(JobStatus::Failed),
        }
    }

    /// Jobs that reached a terminal status.
    pub fn processed(&self) -> u64 {
        self.completed + self.failed
    }

    /// Percentage of processed jobs that completed, if any were processed.
    pub fn success_rate(&self) -> Option<f64> {
        match self.processed() {
            0 => None,
            total => Some(self.completed as f64 * 100.0 / total as f64),
        }
    }
}
