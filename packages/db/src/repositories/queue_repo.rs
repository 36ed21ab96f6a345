//! Queue repository: queue definitions and pending deliveries.

use chrono::{DateTime, Utc};
use queue_core::{JobId, Queue, next_ulid};
use serde::{Deserialize, Serialize};

use crate::{DbError, get_db};

/// Number of candidate entries read per claim attempt.
const CLAIM_BATCH: i64 = 8;

/// Repository for queue persistence operations.
pub struct QueueRepository;

/// Row shape for the `queue` table, keyed by queue name.
#[derive(Debug, Serialize, Deserialize)]
struct QueueRow {
    name: String,
    description: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<QueueRow> for Queue {
    fn from(row: QueueRow) -> Self {
        Queue {
            name: row.name,
            description: row.description,
            created_at: row.created_at,
        }
    }
}

/// Row shape for the `queue_entry` table, keyed by `seq`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct QueueEntryRow {
    seq: String,
    queue: String,
    job_id: JobId,
}

/// A delivery removed from its queue by [`QueueRepository::claim`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedEntry {
    pub seq: String,
    pub queue: String,
    pub job_id: JobId,
}

impl From<QueueEntryRow> for ClaimedEntry {
    fn from(row: QueueEntryRow) -> Self {
        Self {
            seq: row.seq,
            queue: row.queue,
            job_id: row.job_id,
        }
    }
}

impl QueueRepository {
    /// Create the queue unless one with the same name exists.
    ///
    /// Returns the stored queue either way.
    pub async fn ensure(queue: &Queue) -> Result<Queue, DbError> {
        let db = get_db()?;

        let existing: Option<QueueRow> = db.select(("queue", queue.name.clone())).await?;
        if let Some(row) = existing {
            return Ok(row.into());
        }

        let row = QueueRow {
            name: queue.name.clone(),
            description: queue.description.clone(),
            created_at: queue.created_at,
        };
        let record: Option<QueueRow> = db
            .create(("queue", queue.name.clone()))
            .content(row)
            .await?;

        tracing::debug!("Registered queue '{}'", queue.name);

        record
            .map(Queue::from)
            .ok_or_else(|| DbError::Query(format!("Failed to create queue {}", queue.name)))
    }

    /// Get a queue by name.
    pub async fn get(name: &str) -> Result<Queue, DbError> {
        let db = get_db()?;

        let record: Option<QueueRow> = db.select(("queue", name.to_string())).await?;

        record
            .map(Queue::from)
            .ok_or_else(|| DbError::NotFound(format!("Queue not found: {}", name)))
    }

    /// List all queues, by name.
    pub async fn list() -> Result<Vec<Queue>, DbError> {
        let db = get_db()?;

        let mut result = db.query("SELECT * FROM queue ORDER BY name ASC").await?;
        let records: Vec<QueueRow> = result.take(0)?;

        Ok(records.into_iter().map(Queue::from).collect())
    }

    /// Check if a queue name exists.
    pub async fn exists(name: &str) -> Result<bool, DbError> {
        let db = get_db()?;

        let record: Option<QueueRow> = db.select(("queue", name.to_string())).await?;

        Ok(record.is_some())
    }

    /// Delete a queue and its pending deliveries. Job records are kept.
    pub async fn delete(name: &str) -> Result<(), DbError> {
        let db = get_db()?;

        db.query("DELETE queue_entry WHERE queue = $queue")
            .bind(("queue", name.to_string()))
            .await?
            .check()?;
        let _: Option<QueueRow> = db.delete(("queue", name.to_string())).await?;

        Ok(())
    }

    /// Append a job to the tail of a queue.
    pub async fn push(queue: &str, job_id: JobId) -> Result<(), DbError> {
        let db = get_db()?;

        let seq = next_ulid().to_string();
        let row = QueueEntryRow {
            seq: seq.clone(),
            queue: queue.to_string(),
            job_id,
        };
        let _: Option<QueueEntryRow> = db.create(("queue_entry", seq)).content(row).await?;

        Ok(())
    }

    /// Claim the oldest pending job of a queue.
    pub async fn pop(queue: &str) -> Result<Option<JobId>, DbError> {
        Ok(Self::claim(queue).await?.map(|entry| entry.job_id))
    }

    /// Claim the oldest pending entry of a queue.
    ///
    /// Deleting the entry is the claim: the record delete returns the row
    /// only to the caller that actually removed it, so two workers racing
    /// for the same entry cannot both win. Losers move on to the next
    /// candidate.
    pub async fn claim(queue: &str) -> Result<Option<ClaimedEntry>, DbError> {
        let db = get_db()?;

        loop {
            let mut result = db
                .query("SELECT * FROM queue_entry WHERE queue = $queue ORDER BY seq ASC LIMIT $limit")
                .bind(("queue", queue.to_string()))
                .bind(("limit", CLAIM_BATCH))
                .await?;
            let candidates: Vec<QueueEntryRow> = result.take(0)?;

            if candidates.is_empty() {
                return Ok(None);
            }

            for candidate in candidates {
                let removed: Option<QueueEntryRow> =
                    db.delete(("queue_entry", candidate.seq)).await?;
                if let Some(entry) = removed {
                    return Ok(Some(entry.into()));
                }
            }
        }
    }

    /// Undo a claim. The entry goes back under its original sequence, so
    /// it keeps its place at the head of the queue.
    pub async fn release(entry: &ClaimedEntry) -> Result<(), DbError> {
        let db = get_db()?;

        let row = QueueEntryRow {
            seq: entry.seq.clone(),
            queue: entry.queue.clone(),
            job_id: entry.job_id,
        };
        let _: Option<QueueEntryRow> = db
            .create(("queue_entry", entry.seq.clone()))
            .content(row)
            .await?;

        Ok(())
    }

    /// Number of pending deliveries on a queue.
    pub async fn pending_count(queue: &str) -> Result<u64, DbError> {
        let db = get_db()?;

        let mut result = db
            .query("SELECT count() AS count FROM queue_entry WHERE queue = $queue GROUP ALL")
            .bind(("queue", queue.to_string()))
            .await?;

        #[derive(Deserialize)]
        struct CountResult {
            count: i64,
        }

        let counts: Vec<CountResult> = result.take(0)?;

        Ok(counts.first().map_or(0, |c| c.count.max(0) as u64))
    }
}
