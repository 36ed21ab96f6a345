//! Job record repository for CRUD operations.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use queue_core::{JobId, JobRecord, JobStatus, QueueStats};
use serde::{Deserialize, Serialize};

use crate::{DbError, get_db};

/// Repository for job record persistence operations.
pub struct JobRepository;

/// Row shape stored in SurrealDB. The record key is the job id; it is
/// repeated in `job_id` so rows deserialize without touching the record id.
#[derive(Debug, Serialize, Deserialize)]
struct JobRow {
    job_id: JobId,
    queue: String,
    command: String,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
    status: JobStatus,
    return_code: Option<i32>,
    output: Option<String>,
    error: Option<String>,
    worker: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl From<&JobRecord> for JobRow {
    fn from(job: &JobRecord) -> Self {
        Self {
            job_id: job.id,
            queue: job.queue.clone(),
            command: job.command.clone(),
            args: job.args.clone(),
            metadata: job.metadata.clone(),
            status: job.status,
            return_code: job.return_code,
            output: job.output.clone(),
            error: job.error.clone(),
            worker: job.worker.clone(),
            created_at: job.created_at,
            updated_at: job.updated_at,
            started_at: job.started_at,
            finished_at: job.finished_at,
        }
    }
}

impl From<JobRow> for JobRecord {
    fn from(row: JobRow) -> Self {
        Self {
            id: row.job_id,
            queue: row.queue,
            command: row.command,
            args: row.args,
            metadata: row.metadata,
            status: row.status,
            return_code: row.return_code,
            output: row.output,
            error: row.error,
            worker: row.worker,
            created_at: row.created_at,
            updated_at: row.updated_at,
            started_at: row.started_at,
            finished_at: row.finished_at,
        }
    }
}

/// Filter options for listing jobs.
#[derive(Debug, Default, Clone)]
pub struct JobFilter {
    pub queue: Option<String>,
    pub status: Option<JobStatus>,
    pub limit: Option<usize>,
}

impl JobRepository {
    /// Create a new job record in the database.
    pub async fn create(job: &JobRecord) -> Result<JobRecord, DbError> {
        let db = get_db()?;

        let record: Option<JobRow> = db
            .create(("job", job.id.to_string()))
            .content(JobRow::from(job))
            .await?;

        record
            .map(JobRecord::from)
            .ok_or_else(|| DbError::Query("Failed to create job".into()))
    }

    /// Get a job record by ID.
    pub async fn get(id: JobId) -> Result<JobRecord, DbError> {
        let db = get_db()?;

        let record: Option<JobRow> = db.select(("job", id.to_string())).await?;

        record
            .map(JobRecord::from)
            .ok_or_else(|| DbError::NotFound(format!("Job not found: {}", id)))
    }

    /// Replace a stored job record.
    ///
    /// Never creates a record: a missing id yields `DbError::NotFound`.
    pub async fn update(job: &JobRecord) -> Result<JobRecord, DbError> {
        let db = get_db()?;

        let record: Option<JobRow> = db
            .update(("job", job.id.to_string()))
            .content(JobRow::from(job))
            .await?;

        record
            .map(JobRecord::from)
            .ok_or_else(|| DbError::NotFound(format!("Job not found: {}", job.id)))
    }

    /// List jobs with optional filtering, oldest first.
    pub async fn list(filter: JobFilter) -> Result<Vec<JobRecord>, DbError> {
        let db = get_db()?;

        let mut conditions = Vec::new();
        if filter.queue.is_some() {
            conditions.push("queue = $queue");
        }
        if filter.status.is_some() {
            conditions.push("status = $status");
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let limit_clause = filter
            .limit
            .map(|l| format!("LIMIT {}", l))
            .unwrap_or_default();

        let query = format!(
            "SELECT * FROM job {} ORDER BY job_id ASC {}",
            where_clause, limit_clause
        );

        let mut result = db.query(&query);
        if let Some(queue) = filter.queue {
            result = result.bind(("queue", queue));
        }
        if let Some(status) = filter.status {
            result = result.bind(("status", status.as_str()));
        }

        let mut response = result.await?;
        let records: Vec<JobRow> = response.take(0)?;

        Ok(records.into_iter().map(JobRecord::from).collect())
    }

    /// Count jobs by status for a queue.
    pub async fn count_by_status(queue: &str) -> Result<BTreeMap<JobStatus, u64>, DbError> {
        let db = get_db()?;

        let mut result = db
            .query(
                r#"
                SELECT status, count() AS count
                FROM job
                WHERE queue = $queue
                GROUP BY status
                "#,
            )
            .bind(("queue", queue.to_string()))
            .await?;

        #[derive(Deserialize)]
        struct StatusCount {
            status: String,
            count: i64,
        }

        let counts: Vec<StatusCount> = result.take(0)?;

        let mut map = BTreeMap::new();
        for count in counts {
            match JobStatus::parse(&count.status) {
                Some(status) => {
                    map.insert(status, count.count.max(0) as u64);
                }
                None => tracing::warn!("Ignoring unknown job status '{}'", count.status),
            }
        }

        Ok(map)
    }

    /// Get queue statistics from job counts.
    pub async fn get_queue_stats(queue: &str) -> Result<QueueStats, DbError> {
        let counts = Self::count_by_status(queue).await?;
        Ok(QueueStats::from_counts(&counts))
    }
}
