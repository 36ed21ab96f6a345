mod common;

use queue_core::{JobDescriptor, JobRecord, JobStatus, Queue};
use std::error::Error;

use db::{DbError, repositories::JobFilter, repositories::JobRepository, repositories::QueueRepository};

#[test]
fn queue_repository_round_trip() -> Result<(), Box<dyn Error>> {
    common::run(async {
        let _guard = common::setup_db().await?;

        let created = QueueRepository::ensure(&Queue::new("email").with_description("outgoing mail")).await?;
        assert_eq!(created.name, "email");
        assert_eq!(created.description.as_deref(), Some("outgoing mail"));

        // A second ensure keeps the original definition.
        let again = QueueRepository::ensure(&Queue::new("email")).await?;
        assert_eq!(again.description.as_deref(), Some("outgoing mail"));

        QueueRepository::ensure(&Queue::new("cache")).await?;
        let names: Vec<String> = QueueRepository::list().await?.into_iter().map(|q| q.name).collect();
        assert_eq!(names, vec!["cache".to_string(), "email".to_string()]);

        assert!(QueueRepository::exists("cache").await?);
        assert!(!QueueRepository::exists("missing").await?);
        assert!(matches!(QueueRepository::get("missing").await, Err(DbError::NotFound(_))));

        QueueRepository::delete("cache").await?;
        assert!(!QueueRepository::exists("cache").await?);

        Ok::<(), Box<dyn Error>>(())
    })
}

#[test]
fn queue_entries_pop_in_fifo_order() -> Result<(), Box<dyn Error>> {
    common::run(async {
        let _guard = common::setup_db().await?;
        QueueRepository::ensure(&Queue::new("default")).await?;
        QueueRepository::ensure(&Queue::new("prio")).await?;

        let first = JobRecord::new(JobDescriptor::new("default", "echo"));
        let second = JobRecord::new(JobDescriptor::new("default", "echo"));
        let other = JobRecord::new(JobDescriptor::new("prio", "echo"));
        QueueRepository::push("default", first.id).await?;
        QueueRepository::push("prio", other.id).await?;
        QueueRepository::push("default", second.id).await?;

        assert_eq!(QueueRepository::pending_count("default").await?, 2);
        assert_eq!(QueueRepository::pop("default").await?, Some(first.id));
        assert_eq!(QueueRepository::pop("default").await?, Some(second.id));
        assert_eq!(QueueRepository::pop("default").await?, None);
        assert_eq!(QueueRepository::pending_count("default").await?, 0);

        assert_eq!(QueueRepository::pop("prio").await?, Some(other.id));

        Ok::<(), Box<dyn Error>>(())
    })
}

#[test]
fn released_entry_goes_back_to_the_head() -> Result<(), Box<dyn Error>> {
    common::run(async {
        let _guard = common::setup_db().await?;
        QueueRepository::ensure(&Queue::new("default")).await?;

        let first = JobRecord::new(JobDescriptor::new("default", "echo"));
        let second = JobRecord::new(JobDescriptor::new("default", "echo"));
        QueueRepository::push("default", first.id).await?;
        QueueRepository::push("default", second.id).await?;

        let claimed = QueueRepository::claim("default").await?.ok_or("expected an entry")?;
        assert_eq!(claimed.job_id, first.id);
        assert_eq!(claimed.queue, "default");
        assert_eq!(QueueRepository::pending_count("default").await?, 1);

        QueueRepository::release(&claimed).await?;
        assert_eq!(QueueRepository::pending_count("default").await?, 2);

        let again = QueueRepository::claim("default").await?.ok_or("expected an entry")?;
        assert_eq!(again, claimed);
        assert_eq!(QueueRepository::pop("default").await?, Some(second.id));

        Ok::<(), Box<dyn Error>>(())
    })
}

#[test]
fn job_repository_round_trip() -> Result<(), Box<dyn Error>> {
    common::run(async {
        let _guard = common::setup_db().await?;

        let mut job = JobRecord::new(
            JobDescriptor::new("default", "cake")
                .with_args(["Server", "fetchFeed", "1", "2"])
                .with_metadata("user_id", "1"),
        );
        let created = JobRepository::create(&job).await?;
        assert_eq!(created.id, job.id);
        assert_eq!(created.args, job.args);
        assert_eq!(created.metadata.get("user_id").map(String::as_str), Some("1"));

        job.start("www-data@1:default")?;
        let running = JobRepository::update(&job).await?;
        assert_eq!(running.status, JobStatus::Running);
        assert_eq!(running.worker.as_deref(), Some("www-data@1:default"));

        job.fail(Some(1), Some("partial".into()), Some("boom".into()))?;
        JobRepository::update(&job).await?;

        let loaded = JobRepository::get(job.id).await?;
        assert_eq!(loaded.status, JobStatus::Failed);
        assert_eq!(loaded.return_code, Some(1));
        assert_eq!(loaded.output.as_deref(), Some("partial"));
        assert_eq!(loaded.error.as_deref(), Some("boom"));
        assert!(loaded.finished_at.is_some());

        // Updating an unknown record never creates it.
        let stray = JobRecord::new(JobDescriptor::new("default", "echo"));
        assert!(matches!(JobRepository::update(&stray).await, Err(DbError::NotFound(_))));
        assert!(matches!(JobRepository::get(stray.id).await, Err(DbError::NotFound(_))));

        Ok::<(), Box<dyn Error>>(())
    })
}

#[test]
fn job_listing_and_stats() -> Result<(), Box<dyn Error>> {
    common::run(async {
        let _guard = common::setup_db().await?;

        let pending = JobRecord::new(JobDescriptor::new("default", "echo"));
        JobRepository::create(&pending).await?;

        let mut done = JobRecord::new(JobDescriptor::new("default", "echo"));
        done.start("w")?;
        done.complete(0, Some("hello".into()), None)?;
        JobRepository::create(&done).await?;

        let mut failed = JobRecord::new(JobDescriptor::new("default", "false"));
        failed.start("w")?;
        failed.fail(Some(1), None, None)?;
        JobRepository::create(&failed).await?;

        let elsewhere = JobRecord::new(JobDescriptor::new("email", "echo"));
        JobRepository::create(&elsewhere).await?;

        let all_default = JobRepository::list(JobFilter {
            queue: Some("default".into()),
            ..Default::default()
        })
        .await?;
        assert_eq!(all_default.len(), 3);
        assert_eq!(all_default[0].id, pending.id);

        let completed = JobRepository::list(JobFilter {
            status: Some(JobStatus::Completed),
            ..Default::default()
        })
        .await?;
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].id, done.id);

        let limited = JobRepository::list(JobFilter {
            limit: Some(2),
            ..Default::default()
        })
        .await?;
        assert_eq!(limited.len(), 2);

        let stats = JobRepository::get_queue_stats("default").await?;
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.running, 0);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.success_rate(), Some(50.0));

        Ok::<(), Box<dyn Error>>(())
    })
}
