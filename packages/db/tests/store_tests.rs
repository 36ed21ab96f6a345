mod common;

use std::error::Error;

use db::SurrealStore;
use db::repositories::QueueRepository;
use queue_core::{JobDescriptor, JobRecord, JobStatus, JobStore, QueueStore, StoreError};

#[test]
fn enqueue_then_dequeue() -> Result<(), Box<dyn Error>> {
    common::run(async {
        let _guard = common::setup_db().await?;
        let store = SurrealStore::new();
        store.register_queues(["default", "email"]).await?;

        let queues = store.list_queues().await?;
        assert!(queues.contains("default"));
        assert!(queues.contains("email"));

        let id = store
            .enqueue(JobDescriptor::new("default", "echo").with_args(["hello"]))
            .await?;

        let stored = store.get(id).await?.ok_or("job record missing")?;
        assert_eq!(stored.status, JobStatus::New);

        // Nothing leaks across queues.
        assert!(store.dequeue("email").await?.is_none());

        let claimed = store.dequeue("default").await?.ok_or("expected a job")?;
        assert_eq!(claimed.id, id);
        assert_eq!(claimed.args, vec!["hello".to_string()]);
        assert!(store.dequeue("default").await?.is_none());

        Ok::<(), Box<dyn Error>>(())
    })
}

#[test]
fn enqueue_to_unknown_queue_fails() -> Result<(), Box<dyn Error>> {
    common::run(async {
        let _guard = common::setup_db().await?;
        let store = SurrealStore::new();
        store.register_queues(["default"]).await?;

        let err = store
            .enqueue(JobDescriptor::new("nope", "echo"))
            .await
            .err()
            .ok_or("enqueue should fail")?;
        assert!(matches!(err, StoreError::UnknownQueue(q) if q == "nope"));

        Ok::<(), Box<dyn Error>>(())
    })
}

#[test]
fn update_reports_missing_records() -> Result<(), Box<dyn Error>> {
    common::run(async {
        let _guard = common::setup_db().await?;
        let store = SurrealStore::new();
        store.register_queues(["default"]).await?;

        let id = store.enqueue(JobDescriptor::new("default", "echo")).await?;
        let mut record = store.dequeue("default").await?.ok_or("expected a job")?;
        assert_eq!(record.id, id);

        record.start("tester")?;
        assert!(store.update(&record).await?);
        let visible = store.get(id).await?.ok_or("job record missing")?;
        assert_eq!(visible.status, JobStatus::Running);

        let stray = JobRecord::new(JobDescriptor::new("default", "echo"));
        assert!(!store.update(&stray).await?);
        assert!(store.get(stray.id).await?.is_none());

        Ok::<(), Box<dyn Error>>(())
    })
}

#[test]
fn concurrent_dequeues_claim_each_job_once() -> Result<(), Box<dyn Error>> {
    common::run(async {
        let _guard = common::setup_db().await?;
        let store = SurrealStore::new();
        store.register_queues(["default"]).await?;

        let mut ids = Vec::new();
        for i in 0..10 {
            ids.push(
                store
                    .enqueue(JobDescriptor::new("default", "echo").with_args([i.to_string()]))
                    .await?,
            );
        }

        let mut tasks = Vec::new();
        for _ in 0..4 {
            tasks.push(tokio::spawn(async move {
                let store = SurrealStore::new();
                let mut claimed = Vec::new();
                // Transaction conflicts surface as errors; a worker just polls again.
                for _ in 0..50 {
                    match store.dequeue("default").await {
                        Ok(Some(record)) => claimed.push(record.id),
                        Ok(None) => break,
                        Err(_) => continue,
                    }
                }
                claimed
            }));
        }

        let mut claimed = Vec::new();
        for task in tasks {
            claimed.extend(task.await?);
        }
        claimed.sort();
        ids.sort();
        assert_eq!(claimed, ids);

        Ok::<(), Box<dyn Error>>(())
    })
}

#[test]
fn unreadable_job_stays_queued() -> Result<(), Box<dyn Error>> {
    common::run(async {
        let _guard = common::setup_db().await?;
        let store = SurrealStore::new();
        store.register_queues(["default"]).await?;

        let id = store.enqueue(JobDescriptor::new("default", "echo")).await?;
        let db = db::get_db()?;
        let set_status = "UPDATE type::thing('job', $id) SET status = $status";

        // A status no worker understands makes the record unreadable.
        db.query(set_status)
            .bind(("id", id.to_string()))
            .bind(("status", "bogus"))
            .await?
            .check()?;

        assert!(store.dequeue("default").await.is_err());
        assert_eq!(QueueRepository::pending_count("default").await?, 1);

        db.query(set_status)
            .bind(("id", id.to_string()))
            .bind(("status", "new"))
            .await?
            .check()?;

        let claimed = store.dequeue("default").await?.ok_or("job was lost")?;
        assert_eq!(claimed.id, id);
        assert_eq!(claimed.status, JobStatus::New);
        assert_eq!(QueueRepository::pending_count("default").await?, 0);

        Ok::<(), Box<dyn Error>>(())
    })
}
