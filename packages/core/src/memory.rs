//! In-process store for tests and single-process deployments.

use std::collections::{BTreeSet, HashMap, VecDeque};

use tokio::sync::Mutex;

use crate::store::{JobStore, QueueStore, StoreError, StoreFuture};
use crate::{JobDescriptor, JobId, JobRecord};

#[derive(Debug, Default)]
struct MemoryState {
    /// Pending job ids per queue, oldest first.
    pending: HashMap<String, VecDeque<JobId>>,
    /// All jobs by ID for quick lookup.
    jobs: HashMap<JobId, JobRecord>,
}

/// Queue and job store held in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    /// Create a store that knows the given queues.
    pub fn new<I, S>(queues: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let pending = queues
            .into_iter()
            .map(|q| (q.into(), VecDeque::new()))
            .collect();
        Self {
            state: Mutex::new(MemoryState {
                pending,
                jobs: HashMap::new(),
            }),
        }
    }

    /// Put an existing record on its queue, whatever its status.
    ///
    /// Models a redelivery: the record is handed out again by `dequeue`.
    pub async fn push_record(&self, record: JobRecord) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let queue = state
            .pending
            .get_mut(&record.queue)
            .ok_or_else(|| StoreError::UnknownQueue(record.queue.clone()))?;
        queue.push_back(record.id);
        state.jobs.insert(record.id, record);
        Ok(())
    }

    /// Number of jobs still waiting on `queue`.
    pub async fn pending_len(&self, queue: &str) -> usize {
        let state = self.state.lock().await;
        state.pending.get(queue).map_or(0, VecDeque::len)
    }

    /// Snapshot of every stored record, in creation order.
    pub async fn records(&self) -> Vec<JobRecord> {
        let state = self.state.lock().await;
        let mut records: Vec<JobRecord> = state.jobs.values().cloned().collect();
        records.sort_by_key(|r| r.id);
        records
    }
}

impl QueueStore for MemoryStore {
    fn list_queues(&self) -> StoreFuture<'_, BTreeSet<String>> {
        Box::pin(async move {
            let state = self.state.lock().await;
            Ok(state.pending.keys().cloned().collect())
        })
    }

    fn enqueue(&self, descriptor: JobDescriptor) -> StoreFuture<'_, JobId> {
        Box::pin(async move {
            let record = JobRecord::new(descriptor);
            let id = record.id;
            self.push_record(record).await?;
            Ok(id)
        })
    }

    fn dequeue<'a>(&'a self, queue: &'a str) -> StoreFuture<'a, Option<JobRecord>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            loop {
                let next = state
                    .pending
                    .get_mut(queue)
                    .ok_or_else(|| StoreError::UnknownQueue(queue.to_string()))?
                    .pop_front();
                let Some(id) = next else {
                    return Ok(None);
                };
                if let Some(record) = state.jobs.get(&id) {
                    return Ok(Some(record.clone()));
                }
            }
        })
    }
}

impl JobStore for MemoryStore {
    fn create<'a>(&'a self, record: &'a JobRecord) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            if state.jobs.contains_key(&record.id) {
                return Err(StoreError::Duplicate(record.id));
            }
            state.jobs.insert(record.id, record.clone());
            Ok(())
        })
    }

    fn get(&self, id: JobId) -> StoreFuture<'_, Option<JobRecord>> {
        Box::pin(async move {
            let state = self.state.lock().await;
            Ok(state.jobs.get(&id).cloned())
        })
    }

    fn update<'a>(&'a self, record: &'a JobRecord) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            match state.jobs.get_mut(&record.id) {
                Some(stored) => {
                    *stored = record.clone();
                    Ok(true)
                }
                None => Ok(false),
            }
        })
    }
}
