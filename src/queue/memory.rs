//! # In-Memory Queue Store
//!
//! In-process `QueueStore` with the same observable semantics as the
//! Postgres store: priority ordering, delayed visibility for retries, an
//! in-flight set, and a dead-letter shelf. Used by tests and local
//! development runs that don't want a database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::time::Duration;
use uuid::Uuid;

use super::job::Job;
use super::store::{DeadLetteredJob, QueueError, QueueStore};

#[derive(Debug)]
struct QueueState {
    /// Jobs waiting to be dequeued, with their visibility timestamps
    ready: Vec<(DateTime<Utc>, Job)>,
    /// Dequeued but not yet resolved
    in_flight: Vec<Job>,
    dead: Vec<DeadLetteredJob>,
}

impl QueueState {
    fn new() -> Self {
        Self {
            ready: Vec::new(),
            in_flight: Vec::new(),
            dead: Vec::new(),
        }
    }
}

/// In-memory queue store, one state cell per named queue
#[derive(Debug, Default)]
pub struct InMemoryQueueStore {
    queues: DashMap<String, Mutex<QueueState>>,
}

impl InMemoryQueueStore {
    pub fn new() -> Self {
        Self {
            queues: DashMap::new(),
        }
    }

    fn with_queue<T>(&self, queue: &str, f: impl FnOnce(&mut QueueState) -> T) -> T {
        let cell = self
            .queues
            .entry(queue.to_string())
            .or_insert_with(|| Mutex::new(QueueState::new()));
        let mut state = cell.lock();
        f(&mut state)
    }
}

#[async_trait]
impl QueueStore for InMemoryQueueStore {
    async fn enqueue(&self, job: Job) -> Result<Uuid, QueueError> {
        let job_id = job.job_id;
        self.with_queue(&job.queue.clone(), |state| {
            state.ready.push((Utc::now(), job));
        });
        Ok(job_id)
    }

    async fn dequeue(&self, queue: &str) -> Result<Option<Job>, QueueError> {
        Ok(self.with_queue(queue, |state| {
            let now = Utc::now();
            // Highest priority first, then oldest enqueue time
            let candidate = state
                .ready
                .iter()
                .enumerate()
                .filter(|(_, (visible_at, _))| *visible_at <= now)
                .max_by(|(_, (va, a)), (_, (vb, b))| {
                    a.priority
                        .cmp(&b.priority)
                        .then_with(|| vb.cmp(va))
                        .then_with(|| b.enqueued_at.cmp(&a.enqueued_at))
                })
                .map(|(idx, _)| idx);

            candidate.map(|idx| {
                let (_, job) = state.ready.remove(idx);
                state.in_flight.push(job.clone());
                job
            })
        }))
    }

    async fn ack(&self, job: &Job) -> Result<(), QueueError> {
        self.with_queue(&job.queue, |state| {
            let before = state.in_flight.len();
            state.in_flight.retain(|j| j.job_id != job.job_id);
            if state.in_flight.len() == before {
                Err(QueueError::NotInFlight { job_id: job.job_id })
            } else {
                Ok(())
            }
        })
    }

    async fn retry(&self, job: Job, delay: Duration) -> Result<(), QueueError> {
        self.with_queue(&job.queue.clone(), |state| {
            state.in_flight.retain(|j| j.job_id != job.job_id);
            let visible_at = Utc::now()
                + chrono::Duration::from_std(delay)
                    .unwrap_or_else(|_| chrono::Duration::seconds(0));
            state.ready.push((visible_at, job));
        });
        Ok(())
    }

    async fn dead_letter(&self, job: Job, reason: &str) -> Result<(), QueueError> {
        self.with_queue(&job.queue.clone(), |state| {
            state.in_flight.retain(|j| j.job_id != job.job_id);
            state.dead.push(DeadLetteredJob {
                job,
                reason: reason.to_string(),
                dead_lettered_at: Utc::now(),
            });
        });
        Ok(())
    }

    async fn dead_lettered(&self, queue: &str) -> Result<Vec<DeadLetteredJob>, QueueError> {
        Ok(self.with_queue(queue, |state| state.dead.clone()))
    }

    async fn depth(&self, queue: &str) -> Result<usize, QueueError> {
        Ok(self.with_queue(queue, |state| state.ready.len()))
    }
}
