//! # Queue Store Contract
//!
//! The narrow boundary the pipeline requires from a durable, at-least-once
//! message broker: enqueue with payload/priority/retry policy, dequeue the
//! next visible job, ack on success, re-queue with backoff on failure, and a
//! dead-letter shelf that is inspectable rather than a void.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use super::job::Job;

/// Errors surfaced by queue store implementations
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue backend unavailable: {0}")]
    Unavailable(String),

    #[error("job {job_id} is not in flight")]
    NotInFlight { job_id: Uuid },

    #[error("malformed job row: {0}")]
    Malformed(String),
}

/// A job that exhausted its retry budget (or failed terminally), held for
/// operator inspection instead of being retried or discarded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetteredJob {
    pub job: Job,
    pub reason: String,
    pub dead_lettered_at: DateTime<Utc>,
}

/// Persistent, at-least-once job store partitioned into named queues.
///
/// Implementations own a job from `enqueue` until `ack`, `retry`, or
/// `dead_letter`. Dequeued jobs are invisible to other workers until one of
/// those calls resolves them (or a visibility lease expires, for stores that
/// lease).
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Add a job to its queue. Independent per call: no transaction spans
    /// queues.
    async fn enqueue(&self, job: Job) -> Result<Uuid, QueueError>;

    /// Take the next visible job off a queue, highest priority first.
    /// Returns `None` when the queue has no visible jobs.
    async fn dequeue(&self, queue: &str) -> Result<Option<Job>, QueueError>;

    /// Acknowledge (remove) a successfully handled job.
    async fn ack(&self, job: &Job) -> Result<(), QueueError>;

    /// Return a failed job to its queue, visible again after `delay`.
    /// The job's `attempts` field has already been incremented by the caller.
    async fn retry(&self, job: Job, delay: Duration) -> Result<(), QueueError>;

    /// Move a job to the dead-letter shelf. Never drops it.
    async fn dead_letter(&self, job: Job, reason: &str) -> Result<(), QueueError>;

    /// Jobs currently held on a queue's dead-letter shelf.
    async fn dead_lettered(&self, queue: &str) -> Result<Vec<DeadLetteredJob>, QueueError>;

    /// Number of visible + delayed jobs waiting on a queue.
    async fn depth(&self, queue: &str) -> Result<usize, QueueError>;
}
