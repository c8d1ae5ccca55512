//! # Queue Runtime Contract
//!
//! The job structure, retry policy, and the store boundary the worker pools
//! run against. The store is deliberately narrow: the pipeline only needs
//! "enqueue with payload, priority, and retry policy" and "dequeue, ack on
//! success, re-queue with backoff on failure, dead-letter on exhaustion".

pub mod job;
pub mod memory;
pub mod pg;
pub mod store;

pub use job::{BackoffPolicy, Job, JobPayload, Priority};
pub use memory::InMemoryQueueStore;
pub use pg::PgQueueStore;
pub use store::{DeadLetteredJob, QueueError, QueueStore};
