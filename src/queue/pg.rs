//! # Postgres Queue Store
//!
//! Durable `QueueStore` over two tables:
//!
//! - `pipeline_jobs`: visible and in-flight jobs, ordered by priority then
//!   enqueue time, claimed with `FOR UPDATE SKIP LOCKED` so concurrent
//!   workers never double-claim;
//! - `pipeline_jobs_archive`: the dead-letter shelf, append-only.
//!
//! A dequeued job is leased by pushing its `visible_at` into the future; a
//! worker that dies mid-job loses the lease and the job resurfaces, which is
//! the at-least-once delivery the handlers are built for.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::time::Duration;
use uuid::Uuid;

use super::job::{BackoffPolicy, Job, JobPayload, Priority};
use super::store::{DeadLetteredJob, QueueError, QueueStore};

/// Visibility lease granted to a dequeued job before it must be resolved
const IN_FLIGHT_LEASE_SECONDS: i64 = 300;

/// Postgres-backed queue store
#[derive(Debug, Clone)]
pub struct PgQueueStore {
    pool: PgPool,
}

impl PgQueueStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn job_from_row(row: &PgRow) -> Result<Job, QueueError> {
        let payload: serde_json::Value = row
            .try_get("payload")
            .map_err(|e| QueueError::Malformed(e.to_string()))?;
        let payload: JobPayload = serde_json::from_value(payload)
            .map_err(|e| QueueError::Malformed(format!("payload: {e}")))?;
        let priority: serde_json::Value = row
            .try_get("priority")
            .map_err(|e| QueueError::Malformed(e.to_string()))?;
        let priority: Priority = serde_json::from_value(priority)
            .map_err(|e| QueueError::Malformed(format!("priority: {e}")))?;
        let backoff: serde_json::Value = row
            .try_get("backoff")
            .map_err(|e| QueueError::Malformed(e.to_string()))?;
        let backoff: BackoffPolicy = serde_json::from_value(backoff)
            .map_err(|e| QueueError::Malformed(format!("backoff: {e}")))?;

        let read = |name: &str| -> Result<String, QueueError> {
            row.try_get::<String, _>(name)
                .map_err(|e| QueueError::Malformed(e.to_string()))
        };

        Ok(Job {
            job_id: row
                .try_get("job_id")
                .map_err(|e| QueueError::Malformed(e.to_string()))?,
            queue: read("queue")?,
            job_type: read("job_type")?,
            payload,
            priority,
            attempts: row
                .try_get::<i32, _>("attempts")
                .map_err(|e| QueueError::Malformed(e.to_string()))? as u32,
            max_attempts: row
                .try_get::<i32, _>("max_attempts")
                .map_err(|e| QueueError::Malformed(e.to_string()))? as u32,
            backoff,
            enqueued_at: row
                .try_get("enqueued_at")
                .map_err(|e| QueueError::Malformed(e.to_string()))?,
            dedupe_key: row
                .try_get("dedupe_key")
                .map_err(|e| QueueError::Malformed(e.to_string()))?,
        })
    }

    fn priority_rank(priority: Priority) -> i32 {
        match priority {
            Priority::Low => 0,
            Priority::Normal => 1,
            Priority::High => 2,
            Priority::Critical => 3,
        }
    }
}

#[async_trait]
impl QueueStore for PgQueueStore {
    async fn enqueue(&self, job: Job) -> Result<Uuid, QueueError> {
        let payload = serde_json::to_value(&job.payload)
            .map_err(|e| QueueError::Malformed(e.to_string()))?;
        let priority = serde_json::to_value(job.priority)
            .map_err(|e| QueueError::Malformed(e.to_string()))?;
        let backoff = serde_json::to_value(job.backoff)
            .map_err(|e| QueueError::Malformed(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO pipeline_jobs (
                job_id, queue, job_type, payload, priority, priority_rank,
                attempts, max_attempts, backoff, enqueued_at, visible_at, dedupe_key
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10, $11)
            "#,
        )
        .bind(job.job_id)
        .bind(&job.queue)
        .bind(&job.job_type)
        .bind(payload)
        .bind(priority)
        .bind(Self::priority_rank(job.priority))
        .bind(job.attempts as i32)
        .bind(job.max_attempts as i32)
        .bind(backoff)
        .bind(job.enqueued_at)
        .bind(&job.dedupe_key)
        .execute(&self.pool)
        .await
        .map_err(|e| QueueError::Unavailable(e.to_string()))?;

        Ok(job.job_id)
    }

    async fn dequeue(&self, queue: &str) -> Result<Option<Job>, QueueError> {
        let lease_until = Utc::now() + chrono::Duration::seconds(IN_FLIGHT_LEASE_SECONDS);

        let row = sqlx::query(
            r#"
            UPDATE pipeline_jobs
            SET visible_at = $2
            WHERE job_id = (
                SELECT job_id FROM pipeline_jobs
                WHERE queue = $1 AND visible_at <= NOW()
                ORDER BY priority_rank DESC, enqueued_at ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING job_id, queue, job_type, payload, priority,
                      attempts, max_attempts, backoff, enqueued_at, dedupe_key
            "#,
        )
        .bind(queue)
        .bind(lease_until)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| QueueError::Unavailable(e.to_string()))?;

        row.as_ref().map(Self::job_from_row).transpose()
    }

    async fn ack(&self, job: &Job) -> Result<(), QueueError> {
        let result = sqlx::query("DELETE FROM pipeline_jobs WHERE job_id = $1")
            .bind(job.job_id)
            .execute(&self.pool)
            .await
            .map_err(|e| QueueError::Unavailable(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(QueueError::NotInFlight { job_id: job.job_id });
        }
        Ok(())
    }

    async fn retry(&self, job: Job, delay: Duration) -> Result<(), QueueError> {
        let visible_at: DateTime<Utc> = Utc::now()
            + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());

        sqlx::query(
            r#"
            UPDATE pipeline_jobs
            SET attempts = $2, visible_at = $3
            WHERE job_id = $1
            "#,
        )
        .bind(job.job_id)
        .bind(job.attempts as i32)
        .bind(visible_at)
        .execute(&self.pool)
        .await
        .map_err(|e| QueueError::Unavailable(e.to_string()))?;

        Ok(())
    }

    async fn dead_letter(&self, job: Job, reason: &str) -> Result<(), QueueError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| QueueError::Unavailable(e.to_string()))?;

        sqlx::query("DELETE FROM pipeline_jobs WHERE job_id = $1")
            .bind(job.job_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| QueueError::Unavailable(e.to_string()))?;

        let payload = serde_json::to_value(&job)
            .map_err(|e| QueueError::Malformed(e.to_string()))?;
        sqlx::query(
            r#"
            INSERT INTO pipeline_jobs_archive (job_id, queue, job, reason, dead_lettered_at)
            VALUES ($1, $2, $3, $4, NOW())
            "#,
        )
        .bind(job.job_id)
        .bind(&job.queue)
        .bind(payload)
        .bind(reason)
        .execute(&mut *tx)
        .await
        .map_err(|e| QueueError::Unavailable(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| QueueError::Unavailable(e.to_string()))?;
        Ok(())
    }

    async fn dead_lettered(&self, queue: &str) -> Result<Vec<DeadLetteredJob>, QueueError> {
        let rows = sqlx::query(
            r#"
            SELECT job, reason, dead_lettered_at
            FROM pipeline_jobs_archive
            WHERE queue = $1
            ORDER BY dead_lettered_at ASC
            "#,
        )
        .bind(queue)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| QueueError::Unavailable(e.to_string()))?;

        rows.into_iter()
            .map(|row| {
                let job: serde_json::Value = row
                    .try_get("job")
                    .map_err(|e| QueueError::Malformed(e.to_string()))?;
                let job: Job = serde_json::from_value(job)
                    .map_err(|e| QueueError::Malformed(e.to_string()))?;
                Ok(DeadLetteredJob {
                    job,
                    reason: row
                        .try_get("reason")
                        .map_err(|e| QueueError::Malformed(e.to_string()))?,
                    dead_lettered_at: row
                        .try_get("dead_lettered_at")
                        .map_err(|e| QueueError::Malformed(e.to_string()))?,
                })
            })
            .collect()
    }

    async fn depth(&self, queue: &str) -> Result<usize, QueueError> {
        let row = sqlx::query("SELECT COUNT(*) AS depth FROM pipeline_jobs WHERE queue = $1")
            .bind(queue)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| QueueError::Unavailable(e.to_string()))?;

        let depth: i64 = row
            .try_get("depth")
            .map_err(|e| QueueError::Malformed(e.to_string()))?;
        Ok(depth as usize)
    }
}
