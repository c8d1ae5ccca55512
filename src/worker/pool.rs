//! # Queue Worker Pool
//!
//! One pool per named queue, with pool-scoped concurrency: a slow handler
//! occupies its own slot and nothing else. The pool is the only place retry
//! decisions are made; handlers just classify their failures.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::WorkerConfig;
use crate::constants::lifecycle_events;
use crate::events::EventPublisher;
use crate::queue::{Job, QueueStore};
use crate::registry::HandlerRegistry;

use super::{HandlerError, Outcome};

/// Monotonic counters for one pool
#[derive(Debug, Default)]
pub struct PoolStats {
    pub processed: AtomicU64,
    pub succeeded: AtomicU64,
    pub skipped: AtomicU64,
    pub retried: AtomicU64,
    pub dead_lettered: AtomicU64,
}

impl PoolStats {
    pub fn snapshot(&self) -> (u64, u64, u64, u64, u64) {
        (
            self.processed.load(Ordering::Relaxed),
            self.succeeded.load(Ordering::Relaxed),
            self.skipped.load(Ordering::Relaxed),
            self.retried.load(Ordering::Relaxed),
            self.dead_lettered.load(Ordering::Relaxed),
        )
    }
}

/// Long-running consumer pool for one named queue
pub struct QueueWorkerPool {
    queue: String,
    concurrency: usize,
    store: Arc<dyn QueueStore>,
    registry: Arc<HandlerRegistry>,
    publisher: EventPublisher,
    config: WorkerConfig,
    stats: Arc<PoolStats>,
    shutdown_tx: watch::Sender<bool>,
    workers: JoinSet<()>,
}

impl QueueWorkerPool {
    pub fn new(
        queue: impl Into<String>,
        concurrency: usize,
        store: Arc<dyn QueueStore>,
        registry: Arc<HandlerRegistry>,
        publisher: EventPublisher,
        config: WorkerConfig,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            queue: queue.into(),
            concurrency: concurrency.max(1),
            store,
            registry,
            publisher,
            config,
            stats: Arc::new(PoolStats::default()),
            shutdown_tx,
            workers: JoinSet::new(),
        }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub fn stats(&self) -> Arc<PoolStats> {
        self.stats.clone()
    }

    /// Spawn the pool's workers
    pub fn start(&mut self) {
        for worker_index in 0..self.concurrency {
            let queue = self.queue.clone();
            let store = self.store.clone();
            let registry = self.registry.clone();
            let publisher = self.publisher.clone();
            let config = self.config.clone();
            let stats = self.stats.clone();
            let shutdown_rx = self.shutdown_tx.subscribe();

            self.workers.spawn(async move {
                worker_loop(
                    queue,
                    worker_index,
                    store,
                    registry,
                    publisher,
                    config,
                    stats,
                    shutdown_rx,
                )
                .await;
            });
        }
        info!(
            queue = %self.queue,
            concurrency = self.concurrency,
            "worker pool started"
        );
    }

    /// Graceful shutdown: stop dequeuing, let in-flight jobs finish, give up
    /// after the configured grace period.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(true);

        let grace = Duration::from_millis(self.config.shutdown_grace_ms);
        let drain = async {
            while self.workers.join_next().await.is_some() {}
        };
        if tokio::time::timeout(grace, drain).await.is_err() {
            warn!(queue = %self.queue, "shutdown grace elapsed, aborting workers");
            self.workers.abort_all();
        }
        info!(queue = %self.queue, "worker pool stopped");
    }
}

#[allow(clippy::too_many_arguments)]
async fn worker_loop(
    queue: String,
    worker_index: usize,
    store: Arc<dyn QueueStore>,
    registry: Arc<HandlerRegistry>,
    publisher: EventPublisher,
    config: WorkerConfig,
    stats: Arc<PoolStats>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let poll_interval = Duration::from_millis(config.poll_interval_ms);
    debug!(%queue, worker_index, "worker online");

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        match store.dequeue(&queue).await {
            Ok(Some(job)) => {
                process_job(&store, &registry, &publisher, &config, &stats, job).await;
            }
            Ok(None) => {
                tokio::select! {
                    _ = tokio::time::sleep(poll_interval) => {}
                    _ = shutdown_rx.changed() => {}
                }
            }
            Err(err) => {
                warn!(%queue, %err, "dequeue failed, backing off");
                tokio::select! {
                    _ = tokio::time::sleep(poll_interval) => {}
                    _ = shutdown_rx.changed() => {}
                }
            }
        }
    }
    debug!(%queue, worker_index, "worker offline");
}

async fn process_job(
    store: &Arc<dyn QueueStore>,
    registry: &Arc<HandlerRegistry>,
    publisher: &EventPublisher,
    config: &WorkerConfig,
    stats: &Arc<PoolStats>,
    job: Job,
) {
    stats.processed.fetch_add(1, Ordering::Relaxed);

    let Some(handler) = registry.resolve(&job.queue, &job.job_type) else {
        // validate() makes this unreachable for known job types; an unknown
        // type in the queue is a contract violation
        error!(queue = %job.queue, job_type = %job.job_type, "no handler registered");
        dead_letter(store, publisher, stats, job, "no handler registered").await;
        return;
    };

    let verdict = execute_isolated(handler, &job, config).await;

    match verdict {
        Ok(Outcome::Completed) => {
            if let Err(err) = store.ack(&job).await {
                warn!(job_id = %job.job_id, %err, "ack failed after successful handler");
            }
            stats.succeeded.fetch_add(1, Ordering::Relaxed);
            publisher.publish(
                lifecycle_events::JOB_COMPLETED,
                json!({
                    "job_id": job.job_id,
                    "queue": job.queue,
                    "job_type": job.job_type,
                    "attempts": job.attempts,
                }),
            );
        }
        Ok(Outcome::Skipped { reason }) => {
            if let Err(err) = store.ack(&job).await {
                warn!(job_id = %job.job_id, %err, "ack failed after skipped handler");
            }
            stats.skipped.fetch_add(1, Ordering::Relaxed);
            debug!(job_id = %job.job_id, queue = %job.queue, %reason, "job skipped");
            publisher.publish(
                lifecycle_events::JOB_SKIPPED,
                json!({
                    "job_id": job.job_id,
                    "queue": job.queue,
                    "job_type": job.job_type,
                    "reason": reason,
                }),
            );
        }
        Err(err) if err.is_retryable() => {
            let mut job = job;
            job.attempts += 1;

            if job.is_retry_budget_exhausted() {
                warn!(
                    job_id = %job.job_id,
                    queue = %job.queue,
                    attempts = job.attempts,
                    %err,
                    "retry budget exhausted"
                );
                dead_letter(store, publisher, stats, job, &err.to_string()).await;
            } else {
                let delay = job.next_retry_delay();
                debug!(
                    job_id = %job.job_id,
                    queue = %job.queue,
                    attempts = job.attempts,
                    delay_ms = delay.as_millis() as u64,
                    %err,
                    "scheduling retry"
                );
                publisher.publish(
                    lifecycle_events::JOB_RETRIED,
                    json!({
                        "job_id": job.job_id,
                        "queue": job.queue,
                        "job_type": job.job_type,
                        "attempts": job.attempts,
                        "delay_ms": delay.as_millis() as u64,
                    }),
                );
                stats.retried.fetch_add(1, Ordering::Relaxed);
                if let Err(retry_err) = store.retry(job, delay).await {
                    error!(%retry_err, "failed to schedule retry");
                }
            }
        }
        Err(err) => {
            warn!(job_id = %job.job_id, queue = %job.queue, %err, "non-retryable failure");
            dead_letter(store, publisher, stats, job, &err.to_string()).await;
        }
    }
}

/// Run a handler in its own task so a panic is a job failure, never a
/// crashed worker, and bound it with the configured timeout.
async fn execute_isolated(
    handler: Arc<dyn super::JobHandler>,
    job: &Job,
    config: &WorkerConfig,
) -> Result<Outcome, HandlerError> {
    let timeout = Duration::from_millis(config.handler_timeout_ms);
    let job = job.clone();
    let mut task = tokio::spawn(async move { handler.handle(&job).await });

    match tokio::time::timeout(timeout, &mut task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) if join_err.is_panic() => Err(HandlerError::transient(format!(
            "handler panicked: {join_err}"
        ))),
        Ok(Err(join_err)) => Err(HandlerError::transient(format!(
            "handler task failed: {join_err}"
        ))),
        Err(_) => {
            task.abort();
            Err(HandlerError::transient(format!(
                "handler timed out after {}ms",
                config.handler_timeout_ms
            )))
        }
    }
}

async fn dead_letter(
    store: &Arc<dyn QueueStore>,
    publisher: &EventPublisher,
    stats: &Arc<PoolStats>,
    job: Job,
    reason: &str,
) {
    stats.dead_lettered.fetch_add(1, Ordering::Relaxed);
    publisher.publish(
        lifecycle_events::JOB_DEAD_LETTERED,
        json!({
            "job_id": job.job_id,
            "queue": job.queue,
            "job_type": job.job_type,
            "attempts": job.attempts,
            "reason": reason,
        }),
    );
    if let Err(err) = store.dead_letter(job, reason).await {
        // Never silently dropped: the job stays leased in the store and
        // resurfaces once the visibility lease lapses
        error!(%err, "failed to dead-letter job");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{BackoffPolicy, InMemoryQueueStore, JobPayload};
    use crate::worker::JobHandler;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;
    use uuid::Uuid;

    struct ScriptedHandler {
        calls: AtomicU32,
        fail_first: u32,
        error: fn(String) -> HandlerError,
    }

    impl ScriptedHandler {
        fn failing_first(fail_first: u32) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                fail_first,
                error: HandlerError::Transient,
            })
        }

        fn always_terminal() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                fail_first: u32::MAX,
                error: HandlerError::Terminal,
            })
        }
    }

    #[async_trait]
    impl JobHandler for ScriptedHandler {
        async fn handle(&self, _job: &Job) -> Result<Outcome, HandlerError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                Err((self.error)(format!("scripted failure {call}")))
            } else {
                Ok(Outcome::Completed)
            }
        }
    }

    struct PanickingHandler;

    #[async_trait]
    impl JobHandler for PanickingHandler {
        async fn handle(&self, _job: &Job) -> Result<Outcome, HandlerError> {
            panic!("handler exploded");
        }
    }

    fn fast_config() -> WorkerConfig {
        WorkerConfig {
            handler_timeout_ms: 1_000,
            poll_interval_ms: 10,
            shutdown_grace_ms: 1_000,
        }
    }

    fn push_job() -> Job {
        Job::new(JobPayload::SendPush {
            user_id: Uuid::new_v4(),
            title: "t".to_string(),
            body: "b".to_string(),
            data: serde_json::json!({}),
        })
        .with_retry_policy(3, BackoffPolicy::Fixed { delay_ms: 0 })
    }

    fn registry_with(handler: Arc<dyn JobHandler>) -> Arc<HandlerRegistry> {
        let mut registry = HandlerRegistry::new();
        registry.register("push", "push.send", handler);
        Arc::new(registry)
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..500 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn test_flaky_handler_retries_then_succeeds_once() {
        let store = Arc::new(InMemoryQueueStore::new());
        let handler = ScriptedHandler::failing_first(2);
        let registry = registry_with(handler.clone());
        let mut pool = QueueWorkerPool::new(
            "push",
            1,
            store.clone() as Arc<dyn QueueStore>,
            registry,
            EventPublisher::default(),
            fast_config(),
        );
        let stats = pool.stats();

        store.enqueue(push_job()).await.unwrap();
        pool.start();

        wait_until(|| stats.succeeded.load(Ordering::Relaxed) == 1).await;
        pool.shutdown().await;

        // Exactly one successful side effect, after exactly two failures
        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
        assert_eq!(stats.retried.load(Ordering::Relaxed), 2);
        assert_eq!(stats.dead_lettered.load(Ordering::Relaxed), 0);
        assert!(store.dead_lettered("push").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_exhausted_retry_budget_dead_letters() {
        let store = Arc::new(InMemoryQueueStore::new());
        let handler = ScriptedHandler::failing_first(u32::MAX);
        let registry = registry_with(handler.clone());
        let mut pool = QueueWorkerPool::new(
            "push",
            1,
            store.clone() as Arc<dyn QueueStore>,
            registry,
            EventPublisher::default(),
            fast_config(),
        );
        let stats = pool.stats();

        store.enqueue(push_job()).await.unwrap();
        pool.start();

        wait_until(|| stats.dead_lettered.load(Ordering::Relaxed) == 1).await;
        pool.shutdown().await;

        // max_attempts executions, not one more
        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
        let dead = store.dead_lettered("push").await.unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].job.attempts, 3);
    }

    #[tokio::test]
    async fn test_terminal_failure_dead_letters_without_retry() {
        let store = Arc::new(InMemoryQueueStore::new());
        let handler = ScriptedHandler::always_terminal();
        let registry = registry_with(handler.clone());
        let mut pool = QueueWorkerPool::new(
            "push",
            1,
            store.clone() as Arc<dyn QueueStore>,
            registry,
            EventPublisher::default(),
            fast_config(),
        );
        let stats = pool.stats();

        store.enqueue(push_job()).await.unwrap();
        pool.start();

        wait_until(|| stats.dead_lettered.load(Ordering::Relaxed) == 1).await;
        pool.shutdown().await;

        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
        assert_eq!(stats.retried.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_handler_panic_does_not_crash_the_pool() {
        let store = Arc::new(InMemoryQueueStore::new());
        let registry = registry_with(Arc::new(PanickingHandler));
        let mut pool = QueueWorkerPool::new(
            "push",
            2,
            store.clone() as Arc<dyn QueueStore>,
            registry,
            EventPublisher::default(),
            fast_config(),
        );
        let stats = pool.stats();

        store.enqueue(push_job()).await.unwrap();
        pool.start();

        // Panic is a transient failure: retried until the budget runs out,
        // then dead-lettered; workers stay alive throughout
        wait_until(|| stats.dead_lettered.load(Ordering::Relaxed) == 1).await;
        pool.shutdown().await;

        let dead = store.dead_lettered("push").await.unwrap();
        assert_eq!(dead.len(), 1);
        assert!(dead[0].reason.contains("panicked"));
    }

    #[tokio::test]
    async fn test_dead_letter_surfaces_lifecycle_event() {
        let store = Arc::new(InMemoryQueueStore::new());
        let registry = registry_with(ScriptedHandler::always_terminal());
        let publisher = EventPublisher::default();
        let mut subscription = publisher.subscribe();
        let mut pool = QueueWorkerPool::new(
            "push",
            1,
            store.clone() as Arc<dyn QueueStore>,
            registry,
            publisher,
            fast_config(),
        );

        store.enqueue(push_job()).await.unwrap();
        pool.start();

        let event = tokio::time::timeout(Duration::from_secs(5), subscription.recv())
            .await
            .expect("lifecycle event published")
            .unwrap();
        pool.shutdown().await;

        assert_eq!(event.name, lifecycle_events::JOB_DEAD_LETTERED);
        assert_eq!(event.context["queue"], "push");
    }
}
