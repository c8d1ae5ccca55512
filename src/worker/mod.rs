//! # Worker Runtime
//!
//! The handler contract and the per-queue worker pools that drive it.
//! A handler performs exactly one side effect and reports back through the
//! `Outcome`/`HandlerError` taxonomy; the pool owns everything else:
//! dequeue, dispatch, timeout, panic isolation, retry scheduling,
//! dead-lettering, and graceful shutdown.

pub mod pool;

pub use pool::{PoolStats, QueueWorkerPool};

use async_trait::async_trait;

use crate::queue::Job;

/// Success-shaped handler results
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The side effect happened
    Completed,
    /// There was genuinely nothing to do (duplicate delivery, no device
    /// token registered); the job is acknowledged, not retried
    Skipped { reason: String },
}

impl Outcome {
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }
}

/// Failure taxonomy the worker runtime acts on
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// Network/timeout/5xx from an external service; retried with backoff
    /// up to the job's retry budget
    #[error("transient: {0}")]
    Transient(String),

    /// A business fact makes this job unresolvable (entity not found,
    /// state already terminal); dead-lettered without further retries
    #[error("terminal: {0}")]
    Terminal(String),

    /// The payload does not match the handler's contract; dead-lettered
    /// immediately
    #[error("contract violation: {0}")]
    Contract(String),
}

impl HandlerError {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn terminal(msg: impl Into<String>) -> Self {
        Self::Terminal(msg.into())
    }

    pub fn contract(msg: impl Into<String>) -> Self {
        Self::Contract(msg.into())
    }

    /// Whether the worker should schedule a retry for this failure
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<crate::transport::TransportError> for HandlerError {
    fn from(err: crate::transport::TransportError) -> Self {
        match err {
            crate::transport::TransportError::Unavailable(msg) => Self::Transient(msg),
            crate::transport::TransportError::Rejected(msg) => Self::Terminal(msg),
        }
    }
}

impl From<crate::persistence::StoreError> for HandlerError {
    fn from(err: crate::persistence::StoreError) -> Self {
        match err {
            // The database being down is retryable; a missing row is not
            crate::persistence::StoreError::Database(msg) => Self::Transient(msg),
            other => Self::Terminal(other.to_string()),
        }
    }
}

/// One side effect, executed by a worker.
///
/// Handlers must be idempotent under at-least-once delivery: the same job
/// may run more than once, and state transitions go through conditional
/// updates so the second run is a no-op.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> Result<Outcome, HandlerError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportError;

    #[test]
    fn test_only_transient_failures_retry() {
        assert!(HandlerError::transient("socket closed").is_retryable());
        assert!(!HandlerError::terminal("payment not found").is_retryable());
        assert!(!HandlerError::contract("wrong payload variant").is_retryable());
    }

    #[test]
    fn test_transport_error_mapping() {
        let e: HandlerError = TransportError::Unavailable("503".to_string()).into();
        assert!(e.is_retryable());

        let e: HandlerError = TransportError::Rejected("bad address".to_string()).into();
        assert!(!e.is_retryable());
    }
}
