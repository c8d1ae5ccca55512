//! # Handler Registry
//!
//! Explicit map from `(queue, job_type)` to handler, built once at startup
//! and validated before any worker runs: a job type with no registered
//! handler is a boot failure, not a runtime surprise.

use std::collections::HashMap;
use std::sync::Arc;

use crate::constants::job_types;
use crate::error::{PipelineError, Result};
use crate::worker::JobHandler;

/// Key for handler lookup in the registry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HandlerKey {
    pub queue: String,
    pub job_type: String,
}

impl HandlerKey {
    pub fn new(queue: impl Into<String>, job_type: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            job_type: job_type.into(),
        }
    }
}

impl std::fmt::Display for HandlerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.queue, self.job_type)
    }
}

/// Startup-built handler registry. Read-only after construction; workers
/// share it behind an `Arc`.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<HandlerKey, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a job type on its queue. Last registration
    /// wins; registering twice is almost certainly a wiring bug, so it is
    /// logged loudly.
    pub fn register(
        &mut self,
        queue: &str,
        job_type: &str,
        handler: Arc<dyn JobHandler>,
    ) -> &mut Self {
        let key = HandlerKey::new(queue, job_type);
        if self.handlers.insert(key.clone(), handler).is_some() {
            tracing::warn!(%key, "handler re-registered, previous handler replaced");
        }
        self
    }

    /// Resolve the handler for a job
    pub fn resolve(&self, queue: &str, job_type: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers
            .get(&HandlerKey::new(queue, job_type))
            .cloned()
    }

    /// Fail fast if any known job type lacks a handler
    pub fn validate(&self) -> Result<()> {
        let missing: Vec<&str> = job_types::ALL
            .iter()
            .filter(|job_type| {
                let queue = job_type.split('.').next().unwrap_or_default();
                !self.handlers.contains_key(&HandlerKey::new(queue, **job_type))
            })
            .copied()
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::ConfigurationError(format!(
                "no handler registered for job types: {}",
                missing.join(", ")
            )))
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::Job;
    use crate::worker::{HandlerError, Outcome};
    use async_trait::async_trait;

    struct NoopHandler;

    #[async_trait]
    impl crate::worker::JobHandler for NoopHandler {
        async fn handle(&self, _job: &Job) -> std::result::Result<Outcome, HandlerError> {
            Ok(Outcome::Completed)
        }
    }

    #[test]
    fn test_empty_registry_fails_validation() {
        let registry = HandlerRegistry::new();
        assert!(registry.validate().is_err());
    }

    #[test]
    fn test_full_registry_passes_validation() {
        let mut registry = HandlerRegistry::new();
        for job_type in job_types::ALL {
            let queue = job_type.split('.').next().unwrap();
            registry.register(queue, job_type, Arc::new(NoopHandler));
        }
        assert!(registry.validate().is_ok());
        assert_eq!(registry.len(), job_types::ALL.len());
    }

    #[test]
    fn test_validation_names_the_missing_job_type() {
        let mut registry = HandlerRegistry::new();
        for job_type in job_types::ALL.iter().skip(1) {
            let queue = job_type.split('.').next().unwrap();
            registry.register(queue, job_type, Arc::new(NoopHandler));
        }

        let err = registry.validate().unwrap_err();
        assert!(err.to_string().contains(job_types::ALL[0]));
    }

    #[test]
    fn test_resolve_misses_unknown_types() {
        let registry = HandlerRegistry::new();
        assert!(registry.resolve("email", "email.send").is_none());
    }
}
