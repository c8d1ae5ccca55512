//! # Pipeline Configuration
//!
//! Typed configuration for the fulfillment pipeline: per-queue worker
//! concurrency, retry/backoff policy defaults, commission rate, carrier
//! settings, and worker runtime knobs.
//!
//! Configuration is layered: compiled-in defaults, an optional
//! `config/pipeline.toml` file, then `FULFILLMENT_*` environment overrides
//! (`FULFILLMENT_PAYMENT__COMMISSION_RATE=0.12`). Loaded configuration is
//! validated before use.

use serde::{Deserialize, Serialize};

use crate::constants::{defaults, queues};
use crate::error::{PipelineError, Result};

/// Top-level pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PipelineConfig {
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub concurrency: ConcurrencyConfig,
    #[serde(default)]
    pub backoff: BackoffConfig,
    #[serde(default)]
    pub payment: PaymentConfig,
    #[serde(default)]
    pub shipping: ShippingConfig,
    #[serde(default)]
    pub notification: NotificationConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

/// Worker runtime knobs shared by every pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Per-job handler timeout; an exceeded timeout is a retryable failure
    pub handler_timeout_ms: u64,
    /// Idle poll interval when a queue has no visible jobs
    pub poll_interval_ms: u64,
    /// How long shutdown waits for in-flight jobs before giving up
    pub shutdown_grace_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            handler_timeout_ms: defaults::HANDLER_TIMEOUT_MS,
            poll_interval_ms: defaults::POLL_INTERVAL_MS,
            shutdown_grace_ms: 10_000,
        }
    }
}

/// Worker concurrency per named queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    pub email: usize,
    pub push: usize,
    pub shipping: usize,
    pub payment: usize,
    pub search: usize,
    pub analytics: usize,
    pub image: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            email: 4,
            push: 4,
            shipping: 2,
            payment: 2,
            search: 2,
            analytics: 1,
            image: 2,
        }
    }
}

impl ConcurrencyConfig {
    /// Concurrency for a named queue; unknown names get a single worker
    pub fn for_queue(&self, queue: &str) -> usize {
        match queue {
            queues::EMAIL => self.email,
            queues::PUSH => self.push,
            queues::SHIPPING => self.shipping,
            queues::PAYMENT => self.payment,
            queues::SEARCH => self.search,
            queues::ANALYTICS => self.analytics,
            queues::IMAGE => self.image,
            _ => 1,
        }
    }
}

/// Default retry policy attached to jobs at enqueue time.
///
/// Individual jobs may override both knobs; these are the fleet-wide
/// defaults (base 2s exponential, 3 attempts).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    pub base_delay_ms: u64,
    pub max_attempts: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: defaults::BACKOFF_BASE_DELAY_MS,
            max_attempts: defaults::MAX_ATTEMPTS,
        }
    }
}

/// Settlement configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentConfig {
    /// Platform commission rate applied at escrow release, 0..1
    pub commission_rate: f64,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            commission_rate: defaults::COMMISSION_RATE,
        }
    }
}

/// Carrier integration configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShippingConfig {
    /// Carrier key passed to the carrier client
    pub carrier: String,
    /// Deterministic tracking number prefix for the configured carrier
    pub tracking_prefix: String,
}

impl Default for ShippingConfig {
    fn default() -> Self {
        Self {
            carrier: "aras".to_string(),
            tracking_prefix: "AR".to_string(),
        }
    }
}

/// Notification transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Push transport batch limit, messages per call
    pub push_batch_size: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            push_batch_size: defaults::PUSH_BATCH_SIZE,
        }
    }
}

/// Database connection settings for the Postgres-backed stores
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/fulfillment".to_string(),
            max_connections: 10,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from the default file location and environment.
    ///
    /// Missing file is fine; environment variables override file values with
    /// the `FULFILLMENT_` prefix and `__` section separator.
    pub fn load() -> Result<Self> {
        Self::load_from(Some("config/pipeline"))
    }

    /// Load configuration from an explicit file stem (without extension)
    pub fn load_from(file: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix("FULFILLMENT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let loaded: PipelineConfig = settings.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Validate invariants a running pipeline depends on
    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.payment.commission_rate) {
            return Err(PipelineError::ConfigurationError(format!(
                "commission_rate must be within [0, 1), got {}",
                self.payment.commission_rate
            )));
        }
        if self.backoff.max_attempts == 0 {
            return Err(PipelineError::ConfigurationError(
                "backoff.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.notification.push_batch_size == 0 {
            return Err(PipelineError::ConfigurationError(
                "notification.push_batch_size must be at least 1".to_string(),
            ));
        }
        for queue in queues::ALL {
            if self.concurrency.for_queue(queue) == 0 {
                return Err(PipelineError::ConfigurationError(format!(
                    "concurrency for queue '{queue}' must be at least 1"
                )));
            }
        }
        if self.shipping.tracking_prefix.is_empty() {
            return Err(PipelineError::ConfigurationError(
                "shipping.tracking_prefix must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.payment.commission_rate, 0.10);
        assert_eq!(config.backoff.max_attempts, 3);
        assert_eq!(config.backoff.base_delay_ms, 2_000);
        assert_eq!(config.notification.push_batch_size, 100);
    }

    #[test]
    fn test_every_queue_has_nonzero_concurrency() {
        let config = PipelineConfig::default();
        for queue in queues::ALL {
            assert!(config.concurrency.for_queue(queue) >= 1, "queue {queue}");
        }
    }

    #[test]
    fn test_invalid_commission_rate_rejected() {
        let mut config = PipelineConfig::default();
        config.payment.commission_rate = 1.5;
        assert!(config.validate().is_err());

        config.payment.commission_rate = -0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_max_attempts_rejected() {
        let mut config = PipelineConfig::default();
        config.backoff.max_attempts = 0;
        assert!(config.validate().is_err());
    }
}
