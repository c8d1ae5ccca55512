//! # Job Structures
//!
//! The queued unit of work and its retry contract. A job's payload is a
//! typed enum, never free-form JSON: the handler a job reaches is decided by
//! its `job_type` key, and a payload/handler mismatch is a contract error,
//! not a deserialization surprise.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use uuid::Uuid;

use crate::constants::{job_types, queues};

/// Priority levels for queue ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
    Critical,
}

impl Default for Priority {
    fn default() -> Self {
        Self::Normal
    }
}

/// Retry delay policy attached to a job at enqueue time.
///
/// Centralized here rather than re-derived per handler: the worker runtime
/// consults the job's own policy when scheduling a retry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackoffPolicy {
    /// Constant delay between attempts
    Fixed { delay_ms: u64 },
    /// `base × 2^(attempt-1)` growth
    Exponential { base_delay_ms: u64 },
}

impl BackoffPolicy {
    /// Delay before re-running a job that has failed `attempt` times.
    ///
    /// `attempt` is 1-based: the delay after the first failure is the base
    /// delay itself.
    pub fn delay(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        match self {
            Self::Fixed { delay_ms } => Duration::from_millis(*delay_ms),
            Self::Exponential { base_delay_ms } => {
                let shift = (attempt - 1).min(16);
                Duration::from_millis(base_delay_ms.saturating_mul(1u64 << shift))
            }
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::Exponential {
            base_delay_ms: crate::constants::defaults::BACKOFF_BASE_DELAY_MS,
        }
    }
}

/// Typed payload, one variant per job type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobPayload {
    SendEmail {
        user_id: Uuid,
        template: String,
        data: Value,
    },
    SendPush {
        user_id: Uuid,
        title: String,
        body: String,
        data: Value,
    },
    CreateShipment {
        order_id: Uuid,
    },
    TrackUpdate {
        tracking_number: String,
        carrier_status: String,
        location: Option<String>,
        raw_payload: Value,
    },
    GenerateLabel {
        order_id: Uuid,
    },
    ProcessPaymentWebhook {
        provider_payment_id: Option<String>,
        conversation_id: Option<String>,
        reported_status: String,
        raw_payload: Value,
    },
    ReleaseEscrow {
        order_id: Uuid,
    },
    RefundPayment {
        order_id: Uuid,
    },
    IndexDocument {
        entity: String,
        entity_id: Uuid,
        document: Value,
    },
    DeleteDocument {
        entity: String,
        entity_id: Uuid,
    },
    RecordMetric {
        event: String,
        entity_id: Uuid,
        properties: Value,
    },
    ProcessImage {
        listing_id: Uuid,
        image_url: String,
    },
}

impl JobPayload {
    /// The handler-registration key for this payload
    pub fn job_type(&self) -> &'static str {
        match self {
            Self::SendEmail { .. } => job_types::EMAIL_SEND,
            Self::SendPush { .. } => job_types::PUSH_SEND,
            Self::CreateShipment { .. } => job_types::SHIPPING_CREATE_SHIPMENT,
            Self::TrackUpdate { .. } => job_types::SHIPPING_TRACK_UPDATE,
            Self::GenerateLabel { .. } => job_types::SHIPPING_GENERATE_LABEL,
            Self::ProcessPaymentWebhook { .. } => job_types::PAYMENT_PROCESS_WEBHOOK,
            Self::ReleaseEscrow { .. } => job_types::PAYMENT_RELEASE_ESCROW,
            Self::RefundPayment { .. } => job_types::PAYMENT_REFUND,
            Self::IndexDocument { .. } => job_types::SEARCH_INDEX,
            Self::DeleteDocument { .. } => job_types::SEARCH_DELETE,
            Self::RecordMetric { .. } => job_types::ANALYTICS_RECORD,
            Self::ProcessImage { .. } => job_types::IMAGE_PROCESS,
        }
    }

    /// The queue this payload belongs on
    pub fn queue(&self) -> &'static str {
        match self {
            Self::SendEmail { .. } => queues::EMAIL,
            Self::SendPush { .. } => queues::PUSH,
            Self::CreateShipment { .. }
            | Self::TrackUpdate { .. }
            | Self::GenerateLabel { .. } => queues::SHIPPING,
            Self::ProcessPaymentWebhook { .. }
            | Self::ReleaseEscrow { .. }
            | Self::RefundPayment { .. } => queues::PAYMENT,
            Self::IndexDocument { .. } | Self::DeleteDocument { .. } => queues::SEARCH,
            Self::RecordMetric { .. } => queues::ANALYTICS,
            Self::ProcessImage { .. } => queues::IMAGE,
        }
    }
}

/// A unit of queued work.
///
/// Owned by the queue store from enqueue until acknowledged. Lifecycle:
/// `enqueued → in-flight → (acked | retried → in-flight | dead-lettered)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: Uuid,
    pub queue: String,
    pub job_type: String,
    pub payload: JobPayload,
    pub priority: Priority,
    /// Completed execution attempts so far
    pub attempts: u32,
    pub max_attempts: u32,
    pub backoff: BackoffPolicy,
    pub enqueued_at: DateTime<Utc>,
    /// Originating entity id + event name, for tracing duplicate fan-outs
    pub dedupe_key: Option<String>,
}

impl Job {
    /// Create a job on the payload's own queue with default policy
    pub fn new(payload: JobPayload) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            queue: payload.queue().to_string(),
            job_type: payload.job_type().to_string(),
            payload,
            priority: Priority::default(),
            attempts: 0,
            max_attempts: crate::constants::defaults::MAX_ATTEMPTS,
            backoff: BackoffPolicy::default(),
            enqueued_at: Utc::now(),
            dedupe_key: None,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_retry_policy(mut self, max_attempts: u32, backoff: BackoffPolicy) -> Self {
        self.max_attempts = max_attempts;
        self.backoff = backoff;
        self
    }

    pub fn with_dedupe_key(mut self, key: impl Into<String>) -> Self {
        self.dedupe_key = Some(key.into());
        self
    }

    /// Whether the retry budget is exhausted
    pub fn is_retry_budget_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    /// Delay before the next attempt, per the job's own policy
    pub fn next_retry_delay(&self) -> Duration {
        self.backoff.delay(self.attempts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_job_lands_on_payload_queue() {
        let job = Job::new(JobPayload::CreateShipment {
            order_id: Uuid::new_v4(),
        });
        assert_eq!(job.queue, "shipping");
        assert_eq!(job.job_type, "shipping.create_shipment");
        assert_eq!(job.attempts, 0);
        assert!(!job.is_retry_budget_exhausted());
    }

    #[test]
    fn test_exponential_backoff_doubles() {
        let policy = BackoffPolicy::Exponential { base_delay_ms: 2_000 };
        assert_eq!(policy.delay(1), Duration::from_millis(2_000));
        assert_eq!(policy.delay(2), Duration::from_millis(4_000));
        assert_eq!(policy.delay(3), Duration::from_millis(8_000));
    }

    #[test]
    fn test_fixed_backoff_is_constant() {
        let policy = BackoffPolicy::Fixed { delay_ms: 500 };
        assert_eq!(policy.delay(1), policy.delay(7));
    }

    #[test]
    fn test_payload_serde_round_trip() {
        let payload = JobPayload::ProcessPaymentWebhook {
            provider_payment_id: Some("pay_1".to_string()),
            conversation_id: None,
            reported_status: "SUCCESS".to_string(),
            raw_payload: serde_json::json!({"gateway": "raw"}),
        };
        let json = serde_json::to_string(&payload).unwrap();
        let parsed: JobPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, payload);
        assert_eq!(parsed.job_type(), "payment.process_webhook");
    }

    proptest! {
        #[test]
        fn prop_exponential_delays_strictly_increase(base in 1u64..10_000, attempt in 1u32..12) {
            let policy = BackoffPolicy::Exponential { base_delay_ms: base };
            prop_assert!(policy.delay(attempt + 1) > policy.delay(attempt));
        }
    }
}
