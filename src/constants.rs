//! # System Constants
//!
//! Queue names, event names, job type keys, and numeric defaults that define
//! the operational boundaries of the fulfillment pipeline.

/// Named queues served by the pipeline, one worker pool each
pub mod queues {
    pub const EMAIL: &str = "email";
    pub const PUSH: &str = "push";
    pub const SHIPPING: &str = "shipping";
    pub const PAYMENT: &str = "payment";
    pub const SEARCH: &str = "search";
    pub const ANALYTICS: &str = "analytics";
    pub const IMAGE: &str = "image";

    /// Every queue the runtime must provision a worker pool for
    pub const ALL: [&str; 7] = [EMAIL, PUSH, SHIPPING, PAYMENT, SEARCH, ANALYTICS, IMAGE];
}

/// Domain events emitted by business transactions after commit
pub mod events {
    pub const ORDER_CREATED: &str = "order.created";
    pub const ORDER_PAID: &str = "order.paid";
    pub const ORDER_SHIPPED: &str = "order.shipped";
    pub const ORDER_DELIVERED: &str = "order.delivered";
    pub const OFFER_CREATED: &str = "offer.created";
    pub const OFFER_ACCEPTED: &str = "offer.accepted";
}

/// Pipeline lifecycle events published for in-process subscribers
pub mod lifecycle_events {
    pub const JOB_COMPLETED: &str = "job.completed";
    pub const JOB_SKIPPED: &str = "job.skipped";
    pub const JOB_RETRIED: &str = "job.retried";
    pub const JOB_DEAD_LETTERED: &str = "job.dead_lettered";
}

/// Job type keys, the stable handler-registration contract.
///
/// Every key listed in `ALL` must have a registered handler at startup;
/// the registry fails fast otherwise.
pub mod job_types {
    pub const EMAIL_SEND: &str = "email.send";
    pub const PUSH_SEND: &str = "push.send";
    pub const SHIPPING_CREATE_SHIPMENT: &str = "shipping.create_shipment";
    pub const SHIPPING_TRACK_UPDATE: &str = "shipping.track_update";
    pub const SHIPPING_GENERATE_LABEL: &str = "shipping.generate_label";
    pub const PAYMENT_PROCESS_WEBHOOK: &str = "payment.process_webhook";
    pub const PAYMENT_RELEASE_ESCROW: &str = "payment.release_escrow";
    pub const PAYMENT_REFUND: &str = "payment.refund";
    pub const SEARCH_INDEX: &str = "search.index";
    pub const SEARCH_DELETE: &str = "search.delete";
    pub const ANALYTICS_RECORD: &str = "analytics.record";
    pub const IMAGE_PROCESS: &str = "image.process";

    pub const ALL: [&str; 12] = [
        EMAIL_SEND,
        PUSH_SEND,
        SHIPPING_CREATE_SHIPMENT,
        SHIPPING_TRACK_UPDATE,
        SHIPPING_GENERATE_LABEL,
        PAYMENT_PROCESS_WEBHOOK,
        PAYMENT_RELEASE_ESCROW,
        PAYMENT_REFUND,
        SEARCH_INDEX,
        SEARCH_DELETE,
        ANALYTICS_RECORD,
        IMAGE_PROCESS,
    ];
}

/// Numeric defaults applied when configuration does not override them
pub mod defaults {
    /// Platform commission rate applied at escrow release
    pub const COMMISSION_RATE: f64 = 0.10;

    /// Base delay for exponential backoff
    pub const BACKOFF_BASE_DELAY_MS: u64 = 2_000;

    /// Retry budget before a job is dead-lettered
    pub const MAX_ATTEMPTS: u32 = 3;

    /// Push transport batch limit, messages per call
    pub const PUSH_BATCH_SIZE: usize = 100;

    /// Per-job handler timeout
    pub const HANDLER_TIMEOUT_MS: u64 = 30_000;

    /// Worker idle poll interval when a queue is empty
    pub const POLL_INTERVAL_MS: u64 = 250;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_job_type_belongs_to_a_known_queue() {
        for job_type in job_types::ALL {
            let queue = job_type.split('.').next().unwrap();
            assert!(
                queues::ALL.contains(&queue),
                "job type {job_type} names unknown queue {queue}"
            );
        }
    }

    #[test]
    fn test_queue_list_is_distinct() {
        let mut names: Vec<&str> = queues::ALL.to_vec();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), queues::ALL.len());
    }
}
