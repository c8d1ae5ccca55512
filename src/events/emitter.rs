//! # Event Emitter
//!
//! The single entry point business logic calls after a state-changing
//! operation commits. Each domain event fans out into a fixed, known set of
//! queue jobs; every enqueue is independent, so one unavailable queue never
//! blocks the others, and a partial failure is logged rather than raised:
//! the caller's commit is already durable, at most a side effect is delayed.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, warn};

use crate::config::BackoffConfig;
use crate::queue::{BackoffPolicy, Job, JobPayload, QueueStore};

use super::domain::{DomainEvent, OrderEventPayload};

/// Per-emission accounting. Emission deliberately cannot fail: partial
/// enqueue failures are counted here, never raised.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmissionSummary {
    pub enqueued: usize,
    pub failed: usize,
}

/// Fans domain events out into queue jobs
pub struct EventEmitter {
    queue_store: Arc<dyn QueueStore>,
    backoff: BackoffConfig,
}

impl EventEmitter {
    pub fn new(queue_store: Arc<dyn QueueStore>, backoff: BackoffConfig) -> Self {
        Self {
            queue_store,
            backoff,
        }
    }

    /// Emit a domain event: enqueue its full fan-out, one independent
    /// enqueue per job.
    ///
    /// Re-emission (a retried request) is safe: duplicate jobs for the same
    /// event are tolerated by handler-level idempotency.
    pub async fn emit(&self, event: DomainEvent) -> EmissionSummary {
        let dedupe_key = event.dedupe_key();
        let jobs = self.fan_out(&event);

        let mut summary = EmissionSummary::default();
        for payload in jobs {
            let job = self.build_job(payload, &dedupe_key);
            let queue = job.queue.clone();
            let job_type = job.job_type.clone();
            match self.queue_store.enqueue(job).await {
                Ok(job_id) => {
                    debug!(
                        event = event.name(),
                        %job_id,
                        %queue,
                        %job_type,
                        "enqueued fan-out job"
                    );
                    summary.enqueued += 1;
                }
                Err(error) => {
                    // The domain state change is already durable; a missing
                    // side effect is delayed, not lost to the caller.
                    warn!(
                        event = event.name(),
                        %queue,
                        %job_type,
                        %error,
                        "failed to enqueue fan-out job"
                    );
                    summary.failed += 1;
                }
            }
        }
        summary
    }

    fn build_job(&self, payload: JobPayload, dedupe_key: &str) -> Job {
        Job::new(payload)
            .with_retry_policy(
                self.backoff.max_attempts,
                BackoffPolicy::Exponential {
                    base_delay_ms: self.backoff.base_delay_ms,
                },
            )
            .with_dedupe_key(dedupe_key)
    }

    /// The fixed fan-out table: event name → jobs
    fn fan_out(&self, event: &DomainEvent) -> Vec<JobPayload> {
        match event {
            DomainEvent::OrderCreated(order) => vec![
                email(order.buyer_id, "order_confirmation", order),
                push(
                    order.seller_id,
                    "Your item sold",
                    "A buyer placed an order for your listing.",
                    order,
                ),
                JobPayload::IndexDocument {
                    entity: "order".to_string(),
                    entity_id: order.order_id,
                    document: json!({
                        "order_id": order.order_id,
                        "listing_id": order.listing_id,
                        "status": "created",
                    }),
                },
                record("order.created", order),
            ],
            DomainEvent::OrderPaid(order) => vec![
                email(order.buyer_id, "payment_receipt", order),
                push(
                    order.seller_id,
                    "Payment received",
                    "Payment cleared. Time to ship the item.",
                    order,
                ),
                JobPayload::CreateShipment {
                    order_id: order.order_id,
                },
                record("order.paid", order),
            ],
            DomainEvent::OrderShipped(shipped) => {
                let order = &shipped.order;
                vec![
                    JobPayload::SendEmail {
                        user_id: order.buyer_id,
                        template: "order_shipped".to_string(),
                        data: json!({
                            "order_id": order.order_id,
                            "amount_cents": order.amount_cents,
                            "carrier": shipped.carrier,
                            "tracking_number": shipped.tracking_number,
                        }),
                    },
                    push(
                        order.buyer_id,
                        "Your order shipped",
                        "The seller handed your package to the carrier.",
                        order,
                    ),
                    record("order.shipped", order),
                ]
            }
            DomainEvent::OrderDelivered(order) => vec![
                email(order.buyer_id, "order_delivered", order),
                push(
                    order.seller_id,
                    "Order delivered",
                    "The buyer received the package. Escrow release is underway.",
                    order,
                ),
                JobPayload::ReleaseEscrow {
                    order_id: order.order_id,
                },
                record("order.delivered", order),
            ],
            DomainEvent::OfferCreated(offer) => vec![
                JobPayload::SendPush {
                    user_id: offer.seller_id,
                    title: "New offer".to_string(),
                    body: "A buyer made an offer on your listing.".to_string(),
                    data: json!({
                        "offer_id": offer.offer_id,
                        "listing_id": offer.listing_id,
                        "amount_cents": offer.amount_cents,
                    }),
                },
                JobPayload::RecordMetric {
                    event: "offer.created".to_string(),
                    entity_id: offer.offer_id,
                    properties: json!({
                        "listing_id": offer.listing_id,
                        "amount_cents": offer.amount_cents,
                    }),
                },
            ],
            DomainEvent::OfferAccepted(offer) => vec![
                JobPayload::SendEmail {
                    user_id: offer.buyer_id,
                    template: "offer_accepted".to_string(),
                    data: json!({
                        "offer_id": offer.offer_id,
                        "listing_id": offer.listing_id,
                        "amount_cents": offer.amount_cents,
                    }),
                },
                JobPayload::SendPush {
                    user_id: offer.buyer_id,
                    title: "Offer accepted".to_string(),
                    body: "The seller accepted your offer. Complete checkout to claim it."
                        .to_string(),
                    data: json!({
                        "offer_id": offer.offer_id,
                        "listing_id": offer.listing_id,
                    }),
                },
                JobPayload::RecordMetric {
                    event: "offer.accepted".to_string(),
                    entity_id: offer.offer_id,
                    properties: json!({
                        "listing_id": offer.listing_id,
                        "amount_cents": offer.amount_cents,
                    }),
                },
            ],
        }
    }
}

fn email(user_id: uuid::Uuid, template: &str, order: &OrderEventPayload) -> JobPayload {
    JobPayload::SendEmail {
        user_id,
        template: template.to_string(),
        data: json!({
            "order_id": order.order_id,
            "listing_id": order.listing_id,
            "amount_cents": order.amount_cents,
        }),
    }
}

fn push(user_id: uuid::Uuid, title: &str, body: &str, order: &OrderEventPayload) -> JobPayload {
    JobPayload::SendPush {
        user_id,
        title: title.to_string(),
        body: body.to_string(),
        data: json!({
            "order_id": order.order_id,
            "listing_id": order.listing_id,
        }),
    }
}

fn record(event: &str, order: &OrderEventPayload) -> JobPayload {
    JobPayload::RecordMetric {
        event: event.to_string(),
        entity_id: order.order_id,
        properties: json!({
            "listing_id": order.listing_id,
            "buyer_id": order.buyer_id,
            "seller_id": order.seller_id,
            "amount_cents": order.amount_cents,
        }),
    }
}
