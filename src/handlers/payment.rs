//! # Payment Handler
//!
//! Reconciles inbound gateway webhooks against local payment state, releases
//! escrow once an order is delivered, and executes refunds. All three
//! operations are idempotent under duplicate delivery: the webhook path
//! treats an already-completed payment as a successful no-op, the escrow
//! path never recomputes a persisted commission, and the refund path skips a
//! payment that already left the refundable state.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::events::{DomainEvent, EventEmitter, OrderEventPayload};
use crate::models::Order;
use crate::persistence::{MarketplaceStore, ReconcileOutcome};
use crate::queue::{Job, JobPayload};
use crate::state::OrderStatus;
use crate::transport::PaymentGateway;
use crate::worker::{HandlerError, JobHandler, Outcome};

/// Gateway vocabulary for a successful charge
fn is_success_status(reported: &str) -> bool {
    matches!(
        reported.to_ascii_uppercase().as_str(),
        "SUCCESS" | "COMPLETED" | "PAID" | "AUTH_SUCCESS"
    )
}

pub struct PaymentHandler {
    store: Arc<dyn MarketplaceStore>,
    gateway: Arc<dyn PaymentGateway>,
    emitter: Arc<EventEmitter>,
    commission_rate: f64,
}

impl PaymentHandler {
    pub fn new(
        store: Arc<dyn MarketplaceStore>,
        gateway: Arc<dyn PaymentGateway>,
        emitter: Arc<EventEmitter>,
        commission_rate: f64,
    ) -> Self {
        Self {
            store,
            gateway,
            emitter,
            commission_rate,
        }
    }

    /// Webhook reconciliation: `pending → completed` or `pending → failed`.
    ///
    /// The gateway may deliver the webhook before or after the local write
    /// it reconciles, out of order, or more than once; the conditional
    /// transitions absorb all of that.
    async fn process_webhook(
        &self,
        provider_payment_id: Option<&str>,
        conversation_id: Option<&str>,
        reported_status: &str,
    ) -> Result<Outcome, HandlerError> {
        let payment = self
            .store
            .find_payment_by_provider_ref(provider_payment_id, conversation_id)
            .await?
            .ok_or_else(|| {
                // Retrying cannot conjure the payment into existence; the
                // dead-letter shelf puts a possibly-lost payment in front of
                // an operator
                HandlerError::terminal(format!(
                    "payment not found (provider_payment_id={provider_payment_id:?}, \
                     conversation_id={conversation_id:?})"
                ))
            })?;

        if !is_success_status(reported_status) {
            return if self.store.fail_payment(payment.payment_id).await? {
                info!(payment_id = %payment.payment_id, reported_status, "payment failed");
                Ok(Outcome::Completed)
            } else {
                Ok(Outcome::skipped("payment no longer pending"))
            };
        }

        match self.store.reconcile_payment_success(&payment).await? {
            ReconcileOutcome::Completed => {
                info!(
                    payment_id = %payment.payment_id,
                    order_id = %payment.order_id,
                    "payment completed, order paid"
                );
                let order = self
                    .store
                    .find_order(payment.order_id)
                    .await?
                    .ok_or_else(|| {
                        HandlerError::contract(format!(
                            "payment {} references missing order {}",
                            payment.payment_id, payment.order_id
                        ))
                    })?;
                self.emitter
                    .emit(DomainEvent::OrderPaid(event_payload(&order)))
                    .await;
                Ok(Outcome::Completed)
            }
            ReconcileOutcome::AlreadyCompleted => {
                // Duplicate delivery: accepted, nothing to do
                Ok(Outcome::skipped("payment already completed"))
            }
            ReconcileOutcome::InvalidState(status) => {
                warn!(
                    payment_id = %payment.payment_id,
                    %status,
                    "success webhook for payment in unreconcilable state"
                );
                Ok(Outcome::skipped(format!(
                    "payment in state {status}, success webhook ignored"
                )))
            }
        }
    }

    /// Escrow release: compute `commission = amount × rate` and persist it
    /// exactly once, then settle the order.
    async fn release_escrow(&self, order_id: uuid::Uuid) -> Result<Outcome, HandlerError> {
        let order = self
            .store
            .find_order(order_id)
            .await?
            .ok_or_else(|| HandlerError::terminal(format!("order {order_id} not found")))?;

        if order.commission_cents.is_some() {
            return Ok(Outcome::skipped("commission already settled"));
        }

        let commission = order.commission_for_rate(self.commission_rate);
        if !self.store.set_commission(order_id, commission).await? {
            // A concurrent release won the write-once race
            return Ok(Outcome::skipped("commission already settled"));
        }

        self.store
            .transition_order(order_id, OrderStatus::Delivered, OrderStatus::Completed)
            .await?;
        info!(
            %order_id,
            commission_cents = commission,
            "escrow released"
        );
        Ok(Outcome::Completed)
    }

    /// Refund: external gateway call first, then the short local transaction.
    async fn refund(&self, order_id: uuid::Uuid) -> Result<Outcome, HandlerError> {
        let payment = self
            .store
            .find_payment_by_order(order_id)
            .await?
            .ok_or_else(|| {
                HandlerError::terminal(format!("no payment recorded for order {order_id}"))
            })?;

        match payment.status {
            crate::state::PaymentStatus::Refunded => {
                return Ok(Outcome::skipped("payment already refunded"))
            }
            crate::state::PaymentStatus::Completed => {}
            other => {
                return Ok(Outcome::skipped(format!(
                    "payment in state {other} is not refundable"
                )))
            }
        }

        let provider_payment_id = payment.provider_payment_id.as_deref().ok_or_else(|| {
            HandlerError::terminal(format!(
                "payment {} has no provider payment id to refund against",
                payment.payment_id
            ))
        })?;

        self.gateway
            .refund(provider_payment_id, payment.amount_cents)
            .await?;

        if self.store.mark_refunded(&payment).await? {
            info!(payment_id = %payment.payment_id, %order_id, "payment refunded");
            Ok(Outcome::Completed)
        } else {
            Ok(Outcome::skipped("payment left refundable state mid-flight"))
        }
    }
}

fn event_payload(order: &Order) -> OrderEventPayload {
    OrderEventPayload {
        order_id: order.order_id,
        listing_id: order.listing_id,
        buyer_id: order.buyer_id,
        seller_id: order.seller_id,
        amount_cents: order.amount_cents,
    }
}

#[async_trait]
impl JobHandler for PaymentHandler {
    async fn handle(&self, job: &Job) -> Result<Outcome, HandlerError> {
        match &job.payload {
            JobPayload::ProcessPaymentWebhook {
                provider_payment_id,
                conversation_id,
                reported_status,
                ..
            } => {
                self.process_webhook(
                    provider_payment_id.as_deref(),
                    conversation_id.as_deref(),
                    reported_status,
                )
                .await
            }
            JobPayload::ReleaseEscrow { order_id } => self.release_escrow(*order_id).await,
            JobPayload::RefundPayment { order_id } => self.refund(*order_id).await,
            other => Err(HandlerError::contract(format!(
                "payment handler received {} payload",
                other.job_type()
            ))),
        }
    }
}
