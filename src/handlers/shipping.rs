//! # Shipping Handler
//!
//! Creates shipments for paid orders, folds carrier tracking updates into
//! the append-only shipment history, and generates labels. External carrier
//! calls happen before the local state transition; the transition itself is
//! a short conditional write.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::ShippingConfig;
use crate::events::{DomainEvent, EventEmitter, OrderEventPayload, OrderShippedPayload};
use crate::models::{NewShipment, NewShipmentEvent, Order};
use crate::persistence::MarketplaceStore;
use crate::queue::{Job, JobPayload};
use crate::state::{map_carrier_status, OrderStatus, ShipmentStatus};
use crate::transport::CarrierClient;
use crate::worker::{HandlerError, JobHandler, Outcome};

pub struct ShippingHandler {
    store: Arc<dyn MarketplaceStore>,
    carrier: Arc<dyn CarrierClient>,
    emitter: Arc<EventEmitter>,
    config: ShippingConfig,
}

impl ShippingHandler {
    pub fn new(
        store: Arc<dyn MarketplaceStore>,
        carrier: Arc<dyn CarrierClient>,
        emitter: Arc<EventEmitter>,
        config: ShippingConfig,
    ) -> Self {
        Self {
            store,
            carrier,
            emitter,
            config,
        }
    }

    /// Carrier-specific tracking number: deterministic prefix, UTC
    /// timestamp, random suffix.
    fn generate_tracking_number(&self) -> String {
        let suffix: String = Uuid::new_v4()
            .simple()
            .to_string()
            .chars()
            .take(6)
            .collect::<String>()
            .to_uppercase();
        format!(
            "{}{}{}",
            self.config.tracking_prefix,
            Utc::now().format("%y%m%d%H%M%S"),
            suffix
        )
    }

    async fn create_shipment(&self, order_id: Uuid) -> Result<Outcome, HandlerError> {
        let order = self
            .store
            .find_order(order_id)
            .await?
            .ok_or_else(|| HandlerError::terminal(format!("order {order_id} not found")))?;

        if let Some(existing) = self.store.find_shipment_by_order(order_id).await? {
            return Ok(Outcome::skipped(format!(
                "shipment {} already exists",
                existing.tracking_number
            )));
        }

        match order.status {
            OrderStatus::Paid => {}
            OrderStatus::Shipped | OrderStatus::Delivered | OrderStatus::Completed => {
                return Ok(Outcome::skipped("order already shipped"));
            }
            OrderStatus::Cancelled | OrderStatus::Refunded => {
                return Ok(Outcome::skipped("order will not ship"));
            }
            OrderStatus::Created => {
                // A delayed reconciliation may still land; retry
                return Err(HandlerError::transient("order not paid yet"));
            }
        }

        let tracking_number = self.generate_tracking_number();
        self.carrier
            .create_shipment(order_id, &tracking_number)
            .await?;

        self.store
            .create_shipment(NewShipment {
                order_id,
                carrier: self.config.carrier.clone(),
                tracking_number: tracking_number.clone(),
            })
            .await?;

        let transitioned = self
            .store
            .transition_order(order_id, OrderStatus::Paid, OrderStatus::Shipped)
            .await?;
        info!(%order_id, %tracking_number, "shipment created");

        if transitioned {
            self.emitter
                .emit(DomainEvent::OrderShipped(OrderShippedPayload {
                    order: event_payload(&order),
                    carrier: self.config.carrier.clone(),
                    tracking_number,
                }))
                .await;
        }
        Ok(Outcome::Completed)
    }

    async fn track_update(
        &self,
        tracking_number: &str,
        carrier_status: &str,
        location: Option<String>,
        raw_payload: Value,
    ) -> Result<Outcome, HandlerError> {
        let shipment = self
            .store
            .find_shipment_by_tracking(tracking_number)
            .await?
            // The carrier's webhook can race the local shipment write
            .ok_or_else(|| {
                HandlerError::transient(format!("no shipment for tracking {tracking_number}"))
            })?;

        let status = map_carrier_status(carrier_status);
        self.store
            .append_shipment_event(
                shipment.shipment_id,
                NewShipmentEvent {
                    status,
                    carrier_status: carrier_status.to_string(),
                    location,
                    raw_payload,
                },
            )
            .await?;
        debug!(tracking_number, carrier_status, %status, "tracking update appended");

        if status == ShipmentStatus::Delivered {
            let order = self
                .store
                .find_order(shipment.order_id)
                .await?
                .ok_or_else(|| {
                    HandlerError::contract(format!(
                        "shipment {} references missing order {}",
                        shipment.shipment_id, shipment.order_id
                    ))
                })?;

            let transitioned = self
                .store
                .transition_order(order.order_id, OrderStatus::Shipped, OrderStatus::Delivered)
                .await?;
            if transitioned {
                info!(order_id = %order.order_id, "order delivered");
                self.emitter
                    .emit(DomainEvent::OrderDelivered(event_payload(&order)))
                    .await;
            }
        }
        Ok(Outcome::Completed)
    }

    async fn generate_label(&self, order_id: Uuid) -> Result<Outcome, HandlerError> {
        self.store
            .find_order(order_id)
            .await?
            .ok_or_else(|| HandlerError::terminal(format!("order {order_id} not found")))?;

        // Label generation cannot precede shipment creation; retry until the
        // create-shipment job has landed
        let shipment = self
            .store
            .find_shipment_by_order(order_id)
            .await?
            .ok_or_else(|| {
                HandlerError::transient(format!("order {order_id} has no shipment yet"))
            })?;

        let label_ref = self
            .carrier
            .generate_label(&shipment.tracking_number)
            .await?;
        info!(%order_id, tracking_number = %shipment.tracking_number, %label_ref, "label generated");
        Ok(Outcome::Completed)
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
impl JobHandler for ShippingHandler {
    async fn handle(&self, job: &Job) -> Result<Outcome, HandlerError> {
        match &job.payload {
            JobPayload::CreateShipment { order_id } => self.create_shipment(*order_id).await,
            JobPayload::TrackUpdate {
                tracking_number,
                carrier_status,
                location,
                raw_payload,
            } => {
                self.track_update(
                    tracking_number,
                    carrier_status,
                    location.clone(),
                    raw_payload.clone(),
                )
                .await
            }
            JobPayload::GenerateLabel { order_id } => self.generate_label(*order_id).await,
            other => Err(HandlerError::contract(format!(
                "shipping handler received {} payload",
                other.job_type()
            ))),
        }
    }
}
