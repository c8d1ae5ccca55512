//! # In-Memory Marketplace Store
//!
//! Per-record conditional updates over `DashMap` cells, mirroring the
//! Postgres store's observable semantics. Used by tests and database-free
//! local runs.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::models::{
    NewOrder, NewPayment, NewShipment, NewShipmentEvent, Order, Payment, Shipment, ShipmentEvent,
    UserContact,
};
use crate::state::{OrderStatus, PaymentStatus};

use super::{MarketplaceStore, ReconcileOutcome, StoreError};

#[derive(Debug, Default)]
pub struct InMemoryMarketplaceStore {
    orders: DashMap<Uuid, Order>,
    payments: DashMap<Uuid, Payment>,
    shipments: DashMap<Uuid, Shipment>,
    shipment_events: Mutex<Vec<ShipmentEvent>>,
    contacts: DashMap<Uuid, UserContact>,
}

impl InMemoryMarketplaceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MarketplaceStore for InMemoryMarketplaceStore {
    async fn create_order(&self, order: NewOrder) -> Result<Order, StoreError> {
        let now = Utc::now();
        let order = Order {
            order_id: Uuid::new_v4(),
            listing_id: order.listing_id,
            buyer_id: order.buyer_id,
            seller_id: order.seller_id,
            amount_cents: order.amount_cents,
            status: OrderStatus::Created,
            commission_cents: None,
            created_at: now,
            updated_at: now,
        };
        self.orders.insert(order.order_id, order.clone());
        Ok(order)
    }

    async fn find_order(&self, order_id: Uuid) -> Result<Option<Order>, StoreError> {
        Ok(self.orders.get(&order_id).map(|o| o.value().clone()))
    }

    async fn transition_order(
        &self,
        order_id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<bool, StoreError> {
        match self.orders.get_mut(&order_id) {
            Some(mut order) if order.status == from => {
                order.status = to;
                order.updated_at = Utc::now();
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(StoreError::NotFound {
                entity: "order",
                id: order_id,
            }),
        }
    }

    async fn set_commission(
        &self,
        order_id: Uuid,
        commission_cents: i64,
    ) -> Result<bool, StoreError> {
        match self.orders.get_mut(&order_id) {
            Some(mut order) if order.commission_cents.is_none() => {
                order.commission_cents = Some(commission_cents);
                order.updated_at = Utc::now();
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(StoreError::NotFound {
                entity: "order",
                id: order_id,
            }),
        }
    }

    async fn create_payment(&self, payment: NewPayment) -> Result<Payment, StoreError> {
        let now = Utc::now();
        let payment = Payment {
            payment_id: Uuid::new_v4(),
            order_id: payment.order_id,
            amount_cents: payment.amount_cents,
            status: PaymentStatus::Pending,
            provider_payment_id: payment.provider_payment_id,
            conversation_id: payment.conversation_id,
            created_at: now,
            updated_at: now,
        };
        self.payments.insert(payment.payment_id, payment.clone());
        Ok(payment)
    }

    async fn find_payment_by_provider_ref(
        &self,
        provider_payment_id: Option<&str>,
        conversation_id: Option<&str>,
    ) -> Result<Option<Payment>, StoreError> {
        Ok(self
            .payments
            .iter()
            .find(|p| p.matches_provider_ref(provider_payment_id, conversation_id))
            .map(|p| p.value().clone()))
    }

    async fn find_payment_by_order(
        &self,
        order_id: Uuid,
    ) -> Result<Option<Payment>, StoreError> {
        Ok(self
            .payments
            .iter()
            .find(|p| p.order_id == order_id)
            .map(|p| p.value().clone()))
    }

    async fn reconcile_payment_success(
        &self,
        payment: &Payment,
    ) -> Result<ReconcileOutcome, StoreError> {
        let outcome = match self.payments.get_mut(&payment.payment_id) {
            Some(mut stored) => match stored.status {
                PaymentStatus::Pending => {
                    stored.status = PaymentStatus::Completed;
                    stored.updated_at = Utc::now();
                    ReconcileOutcome::Completed
                }
                PaymentStatus::Completed => ReconcileOutcome::AlreadyCompleted,
                other => ReconcileOutcome::InvalidState(other),
            },
            None => {
                return Err(StoreError::NotFound {
                    entity: "payment",
                    id: payment.payment_id,
                })
            }
        };

        if outcome == ReconcileOutcome::Completed {
            // Conditional: a delayed duplicate cannot regress an order that
            // already moved past `created`.
            self.transition_order(payment.order_id, OrderStatus::Created, OrderStatus::Paid)
                .await?;
        }
        Ok(outcome)
    }

    async fn fail_payment(&self, payment_id: Uuid) -> Result<bool, StoreError> {
        match self.payments.get_mut(&payment_id) {
            Some(mut payment) if payment.status == PaymentStatus::Pending => {
                payment.status = PaymentStatus::Failed;
                payment.updated_at = Utc::now();
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(StoreError::NotFound {
                entity: "payment",
                id: payment_id,
            }),
        }
    }

    async fn mark_refunded(&self, payment: &Payment) -> Result<bool, StoreError> {
        let refunded = match self.payments.get_mut(&payment.payment_id) {
            Some(mut stored) if stored.status == PaymentStatus::Completed => {
                stored.status = PaymentStatus::Refunded;
                stored.updated_at = Utc::now();
                true
            }
            Some(_) => false,
            None => {
                return Err(StoreError::NotFound {
                    entity: "payment",
                    id: payment.payment_id,
                })
            }
        };

        if refunded {
            if let Some(mut order) = self.orders.get_mut(&payment.order_id) {
                if order.status.can_transition_to(OrderStatus::Refunded) {
                    order.status = OrderStatus::Refunded;
                    order.updated_at = Utc::now();
                }
            }
        }
        Ok(refunded)
    }

    async fn create_shipment(&self, shipment: NewShipment) -> Result<Shipment, StoreError> {
        let now = Utc::now();
        let shipment = Shipment {
            shipment_id: Uuid::new_v4(),
            order_id: shipment.order_id,
            carrier: shipment.carrier,
            tracking_number: shipment.tracking_number,
            status: crate::state::ShipmentStatus::LabelCreated,
            created_at: now,
            updated_at: now,
        };
        self.shipments.insert(shipment.shipment_id, shipment.clone());
        Ok(shipment)
    }

    async fn find_shipment_by_order(
        &self,
        order_id: Uuid,
    ) -> Result<Option<Shipment>, StoreError> {
        Ok(self
            .shipments
            .iter()
            .find(|s| s.order_id == order_id)
            .map(|s| s.value().clone()))
    }

    async fn find_shipment_by_tracking(
        &self,
        tracking_number: &str,
    ) -> Result<Option<Shipment>, StoreError> {
        Ok(self
            .shipments
            .iter()
            .find(|s| s.tracking_number == tracking_number)
            .map(|s| s.value().clone()))
    }

    async fn append_shipment_event(
        &self,
        shipment_id: Uuid,
        event: NewShipmentEvent,
    ) -> Result<ShipmentEvent, StoreError> {
        let mut shipment = self.shipments.get_mut(&shipment_id).ok_or(StoreError::NotFound {
            entity: "shipment",
            id: shipment_id,
        })?;

        let event = ShipmentEvent {
            shipment_event_id: Uuid::new_v4(),
            shipment_id,
            status: event.status,
            carrier_status: event.carrier_status,
            location: event.location,
            raw_payload: event.raw_payload,
            occurred_at: Utc::now(),
        };

        // Shipment status always equals its most recent event's status
        shipment.status = event.status;
        shipment.updated_at = event.occurred_at;

        self.shipment_events.lock().push(event.clone());
        Ok(event)
    }

    async fn shipment_events(
        &self,
        shipment_id: Uuid,
    ) -> Result<Vec<ShipmentEvent>, StoreError> {
        Ok(self
            .shipment_events
            .lock()
            .iter()
            .filter(|e| e.shipment_id == shipment_id)
            .cloned()
            .collect())
    }

    async fn find_contact(&self, user_id: Uuid) -> Result<Option<UserContact>, StoreError> {
        Ok(self.contacts.get(&user_id).map(|c| c.value().clone()))
    }

    async fn upsert_contact(&self, contact: UserContact) -> Result<(), StoreError> {
        self.contacts.insert(contact.user_id, contact);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_order() -> NewOrder {
        NewOrder {
            listing_id: Uuid::new_v4(),
            buyer_id: Uuid::new_v4(),
            seller_id: Uuid::new_v4(),
            amount_cents: 30_000,
        }
    }

    #[tokio::test]
    async fn test_conditional_transition_matches_only_expected_state() {
        let store = InMemoryMarketplaceStore::new();
        let order = store.create_order(new_order()).await.unwrap();

        assert!(store
            .transition_order(order.order_id, OrderStatus::Created, OrderStatus::Paid)
            .await
            .unwrap());
        // Duplicate application of the same transition is a no-op
        assert!(!store
            .transition_order(order.order_id, OrderStatus::Created, OrderStatus::Paid)
            .await
            .unwrap());

        let stored = store.find_order(order.order_id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Paid);
    }

    #[tokio::test]
    async fn test_commission_is_write_once() {
        let store = InMemoryMarketplaceStore::new();
        let order = store.create_order(new_order()).await.unwrap();

        assert!(store.set_commission(order.order_id, 3_000).await.unwrap());
        assert!(!store.set_commission(order.order_id, 9_999).await.unwrap());

        let stored = store.find_order(order.order_id).await.unwrap().unwrap();
        assert_eq!(stored.commission_cents, Some(3_000));
    }

    #[tokio::test]
    async fn test_reconcile_is_idempotent() {
        let store = InMemoryMarketplaceStore::new();
        let order = store.create_order(new_order()).await.unwrap();
        let payment = store
            .create_payment(NewPayment {
                order_id: order.order_id,
                amount_cents: order.amount_cents,
                provider_payment_id: Some("pay_1".to_string()),
                conversation_id: None,
            })
            .await
            .unwrap();

        assert_eq!(
            store.reconcile_payment_success(&payment).await.unwrap(),
            ReconcileOutcome::Completed
        );
        assert_eq!(
            store.reconcile_payment_success(&payment).await.unwrap(),
            ReconcileOutcome::AlreadyCompleted
        );

        let stored = store.find_order(order.order_id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Paid);
    }

    #[tokio::test]
    async fn test_shipment_status_tracks_latest_event() {
        let store = InMemoryMarketplaceStore::new();
        let order = store.create_order(new_order()).await.unwrap();
        let shipment = store
            .create_shipment(NewShipment {
                order_id: order.order_id,
                carrier: "aras".to_string(),
                tracking_number: "AR123".to_string(),
            })
            .await
            .unwrap();

        for (status, carrier_status) in [
            (crate::state::ShipmentStatus::PickedUp, "PICKED_UP"),
            (crate::state::ShipmentStatus::InTransit, "AT_HUB"),
            (crate::state::ShipmentStatus::Delivered, "DELIVERED"),
        ] {
            store
                .append_shipment_event(
                    shipment.shipment_id,
                    NewShipmentEvent {
                        status,
                        carrier_status: carrier_status.to_string(),
                        location: None,
                        raw_payload: serde_json::json!({}),
                    },
                )
                .await
                .unwrap();
        }

        let stored = store
            .find_shipment_by_order(order.order_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, crate::state::ShipmentStatus::Delivered);

        let history = store.shipment_events(shipment.shipment_id).await.unwrap();
        assert_eq!(history.len(), 3);
    }
}
