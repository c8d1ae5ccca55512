//! # Domain Events
//!
//! Immutable named facts produced exactly once per business transition.
//! An event is identified by its originating entity id plus event name; that
//! pair is carried onto every fanned-out job as a dedupe key so duplicate
//! fan-outs are traceable (duplicates are tolerated by handler idempotency,
//! not prevented here).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::events;

/// Payload for order lifecycle events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderEventPayload {
    pub order_id: Uuid,
    pub listing_id: Uuid,
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
    pub amount_cents: i64,
}

/// Payload for `order.shipped`, which additionally carries tracking details
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderShippedPayload {
    #[serde(flatten)]
    pub order: OrderEventPayload,
    pub carrier: String,
    pub tracking_number: String,
}

/// Payload for offer lifecycle events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferEventPayload {
    pub offer_id: Uuid,
    pub listing_id: Uuid,
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
    pub amount_cents: i64,
}

/// A named business fact, emitted after its transaction commits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", content = "payload")]
pub enum DomainEvent {
    #[serde(rename = "order.created")]
    OrderCreated(OrderEventPayload),
    #[serde(rename = "order.paid")]
    OrderPaid(OrderEventPayload),
    #[serde(rename = "order.shipped")]
    OrderShipped(OrderShippedPayload),
    #[serde(rename = "order.delivered")]
    OrderDelivered(OrderEventPayload),
    #[serde(rename = "offer.created")]
    OfferCreated(OfferEventPayload),
    #[serde(rename = "offer.accepted")]
    OfferAccepted(OfferEventPayload),
}

impl DomainEvent {
    /// The event name, matching `constants::events`
    pub fn name(&self) -> &'static str {
        match self {
            Self::OrderCreated(_) => events::ORDER_CREATED,
            Self::OrderPaid(_) => events::ORDER_PAID,
            Self::OrderShipped(_) => events::ORDER_SHIPPED,
            Self::OrderDelivered(_) => events::ORDER_DELIVERED,
            Self::OfferCreated(_) => events::OFFER_CREATED,
            Self::OfferAccepted(_) => events::OFFER_ACCEPTED,
        }
    }

    /// The originating entity id
    pub fn entity_id(&self) -> Uuid {
        match self {
            Self::OrderCreated(p)
            | Self::OrderPaid(p)
            | Self::OrderDelivered(p) => p.order_id,
            Self::OrderShipped(p) => p.order.order_id,
            Self::OfferCreated(p) | Self::OfferAccepted(p) => p.offer_id,
        }
    }

    /// De-duplication identity: entity id + event name
    pub fn dedupe_key(&self) -> String {
        format!("{}:{}", self.entity_id(), self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order_payload() -> OrderEventPayload {
        OrderEventPayload {
            order_id: Uuid::new_v4(),
            listing_id: Uuid::new_v4(),
            buyer_id: Uuid::new_v4(),
            seller_id: Uuid::new_v4(),
            amount_cents: 15_000,
        }
    }

    #[test]
    fn test_event_names() {
        let payload = order_payload();
        assert_eq!(DomainEvent::OrderPaid(payload.clone()).name(), "order.paid");
        assert_eq!(
            DomainEvent::OrderDelivered(payload).name(),
            "order.delivered"
        );
    }

    #[test]
    fn test_dedupe_key_combines_entity_and_name() {
        let payload = order_payload();
        let event = DomainEvent::OrderPaid(payload.clone());
        assert_eq!(
            event.dedupe_key(),
            format!("{}:order.paid", payload.order_id)
        );
    }

    #[test]
    fn test_event_serde_round_trip() {
        let event = DomainEvent::OrderCreated(order_payload());
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"order.created\""));
        let parsed: DomainEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }
}
