//! # Shipment Models
//!
//! One shipment per order after payment, plus the append-only tracking
//! history. A `ShipmentEvent` row is written for every tracking update and
//! never overwritten; the shipment's own status column always equals the
//! status of its most recent event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::ShipmentStatus;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shipment {
    pub shipment_id: Uuid,
    pub order_id: Uuid,
    pub carrier: String,
    pub tracking_number: String,
    pub status: ShipmentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Shipment fields for creation (without generated columns)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewShipment {
    pub order_id: Uuid,
    pub carrier: String,
    pub tracking_number: String,
}

/// One tracking update as reported by the carrier.
///
/// `carrier_status` preserves the raw vocabulary the carrier used;
/// `status` is its mapping onto the closed set. The raw webhook payload is
/// kept opaque for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipmentEvent {
    pub shipment_event_id: Uuid,
    pub shipment_id: Uuid,
    pub status: ShipmentStatus,
    pub carrier_status: String,
    pub location: Option<String>,
    pub raw_payload: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
}

/// Tracking update fields for appending to the history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewShipmentEvent {
    pub status: ShipmentStatus,
    pub carrier_status: String,
    pub location: Option<String>,
    pub raw_payload: serde_json::Value,
}
