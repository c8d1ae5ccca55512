//! # Data Models
//!
//! Row-shaped aggregates for the fulfillment pipeline: orders, payments,
//! shipments, and the append-only shipment tracking history. Monetary amounts
//! are integer minor units (cents) throughout.

pub mod order;
pub mod payment;
pub mod shipment;

pub use order::{NewOrder, Order};
pub use payment::{NewPayment, Payment};
pub use shipment::{NewShipment, NewShipmentEvent, Shipment, ShipmentEvent};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Contact channels for a marketplace user, resolved by notification handlers.
///
/// `device_token` is optional: a user who never registered a device simply
/// has nothing to push to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserContact {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub device_token: Option<String>,
}
