use serde::{Deserialize, Serialize};
use std::fmt;

/// Shipment lifecycle states, advanced by carrier tracking updates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShipmentStatus {
    /// Label generated, package not yet with the carrier
    LabelCreated,
    /// Carrier picked the package up
    PickedUp,
    /// Moving through the carrier network
    InTransit,
    /// On the last leg to the buyer
    OutForDelivery,
    /// Buyer received the package
    Delivered,
    /// Package came back to the seller
    Returned,
    /// Carrier reported a non-recoverable failure
    Failed,
}

impl ShipmentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Returned | Self::Failed)
    }
}

impl Default for ShipmentStatus {
    fn default() -> Self {
        Self::LabelCreated
    }
}

impl fmt::Display for ShipmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LabelCreated => write!(f, "label_created"),
            Self::PickedUp => write!(f, "picked_up"),
            Self::InTransit => write!(f, "in_transit"),
            Self::OutForDelivery => write!(f, "out_for_delivery"),
            Self::Delivered => write!(f, "delivered"),
            Self::Returned => write!(f, "returned"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for ShipmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "label_created" => Ok(Self::LabelCreated),
            "picked_up" => Ok(Self::PickedUp),
            "in_transit" => Ok(Self::InTransit),
            "out_for_delivery" => Ok(Self::OutForDelivery),
            "delivered" => Ok(Self::Delivered),
            "returned" => Ok(Self::Returned),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid shipment status: {s}")),
        }
    }
}

/// Map a carrier-reported status string onto the closed status set.
///
/// Carriers evolve their vocabulary over time; an unrecognized string maps to
/// `in_transit` rather than failing the tracking job.
pub fn map_carrier_status(carrier_status: &str) -> ShipmentStatus {
    match carrier_status.to_ascii_uppercase().as_str() {
        "CREATED" | "LABEL_CREATED" | "REGISTERED" => ShipmentStatus::LabelCreated,
        "PICKED_UP" | "ACCEPTED" | "COLLECTED" => ShipmentStatus::PickedUp,
        "IN_TRANSIT" | "TRANSIT" | "ON_THE_WAY" | "AT_HUB" | "DEPARTED" => {
            ShipmentStatus::InTransit
        }
        "OUT_FOR_DELIVERY" | "ON_VEHICLE" | "WITH_COURIER" => ShipmentStatus::OutForDelivery,
        "DELIVERED" | "COMPLETED" => ShipmentStatus::Delivered,
        "RETURNED" | "RETURN_TO_SENDER" | "REFUSED" => ShipmentStatus::Returned,
        "FAILED" | "LOST" | "DAMAGED" => ShipmentStatus::Failed,
        _ => ShipmentStatus::InTransit,
    }
}
