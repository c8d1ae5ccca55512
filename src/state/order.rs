use serde::{Deserialize, Serialize};
use std::fmt;

/// Order lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Order placed, payment not yet confirmed
    Created,
    /// Payment confirmed by the gateway
    Paid,
    /// Shipment created and handed to the carrier
    Shipped,
    /// Carrier reported delivery
    Delivered,
    /// Escrow released and commission settled
    Completed,
    /// Cancelled before fulfillment
    Cancelled,
    /// Money returned to the buyer
    Refunded,
}

impl OrderStatus {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Refunded)
    }

    /// Whether a transition from this status to `target` is allowed.
    ///
    /// The transition graph is intentionally strict: `shipped` is reachable
    /// only from `paid`, `delivered` only from `shipped`. Anything else is a
    /// no-op at the persistence layer.
    pub fn can_transition_to(&self, target: OrderStatus) -> bool {
        matches!(
            (self, target),
            (Self::Created, Self::Paid)
                | (Self::Created, Self::Cancelled)
                | (Self::Paid, Self::Shipped)
                | (Self::Paid, Self::Refunded)
                | (Self::Shipped, Self::Delivered)
                | (Self::Delivered, Self::Completed)
                | (Self::Delivered, Self::Refunded)
                | (Self::Cancelled, Self::Refunded)
        )
    }
}

impl Default for OrderStatus {
    fn default() -> Self {
        Self::Created
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Paid => write!(f, "paid"),
            Self::Shipped => write!(f, "shipped"),
            Self::Delivered => write!(f, "delivered"),
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Refunded => write!(f, "refunded"),
        }
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(Self::Created),
            "paid" => Ok(Self::Paid),
            "shipped" => Ok(Self::Shipped),
            "delivered" => Ok(Self::Delivered),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            "refunded" => Ok(Self::Refunded),
            _ => Err(format!("Invalid order status: {s}")),
        }
    }
}
