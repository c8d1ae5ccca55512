//! # Order Model
//!
//! The aggregate root of the fulfillment pipeline. An order's status is the
//! single source of truth every handler conditions its writes on; the
//! `commission_amount` field is write-once, set at escrow release and never
//! recomputed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::OrderStatus;

/// An order placed by a buyer against a seller's listing.
///
/// Mutated only by job handlers or the originating request transaction, and
/// never concurrently for the same transition: every status advance is a
/// conditional update (`SET status = 'paid' WHERE status = 'created'`), so a
/// duplicate job is a no-op.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: Uuid,
    pub listing_id: Uuid,
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
    /// Sale price in minor units (cents)
    pub amount_cents: i64,
    pub status: OrderStatus,
    /// Platform commission in minor units; set exactly once at escrow release
    pub commission_cents: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Order fields for creation (without generated columns)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    pub listing_id: Uuid,
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
    pub amount_cents: i64,
}

impl Order {
    /// Compute the platform commission for this order at the given rate.
    ///
    /// Rounds half-up on the minor unit so the platform never loses the
    /// fractional cent.
    pub fn commission_for_rate(&self, rate: f64) -> i64 {
        (self.amount_cents as f64 * rate).round() as i64
    }
}
