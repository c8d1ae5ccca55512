//! # Persistence Boundary
//!
//! The `MarketplaceStore` trait is the only way handlers touch
//! Order/Payment/Shipment state. Every status advance is a conditional
//! update guarded by the expected current status (optimistic, not
//! lock-based), so two handlers racing to advance the same order converge:
//! only one conditional update matches, the other is a silent no-op.

pub mod memory;
pub mod postgres;

pub use memory::InMemoryMarketplaceStore;
pub use postgres::PgMarketplaceStore;

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{
    NewOrder, NewPayment, NewShipment, NewShipmentEvent, Order, Payment, Shipment, ShipmentEvent,
    UserContact,
};
use crate::state::{OrderStatus, PaymentStatus};

/// Errors surfaced by store implementations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

/// Result of reconciling a successful gateway webhook against a payment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Payment moved `pending → completed` and the order to `paid`
    Completed,
    /// Payment was already `completed`; duplicate delivery, nothing done
    AlreadyCompleted,
    /// Payment is in a state a success webhook cannot resolve
    InvalidState(PaymentStatus),
}

/// Conditional-update access to the shared Order/Payment/Shipment tables
#[async_trait]
pub trait MarketplaceStore: Send + Sync {
    // -- orders ------------------------------------------------------------

    async fn create_order(&self, order: NewOrder) -> Result<Order, StoreError>;

    async fn find_order(&self, order_id: Uuid) -> Result<Option<Order>, StoreError>;

    /// Advance an order `from → to`. Returns `false` (a no-op, not an
    /// error) when the order is not currently in `from`.
    async fn transition_order(
        &self,
        order_id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<bool, StoreError>;

    /// Persist the commission exactly once. Returns `false` when the order
    /// already carries a commission value; the stored value is never
    /// recomputed.
    async fn set_commission(
        &self,
        order_id: Uuid,
        commission_cents: i64,
    ) -> Result<bool, StoreError>;

    // -- payments ----------------------------------------------------------

    async fn create_payment(&self, payment: NewPayment) -> Result<Payment, StoreError>;

    /// Look a payment up by the gateway's payment id OR conversation/token
    /// id; the gateway may supply either.
    async fn find_payment_by_provider_ref(
        &self,
        provider_payment_id: Option<&str>,
        conversation_id: Option<&str>,
    ) -> Result<Option<Payment>, StoreError>;

    async fn find_payment_by_order(
        &self,
        order_id: Uuid,
    ) -> Result<Option<Payment>, StoreError>;

    /// Atomically (one transaction) set the payment `pending → completed`
    /// and its order `created → paid`. Duplicate delivery for an
    /// already-completed payment is a successful no-op.
    async fn reconcile_payment_success(
        &self,
        payment: &Payment,
    ) -> Result<ReconcileOutcome, StoreError>;

    /// Mark a pending payment failed. Returns `false` when the payment is
    /// no longer pending.
    async fn fail_payment(&self, payment_id: Uuid) -> Result<bool, StoreError>;

    /// Atomically move a completed payment and its order to `refunded`.
    /// Returns `false` when the payment is not in a refundable state.
    async fn mark_refunded(&self, payment: &Payment) -> Result<bool, StoreError>;

    // -- shipments ---------------------------------------------------------

    async fn create_shipment(&self, shipment: NewShipment) -> Result<Shipment, StoreError>;

    async fn find_shipment_by_order(
        &self,
        order_id: Uuid,
    ) -> Result<Option<Shipment>, StoreError>;

    async fn find_shipment_by_tracking(
        &self,
        tracking_number: &str,
    ) -> Result<Option<Shipment>, StoreError>;

    /// Append one tracking update to the shipment's history and sync the
    /// shipment's own status to it. History rows are never overwritten.
    async fn append_shipment_event(
        &self,
        shipment_id: Uuid,
        event: NewShipmentEvent,
    ) -> Result<ShipmentEvent, StoreError>;

    async fn shipment_events(
        &self,
        shipment_id: Uuid,
    ) -> Result<Vec<ShipmentEvent>, StoreError>;

    // -- users -------------------------------------------------------------

    async fn find_contact(&self, user_id: Uuid) -> Result<Option<UserContact>, StoreError>;

    async fn upsert_contact(&self, contact: UserContact) -> Result<(), StoreError>;
}
