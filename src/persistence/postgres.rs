//! # Postgres Marketplace Store
//!
//! Conditional-update persistence over the `orders`, `payments`,
//! `shipments`, and `shipment_events` tables. Statuses are stored as text
//! and parsed through the closed status enums on read; a row carrying an
//! unknown status is surfaced as `StoreError::Corrupt` rather than mapped to
//! a guess.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use std::str::FromStr;
use uuid::Uuid;

use crate::models::{
    NewOrder, NewPayment, NewShipment, NewShipmentEvent, Order, Payment, Shipment, ShipmentEvent,
    UserContact,
};
use crate::state::{OrderStatus, PaymentStatus, ShipmentStatus};

use super::{MarketplaceStore, ReconcileOutcome, StoreError};

/// Postgres-backed marketplace store
#[derive(Debug, Clone)]
pub struct PgMarketplaceStore {
    pool: PgPool,
}

impl PgMarketplaceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[derive(Debug, FromRow)]
struct OrderRow {
    order_id: Uuid,
    listing_id: Uuid,
    buyer_id: Uuid,
    seller_id: Uuid,
    amount_cents: i64,
    status: String,
    commission_cents: Option<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(Order {
            order_id: row.order_id,
            listing_id: row.listing_id,
            buyer_id: row.buyer_id,
            seller_id: row.seller_id,
            amount_cents: row.amount_cents,
            status: OrderStatus::from_str(&row.status).map_err(StoreError::Corrupt)?,
            commission_cents: row.commission_cents,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct PaymentRow {
    payment_id: Uuid,
    order_id: Uuid,
    amount_cents: i64,
    status: String,
    provider_payment_id: Option<String>,
    conversation_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = StoreError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        Ok(Payment {
            payment_id: row.payment_id,
            order_id: row.order_id,
            amount_cents: row.amount_cents,
            status: PaymentStatus::from_str(&row.status).map_err(StoreError::Corrupt)?,
            provider_payment_id: row.provider_payment_id,
            conversation_id: row.conversation_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ShipmentRow {
    shipment_id: Uuid,
    order_id: Uuid,
    carrier: String,
    tracking_number: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ShipmentRow> for Shipment {
    type Error = StoreError;

    fn try_from(row: ShipmentRow) -> Result<Self, Self::Error> {
        Ok(Shipment {
            shipment_id: row.shipment_id,
            order_id: row.order_id,
            carrier: row.carrier,
            tracking_number: row.tracking_number,
            status: ShipmentStatus::from_str(&row.status).map_err(StoreError::Corrupt)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ShipmentEventRow {
    shipment_event_id: Uuid,
    shipment_id: Uuid,
    status: String,
    carrier_status: String,
    location: Option<String>,
    raw_payload: serde_json::Value,
    occurred_at: DateTime<Utc>,
}

impl TryFrom<ShipmentEventRow> for ShipmentEvent {
    type Error = StoreError;

    fn try_from(row: ShipmentEventRow) -> Result<Self, Self::Error> {
        Ok(ShipmentEvent {
            shipment_event_id: row.shipment_event_id,
            shipment_id: row.shipment_id,
            status: ShipmentStatus::from_str(&row.status).map_err(StoreError::Corrupt)?,
            carrier_status: row.carrier_status,
            location: row.location,
            raw_payload: row.raw_payload,
            occurred_at: row.occurred_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ContactRow {
    user_id: Uuid,
    email: Option<String>,
    device_token: Option<String>,
}

#[async_trait]
impl MarketplaceStore for PgMarketplaceStore {
    async fn create_order(&self, order: NewOrder) -> Result<Order, StoreError> {
        let row = sqlx::query_as::<_, OrderRow>(
            r#"
            INSERT INTO orders (
                order_id, listing_id, buyer_id, seller_id, amount_cents,
                status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, 'created', NOW(), NOW())
            RETURNING order_id, listing_id, buyer_id, seller_id, amount_cents,
                      status, commission_cents, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(order.listing_id)
        .bind(order.buyer_id)
        .bind(order.seller_id)
        .bind(order.amount_cents)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn find_order(&self, order_id: Uuid) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query_as::<_, OrderRow>(
            r#"
            SELECT order_id, listing_id, buyer_id, seller_id, amount_cents,
                   status, commission_cents, created_at, updated_at
            FROM orders WHERE order_id = $1
            "#,
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Order::try_from).transpose()
    }

    async fn transition_order(
        &self,
        order_id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE orders SET status = $3, updated_at = NOW() WHERE order_id = $1 AND status = $2",
        )
        .bind(order_id)
        .bind(from.to_string())
        .bind(to.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn set_commission(
        &self,
        order_id: Uuid,
        commission_cents: i64,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE orders SET commission_cents = $2, updated_at = NOW()
            WHERE order_id = $1 AND commission_cents IS NULL
            "#,
        )
        .bind(order_id)
        .bind(commission_cents)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn create_payment(&self, payment: NewPayment) -> Result<Payment, StoreError> {
        let row = sqlx::query_as::<_, PaymentRow>(
            r#"
            INSERT INTO payments (
                payment_id, order_id, amount_cents, status,
                provider_payment_id, conversation_id, created_at, updated_at
            )
            VALUES ($1, $2, $3, 'pending', $4, $5, NOW(), NOW())
            RETURNING payment_id, order_id, amount_cents, status,
                      provider_payment_id, conversation_id, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(payment.order_id)
        .bind(payment.amount_cents)
        .bind(payment.provider_payment_id)
        .bind(payment.conversation_id)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn find_payment_by_provider_ref(
        &self,
        provider_payment_id: Option<&str>,
        conversation_id: Option<&str>,
    ) -> Result<Option<Payment>, StoreError> {
        if provider_payment_id.is_none() && conversation_id.is_none() {
            return Ok(None);
        }

        let row = sqlx::query_as::<_, PaymentRow>(
            r#"
            SELECT payment_id, order_id, amount_cents, status,
                   provider_payment_id, conversation_id, created_at, updated_at
            FROM payments
            WHERE ($1::text IS NOT NULL AND provider_payment_id = $1)
               OR ($2::text IS NOT NULL AND conversation_id = $2)
            LIMIT 1
            "#,
        )
        .bind(provider_payment_id)
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Payment::try_from).transpose()
    }

    async fn find_payment_by_order(
        &self,
        order_id: Uuid,
    ) -> Result<Option<Payment>, StoreError> {
        let row = sqlx::query_as::<_, PaymentRow>(
            r#"
            SELECT payment_id, order_id, amount_cents, status,
                   provider_payment_id, conversation_id, created_at, updated_at
            FROM payments WHERE order_id = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Payment::try_from).transpose()
    }

    async fn reconcile_payment_success(
        &self,
        payment: &Payment,
    ) -> Result<ReconcileOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;

        let completed = sqlx::query(
            r#"
            UPDATE payments SET status = 'completed', updated_at = NOW()
            WHERE payment_id = $1 AND status = 'pending'
            "#,
        )
        .bind(payment.payment_id)
        .execute(&mut *tx)
        .await?;

        if completed.rows_affected() == 1 {
            sqlx::query(
                r#"
                UPDATE orders SET status = 'paid', updated_at = NOW()
                WHERE order_id = $1 AND status = 'created'
                "#,
            )
            .bind(payment.order_id)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;
            return Ok(ReconcileOutcome::Completed);
        }

        // Nothing to commit; read the status the conditional update saw
        let row = sqlx::query_as::<_, PaymentRow>(
            r#"
            SELECT payment_id, order_id, amount_cents, status,
                   provider_payment_id, conversation_id, created_at, updated_at
            FROM payments WHERE payment_id = $1
            "#,
        )
        .bind(payment.payment_id)
        .fetch_optional(&mut *tx)
        .await?;
        tx.rollback().await?;

        let stored: Payment = row
            .ok_or(StoreError::NotFound {
                entity: "payment",
                id: payment.payment_id,
            })?
            .try_into()?;

        match stored.status {
            PaymentStatus::Completed => Ok(ReconcileOutcome::AlreadyCompleted),
            other => Ok(ReconcileOutcome::InvalidState(other)),
        }
    }

    async fn fail_payment(&self, payment_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE payments SET status = 'failed', updated_at = NOW()
            WHERE payment_id = $1 AND status = 'pending'
            "#,
        )
        .bind(payment_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_refunded(&self, payment: &Payment) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        let refunded = sqlx::query(
            r#"
            UPDATE payments SET status = 'refunded', updated_at = NOW()
            WHERE payment_id = $1 AND status = 'completed'
            "#,
        )
        .bind(payment.payment_id)
        .execute(&mut *tx)
        .await?;

        if refunded.rows_affected() != 1 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            r#"
            UPDATE orders SET status = 'refunded', updated_at = NOW()
            WHERE order_id = $1 AND status IN ('paid', 'delivered', 'cancelled')
            "#,
        )
        .bind(payment.order_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn create_shipment(&self, shipment: NewShipment) -> Result<Shipment, StoreError> {
        let row = sqlx::query_as::<_, ShipmentRow>(
            r#"
            INSERT INTO shipments (
                shipment_id, order_id, carrier, tracking_number, status,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, 'label_created', NOW(), NOW())
            RETURNING shipment_id, order_id, carrier, tracking_number, status,
                      created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(shipment.order_id)
        .bind(shipment.carrier)
        .bind(shipment.tracking_number)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn find_shipment_by_order(
        &self,
        order_id: Uuid,
    ) -> Result<Option<Shipment>, StoreError> {
        let row = sqlx::query_as::<_, ShipmentRow>(
            r#"
            SELECT shipment_id, order_id, carrier, tracking_number, status,
                   created_at, updated_at
            FROM shipments WHERE order_id = $1
            "#,
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Shipment::try_from).transpose()
    }

    async fn find_shipment_by_tracking(
        &self,
        tracking_number: &str,
    ) -> Result<Option<Shipment>, StoreError> {
        let row = sqlx::query_as::<_, ShipmentRow>(
            r#"
            SELECT shipment_id, order_id, carrier, tracking_number, status,
                   created_at, updated_at
            FROM shipments WHERE tracking_number = $1
            "#,
        )
        .bind(tracking_number)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Shipment::try_from).transpose()
    }

    async fn append_shipment_event(
        &self,
        shipment_id: Uuid,
        event: NewShipmentEvent,
    ) -> Result<ShipmentEvent, StoreError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, ShipmentEventRow>(
            r#"
            INSERT INTO shipment_events (
                shipment_event_id, shipment_id, status, carrier_status,
                location, raw_payload, occurred_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, NOW())
            RETURNING shipment_event_id, shipment_id, status, carrier_status,
                      location, raw_payload, occurred_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(shipment_id)
        .bind(event.status.to_string())
        .bind(event.carrier_status)
        .bind(event.location)
        .bind(event.raw_payload)
        .fetch_one(&mut *tx)
        .await?;

        // Status column mirrors the most recent history row
        sqlx::query(
            "UPDATE shipments SET status = $2, updated_at = NOW() WHERE shipment_id = $1",
        )
        .bind(shipment_id)
        .bind(event.status.to_string())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        row.try_into()
    }

    async fn shipment_events(
        &self,
        shipment_id: Uuid,
    ) -> Result<Vec<ShipmentEvent>, StoreError> {
        let rows = sqlx::query_as::<_, ShipmentEventRow>(
            r#"
            SELECT shipment_event_id, shipment_id, status, carrier_status,
                   location, raw_payload, occurred_at
            FROM shipment_events
            WHERE shipment_id = $1
            ORDER BY occurred_at ASC
            "#,
        )
        .bind(shipment_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ShipmentEvent::try_from).collect()
    }

    async fn find_contact(&self, user_id: Uuid) -> Result<Option<UserContact>, StoreError> {
        let row = sqlx::query_as::<_, ContactRow>(
            "SELECT user_id, email, device_token FROM user_contacts WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|c| UserContact {
            user_id: c.user_id,
            email: c.email,
            device_token: c.device_token,
        }))
    }

    async fn upsert_contact(&self, contact: UserContact) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO user_contacts (user_id, email, device_token)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id) DO UPDATE
            SET email = EXCLUDED.email, device_token = EXCLUDED.device_token
            "#,
        )
        .bind(contact.user_id)
        .bind(contact.email)
        .bind(contact.device_token)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
