//! # Outbound Transports
//!
//! Opaque external collaborators the handlers call: transactional email,
//! push delivery, the payment gateway, the carrier, the search index, the
//! analytics sink, and the image processor. Provider-specific request
//! signing, label formats, and wire details live behind these traits and are
//! not the pipeline's concern.
//!
//! Every call is fallible and every failure is treated as transient by the
//! handlers unless the transport says otherwise; the worker runtime applies
//! the job's own retry policy on top.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Errors surfaced by outbound transports
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Network failure, timeout, or 5xx from the provider; worth retrying
    #[error("transport unavailable: {0}")]
    Unavailable(String),

    /// The provider rejected the request; retrying will not help
    #[error("transport rejected request: {0}")]
    Rejected(String),
}

/// Transactional email sender
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Send one message; returns the provider's message id.
    async fn send(
        &self,
        to: &str,
        subject: &str,
        html_body: &str,
        text_body: Option<&str>,
    ) -> Result<String, TransportError>;
}

/// One push message addressed to a registered device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushMessage {
    pub device_token: String,
    pub title: String,
    pub body: String,
    pub data: Value,
}

/// Delivery status for one push message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushTicketStatus {
    Ok,
    Error,
}

/// Per-message receipt from the push transport
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushTicket {
    pub status: PushTicketStatus,
    pub detail: Option<String>,
}

/// Push notification sender. Implementations accept at most
/// `NotificationConfig::push_batch_size` messages per call; callers chunk.
#[async_trait]
pub trait PushSender: Send + Sync {
    async fn send_batch(&self, messages: &[PushMessage]) -> Result<Vec<PushTicket>, TransportError>;
}

/// Payment gateway, consumed only for refunds; charge authorization happens
/// in the (out-of-scope) checkout flow and reaches the pipeline as webhooks
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn refund(
        &self,
        provider_payment_id: &str,
        amount_cents: i64,
    ) -> Result<(), TransportError>;
}

/// Point-in-time tracking state reported by the carrier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingSnapshot {
    pub status: String,
    pub location: Option<String>,
}

/// Shipping carrier integration
#[async_trait]
pub trait CarrierClient: Send + Sync {
    /// Register a shipment with the carrier; returns nothing, the tracking
    /// number is generated locally and passed in.
    async fn create_shipment(
        &self,
        order_id: Uuid,
        tracking_number: &str,
    ) -> Result<(), TransportError>;

    /// Fetch the carrier's current view of a tracking number.
    async fn fetch_tracking(
        &self,
        tracking_number: &str,
    ) -> Result<TrackingSnapshot, TransportError>;

    /// Produce a printable label for an existing shipment; returns an opaque
    /// label reference (URL or document id).
    async fn generate_label(&self, tracking_number: &str) -> Result<String, TransportError>;
}

/// Denormalized search document maintenance
#[async_trait]
pub trait SearchIndexer: Send + Sync {
    async fn upsert(
        &self,
        entity: &str,
        entity_id: Uuid,
        document: &Value,
    ) -> Result<(), TransportError>;

    async fn delete(&self, entity: &str, entity_id: Uuid) -> Result<(), TransportError>;
}

/// Append-only aggregation sink
#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    async fn record(
        &self,
        event: &str,
        entity_id: Uuid,
        properties: &Value,
    ) -> Result<(), TransportError>;
}

/// Derived-variant generation for listing images
#[async_trait]
pub trait ImageProcessor: Send + Sync {
    /// Process one source image; returns URLs of the generated variants.
    async fn process(
        &self,
        listing_id: Uuid,
        image_url: &str,
    ) -> Result<Vec<String>, TransportError>;
}
