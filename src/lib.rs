#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Fulfillment Core
//!
//! Asynchronous fulfillment and settlement pipeline for a collectible-goods
//! marketplace.
//!
//! ## Overview
//!
//! When a business event commits (an order is created, paid, shipped, or
//! delivered; an offer is accepted), this crate turns it into a set of side
//! effects (notifications, shipment creation, commission/escrow settlement,
//! search-index updates), each executed by an independent worker with retry
//! and backoff, without blocking the request that triggered the event and
//! without losing or duplicating work under partial failure.
//!
//! ## Architecture
//!
//! Request handler commits a state change → [`events::EventEmitter`] fans
//! the event out into queue jobs → one [`worker::QueueWorkerPool`] per
//! named queue dequeues independently → a registered [`worker::JobHandler`]
//! executes the side effect and advances shared state through conditional
//! updates.
//!
//! ## Key Properties
//!
//! - **At-least-once, idempotent**: duplicate jobs are absorbed by
//!   conditional status transitions (`SET status = 'paid' WHERE status =
//!   'created'`), never by emission-time de-duplication
//! - **Pool-scoped concurrency**: a slow carrier call occupies one slot in
//!   one pool, nothing else
//! - **No silent loss**: a job that exhausts its retry budget is
//!   dead-lettered for operator inspection, never dropped
//! - **Panic isolation**: a handler fault is a job failure, not a crashed
//!   worker
//!
//! ## Module Organization
//!
//! - [`models`] - Order/Payment/Shipment aggregates
//! - [`state`] - Closed status sets and transition rules
//! - [`persistence`] - Conditional-update store boundary (Postgres + in-memory)
//! - [`queue`] - Job contract, retry policy, queue store boundary
//! - [`events`] - Domain events, fan-out emitter, lifecycle publisher
//! - [`registry`] - Explicit `(queue, job type) → handler` map
//! - [`worker`] - Handler contract and per-queue worker pools
//! - [`handlers`] - The seven queue handlers
//! - [`transport`] - Opaque outbound collaborators
//! - [`runtime`] - Explicitly constructed owning runtime
//! - [`config`] - Typed, validated configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use fulfillment_core::config::PipelineConfig;
//! use fulfillment_core::persistence::InMemoryMarketplaceStore;
//! use fulfillment_core::queue::InMemoryQueueStore;
//! use fulfillment_core::runtime::{PipelineRuntime, Transports};
//! use fulfillment_core::test_helpers::*;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transports = Transports {
//!     email: Arc::new(RecordingEmailSender::default()),
//!     push: Arc::new(RecordingPushSender::default()),
//!     gateway: Arc::new(RecordingGateway::default()),
//!     carrier: Arc::new(RecordingCarrier::default()),
//!     search: Arc::new(RecordingSearchIndexer::default()),
//!     analytics: Arc::new(RecordingAnalyticsSink::default()),
//!     images: Arc::new(RecordingImageProcessor::default()),
//! };
//!
//! let mut runtime = PipelineRuntime::new(
//!     PipelineConfig::default(),
//!     Arc::new(InMemoryQueueStore::new()),
//!     Arc::new(InMemoryMarketplaceStore::new()),
//!     transports,
//! )?;
//! runtime.start();
//! // ... emit events, receive webhooks ...
//! runtime.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod handlers;
pub mod logging;
pub mod models;
pub mod persistence;
pub mod queue;
pub mod registry;
pub mod runtime;
pub mod state;
pub mod test_helpers;
pub mod transport;
pub mod worker;

pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use events::{DomainEvent, EventEmitter};
pub use queue::{BackoffPolicy, Job, JobPayload, Priority};
pub use runtime::{PipelineRuntime, Transports};
pub use state::{OrderStatus, PaymentStatus, ShipmentStatus};
pub use worker::{HandlerError, JobHandler, Outcome};
