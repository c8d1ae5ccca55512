//! # Event System
//!
//! Domain events (named business facts), the emitter that fans them out into
//! queue jobs, and the broadcast publisher that surfaces pipeline lifecycle
//! events to in-process subscribers.

pub mod domain;
pub mod emitter;
pub mod publisher;

pub use domain::{
    DomainEvent, OfferEventPayload, OrderEventPayload, OrderShippedPayload,
};
pub use emitter::{EmissionSummary, EventEmitter};
pub use publisher::{EventPublisher, PublishedEvent};
