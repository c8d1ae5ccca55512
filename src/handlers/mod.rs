//! # Job Handlers
//!
//! One module per queue. Each handler performs a single side effect against
//! an external collaborator and/or the persistence boundary, classifies its
//! failures through the `HandlerError` taxonomy, and leaves retry decisions
//! to the worker runtime.

pub mod analytics;
pub mod email;
pub mod image;
pub mod payment;
pub mod push;
pub mod search;
pub mod shipping;

pub use analytics::AnalyticsHandler;
pub use email::EmailHandler;
pub use image::ImageHandler;
pub use payment::PaymentHandler;
pub use push::PushHandler;
pub use search::SearchHandler;
pub use shipping::ShippingHandler;
