//! # Status State Machines
//!
//! Closed status sets for the Order, Payment, and Shipment aggregates with
//! explicit transition rules. Handlers never write a status directly; every
//! advance goes through a conditional update guarded by the expected current
//! status, so duplicate or out-of-order jobs become silent no-ops.

pub mod order;
pub mod payment;
pub mod shipment;

pub use order::OrderStatus;
pub use payment::PaymentStatus;
pub use shipment::{map_carrier_status, ShipmentStatus};
