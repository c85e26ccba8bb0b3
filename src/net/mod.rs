//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Configured bind address
//!     → listener.rs (bind, report local address)
//!     → Hand off to the HTTP layer (axum serve)
//!
//! Every request:
//!     → in_flight.rs (counted while being served; the counting stage in
//!       http/pipeline.rs also records request metrics)
//! ```
//!
//! Connections are accepted by axum; this layer only binds and counts.

pub mod in_flight;
pub mod listener;

pub use in_flight::{InFlight, InFlightGuard};
pub use listener::{bind, ListenerError};
