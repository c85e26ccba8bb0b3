//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Telemetry → bind listener → spawn server → hand to coordinator
//!
//! Shutdown (shutdown.rs):
//!     Interrupt or listener failure → stop accepting → drain in-flight
//!         → flush spans → exit code
//!
//! Signals (signals.rs):
//!     SIGINT / Ctrl-C → interrupt future
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: stop accept, drain, flush, report
//! - Draining is bounded by the grace period, flushing by its own timeout

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::{
    Phase, RunningServer, Shutdown, ShutdownCause, ShutdownCoordinator, ShutdownReport,
};
pub use signals::interrupt;
pub use startup::{serve, StartupError};
