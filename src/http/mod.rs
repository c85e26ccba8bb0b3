//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection (axum/hyper, HTTP/1.1 and HTTP/2)
//!     → pipeline.rs (request id → in-flight → access log → recovery)
//!     → router: POST / only (404 / 405 otherwise)
//!     → pipeline.rs span stage (POST / endpoint only)
//!     → echo.rs (read body, echo it back)
//! ```

pub mod echo;
pub mod pipeline;
pub mod recovery;
pub mod server;

pub use echo::{echo_handler, EchoError, EchoState};
pub use pipeline::{span_stage, Pipeline, X_REQUEST_ID};
pub use recovery::{recover, Fault};
pub use server::HttpServer;
