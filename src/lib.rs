//! HTTP echo service with per-request trace spans.
//!
//! One endpoint, `POST /`, echoes the request body. Each request runs
//! through a fixed pipeline (request id, access log, panic recovery, span
//! instrumentation) and its span is exported in batches to a configurable
//! sink. On interrupt the server drains in-flight requests and flushes
//! buffered spans before exiting.

pub mod cli;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod telemetry;

pub use config::EchoConfig;
pub use http::HttpServer;
pub use lifecycle::{Shutdown, ShutdownCoordinator};
pub use telemetry::Tracer;
