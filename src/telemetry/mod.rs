//! Request span recording and export.
//!
//! # Data Flow
//! ```text
//! span stage ── Tracer::start_span ──► SpanHandle (one per request)
//!                                          │ end()
//!                                          ▼
//!                                   SpanProcessor::on_end
//!                                          │
//!                                   BatchSpanProcessor ──► SpanSink
//!                                     (batch.rs)            (sink/)
//! ```
//!
//! # Design Decisions
//! - The tracer is an explicit value; there is no global provider
//! - Request tasks never wait on the sink; export runs on its own task
//! - Flush and shutdown take a deadline and report what was left unsent

pub mod batch;
pub mod context;
pub mod processor;
pub mod recorder;
pub mod resource;
pub mod retry;
pub mod sink;
pub mod span;

use std::sync::Arc;

use thiserror::Error;

use crate::config::EchoConfig;

pub use batch::{Batch, BatchConfig, BatchSpanProcessor};
pub use processor::{FlushReport, NoopProcessor, SpanProcessor};
pub use recorder::{ActiveSpan, SpanHandle, Tracer, DROPPED_SPAN_MESSAGE};
pub use resource::Resource;
pub use retry::RetryPolicy;
pub use sink::{SinkError, SpanSink};
pub use span::{
    AttributeValue, SpanContext, SpanData, SpanEvent, SpanId, SpanKind, SpanStatus, SpanSummary,
    TraceId,
};

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("failed to build span sink: {0}")]
    Sink(#[from] SinkError),
}

/// Build the resource, sink and batching processor described by `config`.
///
/// Spawns the export worker, so it must run inside a Tokio runtime.
pub fn install(config: &EchoConfig) -> Result<Tracer, TelemetryError> {
    let resource = Arc::new(Resource::from_config(&config.service));
    let sink = sink::from_config(&config.telemetry.sink)?;
    let processor = BatchSpanProcessor::new(
        sink,
        Arc::clone(&resource),
        BatchConfig::from_config(&config.telemetry),
    );

    tracing::info!(
        service = resource.service_name(),
        attributes = resource.attributes().len(),
        "Telemetry initialised"
    );
    Ok(Tracer::new(resource, Arc::new(processor)))
}
