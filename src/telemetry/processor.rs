//! The seam between span recording and span export.

use futures_util::future::BoxFuture;
use tokio::time::Instant;

use crate::telemetry::span::{SpanContext, SpanData, SpanSummary};

/// Receives span lifecycle events from a [`Tracer`](crate::telemetry::Tracer).
///
/// `on_start` and `on_end` run on request tasks and must not block.
pub trait SpanProcessor: Send + Sync {
    /// Called when a span is started.
    fn on_start(&self, _context: &SpanContext, _name: &str) {}

    /// Called exactly once per span, with the sealed span.
    fn on_end(&self, span: SpanData);

    /// Ship every span enqueued so far, giving up at `deadline`.
    fn force_flush(&self, deadline: Instant) -> BoxFuture<'_, FlushReport>;

    /// Flush, then stop accepting spans.
    fn shutdown(&self, deadline: Instant) -> BoxFuture<'_, FlushReport>;
}

/// Outcome of a flush.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Spans the sink confirmed during this flush.
    pub exported: usize,
    /// Spans pending at flush time that the sink did not confirm.
    pub unsent: Vec<SpanSummary>,
}

impl FlushReport {
    pub fn is_complete(&self) -> bool {
        self.unsent.is_empty()
    }
}

/// Discards every span. Flushes are always complete.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProcessor;

impl SpanProcessor for NoopProcessor {
    fn on_end(&self, _span: SpanData) {}

    fn force_flush(&self, _deadline: Instant) -> BoxFuture<'_, FlushReport> {
        Box::pin(async { FlushReport::default() })
    }

    fn shutdown(&self, _deadline: Instant) -> BoxFuture<'_, FlushReport> {
        Box::pin(async { FlushReport::default() })
    }
}
