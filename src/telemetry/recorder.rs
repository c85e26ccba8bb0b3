//! Span creation and mutation.
//!
//! A [`Tracer`] is an explicit value handed to whatever needs to record
//! spans; there is no process-global provider. Each started span is owned
//! by a [`SpanHandle`] whose `end()` seals it exactly once.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::time::Instant;

use crate::config::ServiceConfig;
use crate::telemetry::processor::{FlushReport, NoopProcessor, SpanProcessor};
use crate::telemetry::resource::Resource;
use crate::telemetry::span::{
    now_unix_nanos, AttributeValue, SpanContext, SpanData, SpanEvent, SpanId, SpanKind, SpanStatus,
    TraceId,
};

/// Status given to a span that is dropped without `end()`.
pub const DROPPED_SPAN_MESSAGE: &str = "span dropped before end";

/// Starts spans against a resource and hands finished ones to a processor.
#[derive(Clone)]
pub struct Tracer {
    resource: Arc<Resource>,
    processor: Arc<dyn SpanProcessor>,
}

impl Tracer {
    pub fn new(resource: Arc<Resource>, processor: Arc<dyn SpanProcessor>) -> Self {
        Self { resource, processor }
    }

    /// A tracer that discards everything, for tests and tooling.
    pub fn noop() -> Self {
        Self::new(
            Arc::new(Resource::from_parts(&ServiceConfig::default(), "")),
            Arc::new(NoopProcessor),
        )
    }

    pub fn resource(&self) -> &Arc<Resource> {
        &self.resource
    }

    pub fn start_span(&self, name: impl Into<String>) -> SpanHandle {
        self.start_span_with_parent(name, SpanKind::Internal, None)
    }

    /// Start a span, continuing `parent`'s trace when given.
    pub fn start_span_with_parent(
        &self,
        name: impl Into<String>,
        kind: SpanKind,
        parent: Option<SpanContext>,
    ) -> SpanHandle {
        let name = name.into();
        let context = SpanContext {
            trace_id: parent.map_or_else(TraceId::random, |p| p.trace_id),
            span_id: SpanId::random(),
            sampled: true,
        };

        self.processor.on_start(&context, &name);

        let data = SpanData {
            trace_id: context.trace_id,
            span_id: context.span_id,
            parent_span_id: parent.map(|p| p.span_id),
            name,
            kind,
            start_unix_nanos: now_unix_nanos(),
            end_unix_nanos: 0,
            status: SpanStatus::Unset,
            attributes: BTreeMap::new(),
            events: Vec::new(),
            resource: Arc::clone(&self.resource),
        };

        SpanHandle {
            context,
            state: Mutex::new(Some(data)),
            processor: Arc::clone(&self.processor),
        }
    }

    pub async fn flush(&self, deadline: Instant) -> FlushReport {
        self.processor.force_flush(deadline).await
    }

    pub async fn shutdown(&self, deadline: Instant) -> FlushReport {
        self.processor.shutdown(deadline).await
    }
}

impl fmt::Debug for Tracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracer")
            .field("service", &self.resource.service_name())
            .finish_non_exhaustive()
    }
}

/// Owner of one open span.
pub struct SpanHandle {
    context: SpanContext,
    state: Mutex<Option<SpanData>>,
    processor: Arc<dyn SpanProcessor>,
}

impl SpanHandle {
    pub fn context(&self) -> SpanContext {
        self.context
    }

    pub fn set_attribute(&self, key: impl Into<String>, value: impl Into<AttributeValue>) {
        self.with_open("set_attribute", |span| {
            span.attributes.insert(key.into(), value.into());
        });
    }

    /// Attach an `exception` event describing `error` and its sources.
    pub fn record_error<E: std::error::Error + ?Sized>(&self, error: &E) {
        let mut attributes = BTreeMap::new();
        attributes.insert("exception.message".to_string(), error.to_string().into());

        let mut causes = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }
        if !causes.is_empty() {
            attributes.insert("exception.cause".to_string(), causes.join(": ").into());
        }

        self.with_open("record_error", |span| {
            span.events.push(SpanEvent {
                name: "exception".to_string(),
                time_unix_nanos: now_unix_nanos(),
                attributes,
            });
        });
    }

    /// Set the status. `Unset` is ignored and `Ok` is final.
    pub fn set_status(&self, status: SpanStatus) {
        self.with_open("set_status", |span| {
            if status == SpanStatus::Unset || span.status == SpanStatus::Ok {
                return;
            }
            span.status = status;
        });
    }

    /// Current status, or `None` once ended.
    pub fn status(&self) -> Option<SpanStatus> {
        self.lock().as_ref().map(|span| span.status.clone())
    }

    pub fn is_ended(&self) -> bool {
        self.lock().is_none()
    }

    /// Seal the span and hand it to the processor.
    ///
    /// Returns `false` if the span was already ended.
    pub fn end(&self) -> bool {
        let sealed = self.lock().take();
        match sealed {
            Some(mut span) => {
                span.end_unix_nanos = now_unix_nanos().max(span.start_unix_nanos);
                self.processor.on_end(span);
                true
            }
            None => false,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<SpanData>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_open(&self, operation: &'static str, f: impl FnOnce(&mut SpanData)) {
        let mut state = self.lock();
        match state.as_mut() {
            Some(span) => f(span),
            None => tracing::warn!(
                span_id = %self.context.span_id,
                operation,
                "Span already ended, ignoring"
            ),
        }
    }
}

impl Drop for SpanHandle {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(span) = state.as_mut() {
            if span.status == SpanStatus::Unset {
                span.status = SpanStatus::error(DROPPED_SPAN_MESSAGE);
            }
            tracing::debug!(span_id = %self.context.span_id, "Sealing span on drop");
        }
        self.end();
    }
}

impl fmt::Debug for SpanHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpanHandle")
            .field("context", &self.context)
            .field("ended", &self.is_ended())
            .finish()
    }
}

/// The request's span, shared between the instrumentation stage and the
/// handler through request extensions.
#[derive(Debug, Clone)]
pub struct ActiveSpan(Arc<SpanHandle>);

impl ActiveSpan {
    pub fn new(handle: SpanHandle) -> Self {
        Self(Arc::new(handle))
    }
}

impl Deref for ActiveSpan {
    type Target = SpanHandle;

    fn deref(&self) -> &SpanHandle {
        &self.0
    }
}
