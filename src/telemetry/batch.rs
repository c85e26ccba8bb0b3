//! Batched asynchronous span export.
//!
//! # Data Flow
//! ```text
//! request task ── SpanHandle::end ──► on_end ──► bounded mpsc ──► ExportWorker
//!                                       │                            │
//!                                       └── ledger (pending spans) ◄─┘ confirm / fail
//!                                                                    │
//!                                            size / timer / flush ──► SpanSink
//! ```
//!
//! The worker is the only owner of the sink and ships batches one at a
//! time, so batches reach the sink in creation order. Flush requests travel
//! through the same queue as spans, which puts every span ended before the
//! flush call ahead of it.
//!
//! The ledger records spans that are queued but not yet confirmed by the
//! sink. A flush registers a watch over the pending set; spans from that set
//! that fail export are recorded on the watch, so the report names exactly
//! the spans that were pending at call time and never confirmed.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::config::TelemetryConfig;
use crate::observability::metrics;
use crate::telemetry::processor::{FlushReport, SpanProcessor};
use crate::telemetry::resource::Resource;
use crate::telemetry::retry::RetryPolicy;
use crate::telemetry::sink::{SinkError, SpanSink};
use crate::telemetry::span::{SpanData, SpanId, SpanSummary};

/// An ordered group of sealed spans shipped to the sink as a unit.
#[derive(Debug, Clone, Serialize)]
pub struct Batch {
    /// Creation order of this batch within the process.
    pub sequence: u64,
    pub resource: Arc<Resource>,
    pub spans: Vec<SpanData>,
}

/// Configuration for batch processing.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Maximum number of spans per batch.
    pub max_batch_size: usize,
    /// Maximum time a span waits in a partial batch.
    pub scheduled_delay: Duration,
    /// Queue capacity between request tasks and the worker.
    pub queue_capacity: usize,
    pub retry: RetryPolicy,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self::from_config(&TelemetryConfig::default())
    }
}

impl BatchConfig {
    pub fn from_config(config: &TelemetryConfig) -> Self {
        Self {
            max_batch_size: config.batch_size.max(1),
            scheduled_delay: Duration::from_millis(config.batch_interval_ms.max(1)),
            queue_capacity: config.queue_capacity.max(1),
            retry: RetryPolicy::from_config(config),
        }
    }
}

enum Message {
    Span(SpanData),
    Flush {
        deadline: Instant,
        reply: oneshot::Sender<()>,
    },
    Shutdown {
        deadline: Instant,
        reply: oneshot::Sender<()>,
    },
}

#[derive(Default)]
struct Watch {
    ids: HashSet<SpanId>,
    failed: Vec<SpanSummary>,
}

#[derive(Default)]
struct Ledger {
    pending: HashMap<SpanId, SpanSummary>,
    watches: HashMap<u64, Watch>,
    next_watch: u64,
}

impl Ledger {
    fn confirm(&mut self, spans: &[SpanData]) {
        for span in spans {
            self.pending.remove(&span.span_id);
        }
    }

    fn fail(&mut self, ids: impl IntoIterator<Item = SpanId>) {
        for id in ids {
            let Some(summary) = self.pending.remove(&id) else {
                continue;
            };
            for watch in self.watches.values_mut() {
                if watch.ids.contains(&id) {
                    watch.failed.push(summary.clone());
                }
            }
        }
    }

    fn watch(&mut self) -> u64 {
        let key = self.next_watch;
        self.next_watch += 1;
        let watch = Watch {
            ids: self.pending.keys().copied().collect(),
            failed: Vec::new(),
        };
        self.watches.insert(key, watch);
        key
    }

    fn settle(&mut self, key: u64) -> FlushReport {
        let Some(watch) = self.watches.remove(&key) else {
            return FlushReport::default();
        };
        let mut unsent = watch.failed;
        unsent.extend(
            watch
                .ids
                .iter()
                .filter_map(|id| self.pending.get(id).cloned()),
        );
        FlushReport {
            exported: watch.ids.len().saturating_sub(unsent.len()),
            unsent,
        }
    }
}

type SharedLedger = Arc<Mutex<Ledger>>;

fn lock(ledger: &SharedLedger) -> MutexGuard<'_, Ledger> {
    ledger.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Clone, Copy)]
enum Control {
    Flush,
    Shutdown,
}

/// Span processor that queues sealed spans and exports them in batches
/// from a background task.
pub struct BatchSpanProcessor {
    tx: mpsc::Sender<Message>,
    ledger: SharedLedger,
    dropped: AtomicU64,
    stopped: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
    sink_name: String,
}

impl BatchSpanProcessor {
    /// Spawn the export worker. Must be called within a Tokio runtime.
    pub fn new(sink: Arc<dyn SpanSink>, resource: Arc<Resource>, config: BatchConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity);
        let ledger = SharedLedger::default();
        let sink_name = sink.name().to_string();

        tracing::info!(
            sink = %sink_name,
            max_batch_size = config.max_batch_size,
            scheduled_delay_ms = config.scheduled_delay.as_millis() as u64,
            queue_capacity = config.queue_capacity,
            "Span exporter starting"
        );

        let worker = ExportWorker {
            rx,
            sink,
            resource,
            config,
            ledger: Arc::clone(&ledger),
            batch: Vec::new(),
            next_sequence: 0,
        };
        let handle = tokio::spawn(worker.run());

        Self {
            tx,
            ledger,
            dropped: AtomicU64::new(0),
            stopped: AtomicBool::new(false),
            worker: Mutex::new(Some(handle)),
            sink_name,
        }
    }

    /// Spans queued but not yet confirmed by the sink.
    pub fn pending_count(&self) -> usize {
        lock(&self.ledger).pending.len()
    }

    /// Spans rejected at enqueue time (queue full or exporter stopped).
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn reject(&self, span: &SpanData, reason: &'static str) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        metrics::record_spans_dropped(reason, 1);
        tracing::warn!(
            span_id = %span.span_id,
            span = %span.name,
            reason,
            "Span dropped before export"
        );
    }

    async fn exchange(&self, deadline: Instant, control: Control) -> FlushReport {
        let key = lock(&self.ledger).watch();
        let (reply, done) = oneshot::channel();
        let message = match control {
            Control::Flush => Message::Flush { deadline, reply },
            Control::Shutdown => Message::Shutdown { deadline, reply },
        };

        match time::timeout_at(deadline, self.tx.send(message)).await {
            Ok(Ok(())) => match time::timeout_at(deadline, done).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) => tracing::warn!(sink = %self.sink_name, "Export worker exited during flush"),
                Err(_) => tracing::warn!(sink = %self.sink_name, "Flush deadline elapsed"),
            },
            Ok(Err(_)) => tracing::warn!(sink = %self.sink_name, "Export worker not running"),
            Err(_) => tracing::warn!(sink = %self.sink_name, "Flush deadline elapsed while queueing"),
        }

        let report = lock(&self.ledger).settle(key);
        if !report.is_complete() {
            tracing::warn!(
                sink = %self.sink_name,
                exported = report.exported,
                unsent = report.unsent.len(),
                "Flush incomplete"
            );
        }
        report
    }
}

impl SpanProcessor for BatchSpanProcessor {
    fn on_end(&self, span: SpanData) {
        if self.stopped.load(Ordering::Acquire) {
            self.reject(&span, "shutdown");
            return;
        }

        let id = span.span_id;
        lock(&self.ledger).pending.insert(id, span.summary());

        if let Err(err) = self.tx.try_send(Message::Span(span)) {
            let (reason, message) = match err {
                mpsc::error::TrySendError::Full(message) => ("queue_full", message),
                mpsc::error::TrySendError::Closed(message) => ("exporter_stopped", message),
            };
            lock(&self.ledger).fail([id]);
            if let Message::Span(span) = message {
                self.reject(&span, reason);
            }
        }
    }

    fn force_flush(&self, deadline: Instant) -> BoxFuture<'_, FlushReport> {
        Box::pin(async move {
            if lock(&self.ledger).pending.is_empty() {
                return FlushReport::default();
            }
            self.exchange(deadline, Control::Flush).await
        })
    }

    fn shutdown(&self, deadline: Instant) -> BoxFuture<'_, FlushReport> {
        Box::pin(async move {
            if self.stopped.swap(true, Ordering::AcqRel) {
                return FlushReport::default();
            }

            let report = self.exchange(deadline, Control::Shutdown).await;

            let handle = self
                .worker
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            if let Some(handle) = handle {
                if time::timeout_at(deadline, handle).await.is_err() {
                    tracing::warn!(sink = %self.sink_name, "Export worker did not stop before deadline");
                }
            }

            tracing::info!(
                sink = %self.sink_name,
                exported = report.exported,
                unsent = report.unsent.len(),
                dropped = self.dropped_count(),
                "Span exporter stopped"
            );
            report
        })
    }
}

/// Background task owning the sink.
struct ExportWorker {
    rx: mpsc::Receiver<Message>,
    sink: Arc<dyn SpanSink>,
    resource: Arc<Resource>,
    config: BatchConfig,
    ledger: SharedLedger,
    batch: Vec<SpanData>,
    next_sequence: u64,
}

impl ExportWorker {
    async fn run(mut self) {
        let mut ticker = time::interval(self.config.scheduled_delay);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                message = self.rx.recv() => match message {
                    Some(Message::Span(span)) => {
                        self.batch.push(span);
                        if self.batch.len() >= self.config.max_batch_size {
                            self.ship_pending(None).await;
                        }
                    }
                    Some(Message::Flush { deadline, reply }) => {
                        self.ship_pending(Some(deadline)).await;
                        let _ = reply.send(());
                    }
                    Some(Message::Shutdown { deadline, reply }) => {
                        self.ship_pending(Some(deadline)).await;
                        self.abandon();
                        let _ = reply.send(());
                        break;
                    }
                    None => {
                        self.ship_pending(None).await;
                        break;
                    }
                },
                _ = ticker.tick() => {
                    if !self.batch.is_empty() {
                        self.ship_pending(None).await;
                    }
                }
            }
        }

        tracing::debug!(sink = self.sink.name(), "Export worker exiting");
    }

    /// Ship everything buffered, in batches of at most `max_batch_size`.
    async fn ship_pending(&mut self, deadline: Option<Instant>) {
        while !self.batch.is_empty() {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                break;
            }
            let take = self.batch.len().min(self.config.max_batch_size);
            let spans: Vec<SpanData> = self.batch.drain(..take).collect();
            self.ship(spans, deadline).await;
        }
    }

    async fn ship(&mut self, spans: Vec<SpanData>, deadline: Option<Instant>) {
        let batch = Batch {
            sequence: self.next_sequence,
            resource: Arc::clone(&self.resource),
            spans,
        };
        self.next_sequence += 1;

        let policy = self.config.retry;
        let mut last_error = None;

        for attempt in 0..policy.attempts {
            if attempt > 0 {
                let delay = policy.delay_before(attempt);
                if deadline.is_some_and(|d| Instant::now() + delay >= d) {
                    break;
                }
                time::sleep(delay).await;
            }

            let result = match deadline {
                Some(deadline) => time::timeout_at(deadline, self.sink.export(&batch))
                    .await
                    .unwrap_or(Err(SinkError::Timeout)),
                None => self.sink.export(&batch).await,
            };

            match result {
                Ok(()) => {
                    lock(&self.ledger).confirm(&batch.spans);
                    metrics::record_spans_exported(self.sink.name(), batch.spans.len());
                    tracing::debug!(
                        sink = self.sink.name(),
                        sequence = batch.sequence,
                        spans = batch.spans.len(),
                        attempt = attempt + 1,
                        "Batch exported"
                    );
                    return;
                }
                Err(e) => {
                    metrics::record_export_failure(self.sink.name());
                    tracing::warn!(
                        sink = self.sink.name(),
                        sequence = batch.sequence,
                        attempt = attempt + 1,
                        error = %e,
                        "Batch export failed"
                    );
                    last_error = Some(e);
                }
            }
        }

        lock(&self.ledger).fail(batch.spans.iter().map(|s| s.span_id));
        metrics::record_spans_dropped("export_failed", batch.spans.len());
        tracing::error!(
            sink = self.sink.name(),
            sequence = batch.sequence,
            spans = batch.spans.len(),
            error = %last_error.map(|e| e.to_string()).unwrap_or_else(|| "deadline elapsed".into()),
            "Dropping batch"
        );
    }

    /// Give up on whatever is still buffered or queued at shutdown.
    fn abandon(&mut self) {
        self.rx.close();
        while let Ok(message) = self.rx.try_recv() {
            match message {
                Message::Span(span) => self.batch.push(span),
                Message::Flush { reply, .. } | Message::Shutdown { reply, .. } => {
                    let _ = reply.send(());
                }
            }
        }
        if self.batch.is_empty() {
            return;
        }
        let count = self.batch.len();
        lock(&self.ledger).fail(self.batch.drain(..).map(|s| s.span_id));
        metrics::record_spans_dropped("shutdown", count);
        tracing::warn!(sink = self.sink.name(), spans = count, "Abandoning unexported spans");
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::ServiceConfig;
    use crate::telemetry::sink::tests::{FailingSink, MemorySink};
    use crate::telemetry::sink::SpanSink;
    use crate::telemetry::Tracer;

    fn resource() -> Arc<Resource> {
        Arc::new(Resource::from_parts(&ServiceConfig::default(), ""))
    }

    /// A batch of freshly ended spans with the given names.
    pub(crate) fn sample_batch(sequence: u64, names: &[&str]) -> Batch {
        let (tracer, processor) = crate::telemetry::recorder::tests::recording_tracer();
        for name in names {
            tracer.start_span(*name).end();
        }
        Batch {
            sequence,
            resource: Arc::clone(tracer.resource()),
            spans: processor.ended(),
        }
    }

    fn config(max_batch_size: usize, attempts: u32) -> BatchConfig {
        BatchConfig {
            max_batch_size,
            scheduled_delay: Duration::from_secs(3600),
            queue_capacity: 1024,
            retry: RetryPolicy {
                attempts,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
            },
        }
    }

    fn tracer_with(sink: Arc<dyn SpanSink>, config: BatchConfig) -> (Tracer, Arc<BatchSpanProcessor>) {
        let resource = resource();
        let processor = Arc::new(BatchSpanProcessor::new(sink, Arc::clone(&resource), config));
        (Tracer::new(resource, processor.clone()), processor)
    }

    fn soon() -> Instant {
        Instant::now() + Duration::from_secs(5)
    }

    #[tokio::test]
    async fn empty_flush_returns_immediately() {
        let sink = Arc::new(MemorySink::default());
        let (tracer, _processor) = tracer_with(sink.clone(), config(8, 1));

        let report = tracer.flush(Instant::now()).await;
        assert_eq!(report, FlushReport::default());
        assert!(sink.batches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn flush_exports_everything_ended_before_it() {
        let sink = Arc::new(MemorySink::default());
        let (tracer, processor) = tracer_with(sink.clone(), config(2, 1));

        for name in ["a", "b", "c", "d", "e"] {
            tracer.start_span(name).end();
        }
        let report = tracer.flush(soon()).await;

        assert_eq!(report.exported, 5);
        assert!(report.is_complete());
        assert_eq!(processor.pending_count(), 0);
        assert_eq!(sink.span_names(), ["a", "b", "c", "d", "e"]);
        assert_eq!(sink.sequences(), [0, 1, 2]);
    }

    #[tokio::test]
    async fn size_threshold_ships_without_flush() {
        let sink = Arc::new(MemorySink::default());
        let (tracer, _processor) = tracer_with(sink.clone(), config(3, 1));

        for name in ["a", "b", "c"] {
            tracer.start_span(name).end();
        }
        for _ in 0..100 {
            if !sink.batches.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(sink.span_names(), ["a", "b", "c"]);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_ships_partial_batch() {
        let sink = Arc::new(MemorySink::default());
        let mut config = config(100, 1);
        config.scheduled_delay = Duration::from_millis(200);
        let (tracer, _processor) = tracer_with(sink.clone(), config);

        tracer.start_span("lonely").end();
        tokio::time::sleep(Duration::from_millis(450)).await;

        assert_eq!(sink.span_names(), ["lonely"]);
    }

    #[tokio::test]
    async fn failing_sink_reports_unsent_spans() {
        let sink = Arc::new(FailingSink::default());
        let (tracer, processor) = tracer_with(sink.clone(), config(8, 3));

        let span = tracer.start_span("doomed");
        let id = span.context().span_id;
        span.end();

        let report = tracer.flush(soon()).await;
        assert_eq!(report.exported, 0);
        assert_eq!(report.unsent.len(), 1);
        assert_eq!(report.unsent[0].span_id, id);
        assert_eq!(report.unsent[0].name, "doomed");
        assert_eq!(sink.attempts.load(Ordering::SeqCst), 3);
        assert_eq!(processor.pending_count(), 0);
    }

    #[tokio::test]
    async fn shutdown_flushes_then_rejects() {
        let sink = Arc::new(MemorySink::default());
        let (tracer, processor) = tracer_with(sink.clone(), config(8, 1));

        tracer.start_span("before").end();
        let report = tracer.shutdown(soon()).await;
        assert_eq!(report.exported, 1);

        tracer.start_span("after").end();
        assert_eq!(processor.dropped_count(), 1);
        assert_eq!(sink.span_names(), ["before"]);

        assert_eq!(tracer.shutdown(soon()).await, FlushReport::default());
    }

    #[tokio::test]
    async fn full_queue_drops_span() {
        struct StuckSink;
        impl SpanSink for StuckSink {
            fn export<'a>(&'a self, _batch: &'a Batch) -> BoxFuture<'a, Result<(), SinkError>> {
                Box::pin(std::future::pending())
            }
            fn name(&self) -> &str {
                "stuck"
            }
        }

        let mut config = config(1, 1);
        config.queue_capacity = 1;
        let (tracer, processor) = tracer_with(Arc::new(StuckSink), config);

        // The first span occupies the worker, the second fills the queue.
        tracer.start_span("exporting").end();
        tokio::time::sleep(Duration::from_millis(50)).await;
        tracer.start_span("queued").end();
        tracer.start_span("overflow").end();

        assert_eq!(processor.dropped_count(), 1);
        assert_eq!(processor.pending_count(), 2);

        let report = tracer.flush(Instant::now() + Duration::from_millis(100)).await;
        assert_eq!(report.exported, 0);
        let mut names: Vec<_> = report.unsent.iter().map(|s| s.name.as_str()).collect();
        names.sort_unstable();
        assert_eq!(names, ["exporting", "queued"]);
    }
}
