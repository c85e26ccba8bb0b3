//! Span export destinations.
//!
//! A sink receives whole batches from the export worker, which owns it
//! exclusively; request tasks never touch a sink. Sinks do not retry; the
//! worker applies the retry policy around them.

pub mod collector;
pub mod file;

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use thiserror::Error;

use crate::config::SinkConfig;
use crate::telemetry::batch::Batch;

pub use collector::CollectorSink;
pub use file::FileSink;

/// Error types for span export operations.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The sink could not be built from its configuration.
    #[error("invalid sink configuration: {0}")]
    Config(String),

    /// Network-level failure talking to a collector.
    #[error("transport error: {0}")]
    Transport(String),

    /// The collector answered with a non-success status.
    #[error("collector rejected batch with status {status}")]
    Rejected { status: u16 },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The export did not finish before its deadline.
    #[error("export timed out")]
    Timeout,
}

/// Destination for finished spans.
pub trait SpanSink: Send + Sync {
    /// Deliver one batch.
    fn export<'a>(&'a self, batch: &'a Batch) -> BoxFuture<'a, Result<(), SinkError>>;

    /// Sink name for logs and metrics labels.
    fn name(&self) -> &str;
}

/// Build the configured sink.
pub fn from_config(config: &SinkConfig) -> Result<Arc<dyn SpanSink>, SinkError> {
    let sink: Arc<dyn SpanSink> = match config {
        SinkConfig::Collector { endpoint, timeout_secs } => Arc::new(CollectorSink::new(
            endpoint,
            Duration::from_secs(*timeout_secs),
        )?),
        SinkConfig::File { path } => Arc::new(FileSink::new(path)),
        SinkConfig::Stdout => Arc::new(StdoutSink),
        SinkConfig::None => Arc::new(NoopSink),
    };
    tracing::info!(sink = sink.name(), "Span sink configured");
    Ok(sink)
}

/// Prints each batch as pretty JSON on stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl SpanSink for StdoutSink {
    fn export<'a>(&'a self, batch: &'a Batch) -> BoxFuture<'a, Result<(), SinkError>> {
        Box::pin(async move {
            let json = serde_json::to_string_pretty(batch)?;
            println!("{json}");
            Ok(())
        })
    }

    fn name(&self) -> &str {
        "stdout"
    }
}

/// Discards all spans.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl SpanSink for NoopSink {
    fn export<'a>(&'a self, _batch: &'a Batch) -> BoxFuture<'a, Result<(), SinkError>> {
        Box::pin(async { Ok(()) })
    }

    fn name(&self) -> &str {
        "none"
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Keeps every exported batch.
    #[derive(Default)]
    pub(crate) struct MemorySink {
        pub batches: Mutex<Vec<Batch>>,
    }

    impl MemorySink {
        pub fn span_names(&self) -> Vec<String> {
            self.batches
                .lock()
                .unwrap()
                .iter()
                .flat_map(|b| b.spans.iter().map(|s| s.name.clone()))
                .collect()
        }

        pub fn sequences(&self) -> Vec<u64> {
            self.batches.lock().unwrap().iter().map(|b| b.sequence).collect()
        }
    }

    impl SpanSink for MemorySink {
        fn export<'a>(&'a self, batch: &'a Batch) -> BoxFuture<'a, Result<(), SinkError>> {
            Box::pin(async move {
                self.batches.lock().unwrap().push(batch.clone());
                Ok(())
            })
        }

        fn name(&self) -> &str {
            "memory"
        }
    }

    /// Fails every export and counts the attempts.
    #[derive(Default)]
    pub(crate) struct FailingSink {
        pub attempts: AtomicUsize,
    }

    impl SpanSink for FailingSink {
        fn export<'a>(&'a self, _batch: &'a Batch) -> BoxFuture<'a, Result<(), SinkError>> {
            Box::pin(async move {
                self.attempts.fetch_add(1, Ordering::SeqCst);
                Err(SinkError::Transport("collector unreachable".into()))
            })
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    #[test]
    fn builds_each_kind() {
        let names: Vec<String> = [
            SinkConfig::default(),
            SinkConfig::File { path: "/tmp/spans.json".into() },
            SinkConfig::Stdout,
            SinkConfig::None,
        ]
        .iter()
        .map(|config| from_config(config).unwrap().name().to_string())
        .collect();
        assert_eq!(names, ["collector", "file", "stdout", "none"]);
    }

    #[test]
    fn bad_collector_endpoint_is_config_error() {
        let err = match from_config(&SinkConfig::Collector {
            endpoint: "not a url".into(),
            timeout_secs: 1,
        }) {
            Err(err) => err,
            Ok(_) => panic!("accepted a bad endpoint"),
        };
        assert!(matches!(err, SinkError::Config(_)));
    }
}
