//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the echo
//! server. All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the echo server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct EchoConfig {
    /// Service identity attached to every span.
    pub service: ServiceConfig,

    /// Listener configuration (bind address, body cap).
    pub listener: ListenerConfig,

    /// Span recording and export settings.
    pub telemetry: TelemetryConfig,

    /// Graceful shutdown timings.
    pub shutdown: ShutdownConfig,

    /// Logging and metrics settings.
    pub observability: ObservabilityConfig,
}

/// Service identity.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Service name (`service.name`).
    pub name: String,

    /// Service version (`service.version`).
    pub version: String,

    /// Deployment environment tag (`deployment.environment`).
    pub environment: String,

    /// Extra resource attributes.
    pub attributes: BTreeMap<String, String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "echo-server".to_string(),
            version: "v0.1.1".to_string(),
            environment: "demo".to_string(),
            attributes: BTreeMap::new(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum request body size in bytes. Unbounded when absent.
    pub max_body_bytes: Option<usize>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_body_bytes: None,
        }
    }
}

impl ListenerConfig {
    /// Body cap as passed to the body reader.
    pub fn body_limit(&self) -> usize {
        self.max_body_bytes.unwrap_or(usize::MAX)
    }
}

/// Where finished spans are sent.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SinkConfig {
    /// POST each batch as JSON to a collector endpoint.
    Collector {
        endpoint: String,
        #[serde(default = "default_collector_timeout")]
        timeout_secs: u64,
    },
    /// Append each batch as pretty JSON to a local file.
    File { path: String },
    /// Print each batch to stdout.
    Stdout,
    /// Discard everything.
    None,
}

fn default_collector_timeout() -> u64 {
    10
}

impl Default for SinkConfig {
    fn default() -> Self {
        SinkConfig::Collector {
            endpoint: "http://jaeger-collector:14268/api/traces".to_string(),
            timeout_secs: default_collector_timeout(),
        }
    }
}

/// What the echo handler does when reading the body fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BodyErrorMode {
    /// 500 with the error text, error recorded on the active span.
    #[default]
    Annotate,
    /// Uniform 500 from the error type, no span annotation.
    Propagate,
}

/// Span recording and export configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Export destination.
    pub sink: SinkConfig,

    /// Record the request body as the `request.message` span attribute.
    pub trace_payload: bool,

    /// Body read failure behaviour.
    pub body_error_mode: BodyErrorMode,

    /// Spans per batch before an early flush.
    pub batch_size: usize,

    /// Maximum time a span waits in a partial batch, in milliseconds.
    pub batch_interval_ms: u64,

    /// Capacity of the queue between request tasks and the export worker.
    pub queue_capacity: usize,

    /// Attempts per batch, including the first.
    pub export_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub retry_base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub retry_max_delay_ms: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            sink: SinkConfig::default(),
            trace_payload: true,
            body_error_mode: BodyErrorMode::Annotate,
            batch_size: 512,
            batch_interval_ms: 5000,
            queue_capacity: 2048,
            export_attempts: 3,
            retry_base_delay_ms: 100,
            retry_max_delay_ms: 2000,
        }
    }
}

/// Graceful shutdown configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Time in-flight requests get to finish, in seconds.
    pub grace_period_secs: u64,

    /// Time the span flush gets before giving up, in seconds.
    pub flush_timeout_secs: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: 10,
            flush_timeout_secs: 5,
        }
    }
}

impl ShutdownConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    pub fn flush_timeout(&self) -> Duration {
        Duration::from_secs(self.flush_timeout_secs)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins.
    pub log_level: String,

    /// Log line format.
    pub log_format: LogFormat,

    /// Prometheus listener address. Metrics export is off when absent.
    pub metrics_address: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_address: None,
        }
    }
}
