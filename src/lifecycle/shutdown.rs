//! Shutdown coordination.
//!
//! # State Machine
//! ```text
//! Running ──(interrupt | serve task ends)──► Draining ──► Terminated
//! ```
//!
//! The trigger is consumed exactly once; whichever of the interrupt and the
//! serve task finishes first decides the exit code.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::ShutdownConfig;
use crate::net::{InFlight, ListenerError};
use crate::telemetry::{FlushReport, Tracer};

/// Stop signal shared with long-running tasks.
///
/// Provides a broadcast channel that any task can subscribe to.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// A future resolving once `trigger` is called or every sender is gone.
    pub fn signalled(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.subscribe();
        async move {
            let _ = rx.recv().await;
        }
    }

    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Coordinator phase, observable through [`ShutdownCoordinator::phase`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Running,
    Draining,
    Terminated,
}

/// What started the shutdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownCause {
    Interrupt,
    ListenerFailed(String),
}

impl fmt::Display for ShutdownCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownCause::Interrupt => write!(f, "interrupt"),
            ShutdownCause::ListenerFailed(reason) => write!(f, "listener failed: {reason}"),
        }
    }
}

/// Outcome of a completed shutdown.
#[derive(Debug, Clone)]
pub struct ShutdownReport {
    pub cause: ShutdownCause,
    /// Requests still in flight when the grace period ran out.
    pub abandoned: usize,
    pub flush: FlushReport,
}

impl ShutdownReport {
    /// 0 for an interrupt, 1 for a listener failure. Draining problems do
    /// not change it.
    pub fn exit_code(&self) -> u8 {
        match self.cause {
            ShutdownCause::Interrupt => 0,
            ShutdownCause::ListenerFailed(_) => 1,
        }
    }
}

/// A serve task together with what is needed to stop it.
pub struct RunningServer {
    task: JoinHandle<Result<(), ListenerError>>,
    stop: Shutdown,
    in_flight: InFlight,
}

impl RunningServer {
    pub fn new(task: JoinHandle<Result<(), ListenerError>>, stop: Shutdown, in_flight: InFlight) -> Self {
        Self { task, stop, in_flight }
    }

    pub fn in_flight(&self) -> &InFlight {
        &self.in_flight
    }
}

pub struct ShutdownCoordinator {
    grace_period: Duration,
    flush_timeout: Duration,
    phase: watch::Sender<Phase>,
}

impl ShutdownCoordinator {
    pub fn new(config: &ShutdownConfig) -> Self {
        let (phase, _) = watch::channel(Phase::Running);
        Self {
            grace_period: config.grace_period(),
            flush_timeout: config.flush_timeout(),
            phase,
        }
    }

    pub fn phase(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    /// Wait for `interrupt` or the serve task to finish, then drain and flush.
    pub async fn run<F>(self, server: RunningServer, tracer: &Tracer, interrupt: F) -> ShutdownReport
    where
        F: Future<Output = ()>,
    {
        let RunningServer {
            mut task,
            stop,
            in_flight,
        } = server;

        let (cause, serving) = tokio::select! {
            () = interrupt => (ShutdownCause::Interrupt, true),
            result = &mut task => {
                let reason = match result {
                    Ok(Ok(())) => "server exited unexpectedly".to_string(),
                    Ok(Err(e)) => e.to_string(),
                    Err(e) => format!("serve task failed: {e}"),
                };
                (ShutdownCause::ListenerFailed(reason), false)
            }
        };

        self.phase.send_replace(Phase::Draining);
        tracing::info!(
            cause = %cause,
            in_flight = in_flight.active(),
            grace_period_secs = self.grace_period.as_secs_f64(),
            "Shutting down"
        );
        stop.trigger();

        let mut abandoned = 0;
        if serving {
            match tokio::time::timeout(self.grace_period, &mut task).await {
                Ok(Ok(Ok(()))) => tracing::info!("In-flight requests drained"),
                Ok(Ok(Err(e))) => tracing::error!(error = %e, "Server failed while draining"),
                Ok(Err(e)) => tracing::error!(error = %e, "Serve task failed while draining"),
                Err(_) => {
                    abandoned = in_flight.active();
                    tracing::warn!(abandoned, "Grace period elapsed, abandoning in-flight requests");
                    task.abort();
                }
            }
        }

        let flush = tracer.shutdown(Instant::now() + self.flush_timeout).await;
        for span in &flush.unsent {
            tracing::warn!(
                trace_id = %span.trace_id,
                span_id = %span.span_id,
                span = %span.name,
                "Span not exported before exit"
            );
        }

        self.phase.send_replace(Phase::Terminated);
        tracing::info!(
            cause = %cause,
            abandoned,
            spans_exported = flush.exported,
            spans_unsent = flush.unsent.len(),
            "Shutdown complete"
        );

        ShutdownReport {
            cause,
            abandoned,
            flush,
        }
    }
}
