//! Startup orchestration.
//!
//! Subsystems come up in dependency order: telemetry, then the listener,
//! then the server. Traffic is only accepted once everything else is ready.
//! Any startup error is fatal and maps to its own exit code.

use std::future::Future;

use thiserror::Error;
use tokio::time::Instant;

use crate::config::EchoConfig;
use crate::http::HttpServer;
use crate::lifecycle::{ShutdownCoordinator, ShutdownReport};
use crate::net::{self, ListenerError};
use crate::telemetry::{self, TelemetryError};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    #[error(transparent)]
    Listener(#[from] ListenerError),
}

impl StartupError {
    pub fn exit_code(&self) -> u8 {
        match self {
            StartupError::Telemetry(_) => 2,
            StartupError::Listener(_) => 1,
        }
    }
}

/// Run the service until `interrupt` resolves or the listener fails.
pub async fn serve<F>(config: &EchoConfig, interrupt: F) -> Result<ShutdownReport, StartupError>
where
    F: Future<Output = ()>,
{
    let tracer = telemetry::install(config)?;

    let listener = match net::bind(&config.listener).await {
        Ok(listener) => listener,
        Err(e) => {
            let report = tracer
                .shutdown(Instant::now() + config.shutdown.flush_timeout())
                .await;
            tracing::debug!(exported = report.exported, "Exporter stopped after bind failure");
            return Err(e.into());
        }
    };

    let server = HttpServer::new(config, tracer.clone()).spawn(listener);
    let report = ShutdownCoordinator::new(&config.shutdown)
        .run(server, &tracer, interrupt)
        .await;
    Ok(report)
}
