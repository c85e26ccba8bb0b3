//! echo-trace
//!
//! ```text
//!     Client Request        ┌──────────────────────────────────────────────┐
//!     ──────────────────────┼─▶ request id ─▶ access log ─▶ recovery ─┐    │
//!                           │                                        ▼    │
//!     Client Response       │                            span stage ─▶ echo│
//!     ◀─────────────────────┼────────────────────────────────────────┘    │
//!                           │                      │ sealed span           │
//!                           │                      ▼                       │
//!                           │        batch processor ─▶ sink (collector,   │
//!                           │                                file, stdout) │
//!                           └──────────────────────────────────────────────┘
//! ```
//!
//! Exit codes: 0 after an interrupt, 1 on listener failure, 2 on invalid
//! configuration or telemetry setup failure.

use std::process::ExitCode;

use clap::Parser;

use echo_trace::cli::Cli;
use echo_trace::lifecycle;
use echo_trace::observability::{logging, metrics};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match cli.load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("echo-trace: {e}");
            return ExitCode::from(2);
        }
    };

    if cli.check {
        println!("configuration OK");
        return ExitCode::SUCCESS;
    }

    if let Err(e) = logging::init(&config.observability) {
        eprintln!("echo-trace: {e}");
        return ExitCode::from(2);
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        service = %config.service.name,
        bind_address = %config.listener.bind_address,
        "echo-trace starting"
    );

    if let Some(address) = &config.observability.metrics_address {
        match address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics endpoint");
                }
            }
            Err(e) => tracing::error!(metrics_address = %address, error = %e, "Failed to parse metrics address"),
        }
    }

    match lifecycle::serve(&config, lifecycle::interrupt()).await {
        Ok(report) => ExitCode::from(report.exit_code()),
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            ExitCode::from(e.exit_code())
        }
    }
}
