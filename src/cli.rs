//! Command-line interface.

use std::path::PathBuf;

use clap::Parser;

use crate::config::{self, validate_config, ConfigError, EchoConfig, SinkConfig};

#[derive(Debug, Parser)]
#[command(name = "echo-trace")]
#[command(about = "HTTP echo service exporting a trace span per request", long_about = None)]
#[command(version)]
pub struct Cli {
    /// TOML configuration file; built-in defaults when omitted.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override `listener.bind_address`.
    #[arg(long)]
    pub bind: Option<String>,

    /// Export spans to this file instead of the configured sink.
    #[arg(long, conflicts_with = "sink_stdout")]
    pub sink_file: Option<String>,

    /// Export spans to stdout instead of the configured sink.
    #[arg(long)]
    pub sink_stdout: bool,

    /// Do not record request bodies on spans.
    #[arg(long)]
    pub no_trace_payload: bool,

    /// Validate the configuration and exit.
    #[arg(long)]
    pub check: bool,
}

impl Cli {
    /// Load the configuration file (or defaults), apply overrides, validate.
    pub fn load_config(&self) -> Result<EchoConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => config::load_config(path)?,
            None => EchoConfig::default(),
        };
        self.apply(&mut config);
        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }

    pub fn apply(&self, config: &mut EchoConfig) {
        if let Some(bind) = &self.bind {
            config.listener.bind_address = bind.clone();
        }
        if let Some(path) = &self.sink_file {
            config.telemetry.sink = SinkConfig::File { path: path.clone() };
        }
        if self.sink_stdout {
            config.telemetry.sink = SinkConfig::Stdout;
        }
        if self.no_trace_payload {
            config.telemetry.trace_payload = false;
        }
    }
}
