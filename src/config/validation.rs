//! Configuration validation.
//!
//! Serde handles syntax; this module checks value ranges and formats.
//! Every problem is reported, not just the first.

use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::{EchoConfig, SinkConfig};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: must not be empty")]
    Empty { field: &'static str },

    #[error("{field}: `{value}` is not a socket address")]
    BadAddress { field: &'static str, value: String },

    #[error("telemetry.sink.endpoint: `{value}` is not an http(s) URL")]
    BadEndpoint { value: String },

    #[error("{field}: must be greater than zero")]
    Zero { field: &'static str },

    #[error("telemetry.retry_base_delay_ms ({base}) exceeds retry_max_delay_ms ({max})")]
    BackoffInverted { base: u64, max: u64 },
}

pub fn validate_config(config: &EchoConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.service.name.trim().is_empty() {
        errors.push(ValidationError::Empty { field: "service.name" });
    }

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.listener.max_body_bytes == Some(0) {
        errors.push(ValidationError::Zero { field: "listener.max_body_bytes" });
    }

    let telemetry = &config.telemetry;
    match &telemetry.sink {
        SinkConfig::Collector { endpoint, timeout_secs } => {
            let valid = Url::parse(endpoint)
                .map(|url| matches!(url.scheme(), "http" | "https") && url.has_host())
                .unwrap_or(false);
            if !valid {
                errors.push(ValidationError::BadEndpoint { value: endpoint.clone() });
            }
            if *timeout_secs == 0 {
                errors.push(ValidationError::Zero { field: "telemetry.sink.timeout_secs" });
            }
        }
        SinkConfig::File { path } if path.trim().is_empty() => {
            errors.push(ValidationError::Empty { field: "telemetry.sink.path" });
        }
        _ => {}
    }

    for (field, value) in [
        ("telemetry.batch_size", telemetry.batch_size as u64),
        ("telemetry.batch_interval_ms", telemetry.batch_interval_ms),
        ("telemetry.queue_capacity", telemetry.queue_capacity as u64),
        ("telemetry.export_attempts", u64::from(telemetry.export_attempts)),
    ] {
        if value == 0 {
            errors.push(ValidationError::Zero { field });
        }
    }

    if telemetry.retry_base_delay_ms > telemetry.retry_max_delay_ms {
        errors.push(ValidationError::BackoffInverted {
            base: telemetry.retry_base_delay_ms,
            max: telemetry.retry_max_delay_ms,
        });
    }

    if let Some(address) = &config.observability.metrics_address {
        check_address(&mut errors, "observability.metrics_address", address);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BadAddress {
            field,
            value: value.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(validate_config(&EchoConfig::default()), Ok(()));
    }

    #[test]
    fn reports_every_problem() {
        let mut config = EchoConfig::default();
        config.service.name = " ".into();
        config.listener.bind_address = "localhost".into();
        config.telemetry.sink = SinkConfig::Collector {
            endpoint: "jaeger-collector:14268".into(),
            timeout_secs: 10,
        };
        config.telemetry.batch_size = 0;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4, "{errors:?}");
        assert!(errors.contains(&ValidationError::Empty { field: "service.name" }));
        assert!(errors.contains(&ValidationError::Zero { field: "telemetry.batch_size" }));
    }

    #[test]
    fn file_sink_needs_a_path() {
        let mut config = EchoConfig::default();
        config.telemetry.sink = SinkConfig::File { path: String::new() };
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors, vec![ValidationError::Empty { field: "telemetry.sink.path" }]);
    }

    #[test]
    fn inverted_backoff_rejected() {
        let mut config = EchoConfig::default();
        config.telemetry.retry_base_delay_ms = 5000;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::BackoffInverted { base: 5000, max: 2000 }]
        );
    }
}
