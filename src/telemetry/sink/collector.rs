//! Collector-over-HTTP sink: each batch is POSTed as one JSON document.

use std::time::Duration;

use futures_util::future::BoxFuture;
use url::Url;

use crate::telemetry::batch::Batch;
use crate::telemetry::sink::{SinkError, SpanSink};

pub struct CollectorSink {
    client: reqwest::Client,
    endpoint: Url,
}

impl CollectorSink {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, SinkError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| SinkError::Config(format!("collector endpoint `{endpoint}`: {e}")))?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("echo-trace/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SinkError::Config(e.to_string()))?;

        Ok(Self { client, endpoint })
    }
}

impl SpanSink for CollectorSink {
    fn export<'a>(&'a self, batch: &'a Batch) -> BoxFuture<'a, Result<(), SinkError>> {
        Box::pin(async move {
            let response = self
                .client
                .post(self.endpoint.clone())
                .json(batch)
                .send()
                .await
                .map_err(|e| SinkError::Transport(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                return Err(SinkError::Rejected {
                    status: status.as_u16(),
                });
            }

            tracing::debug!(
                endpoint = %self.endpoint,
                sequence = batch.sequence,
                spans = batch.spans.len(),
                "Batch accepted by collector"
            );
            Ok(())
        })
    }

    fn name(&self) -> &str {
        "collector"
    }
}
