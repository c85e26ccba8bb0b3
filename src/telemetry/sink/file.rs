//! Local file sink: appends each batch as a pretty-printed JSON document.

use std::path::{Path, PathBuf};

use futures_util::future::BoxFuture;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

use crate::telemetry::batch::Batch;
use crate::telemetry::sink::{SinkError, SpanSink};

pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl SpanSink for FileSink {
    fn export<'a>(&'a self, batch: &'a Batch) -> BoxFuture<'a, Result<(), SinkError>> {
        Box::pin(async move {
            let mut document = serde_json::to_string_pretty(batch)?;
            document.push('\n');

            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await?;
            file.write_all(document.as_bytes()).await?;
            file.flush().await?;
            Ok(())
        })
    }

    fn name(&self) -> &str {
        "file"
    }
}
