//! JSON-lines sink: one compact JSON document per line on any async writer.

use std::path::Path;

use relaybot_core::sink::{MessageSink, ThrottleHandle};
use relaybot_types::Message;
use relaybot_types::error::SinkError;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::debug;

/// Writes each forwarded message as a line of JSON.
///
/// Writes are serialized through an async mutex and flushed per message, so
/// a line is either fully written or reported as failed.
pub struct JsonLinesSink<W> {
    name: String,
    writer: Mutex<W>,
}

impl<W> JsonLinesSink<W>
where
    W: AsyncWrite + Send + Unpin + 'static,
{
    pub fn new(name: impl Into<String>, writer: W) -> Self {
        Self {
            name: name.into(),
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl JsonLinesSink<tokio::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new("stdout", tokio::io::stdout())
    }
}

impl JsonLinesSink<tokio::fs::File> {
    /// Open `path` for appending, creating it if needed.
    pub async fn append_to(path: &Path) -> Result<Self, SinkError> {
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|e| SinkError::Io(format!("cannot open {}: {e}", path.display())))?;
        Ok(Self::new(format!("file:{}", path.display()), file))
    }
}

impl<W> MessageSink for JsonLinesSink<W>
where
    W: AsyncWrite + Send + Unpin + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn forward(
        &self,
        message: &Message,
        verbose: bool,
        _throttle: &ThrottleHandle,
    ) -> Result<(), SinkError> {
        let mut line = serde_json::to_vec(message).map_err(|e| SinkError::Encode(e.to_string()))?;
        line.push(b'\n');

        let mut writer = self.writer.lock().await;
        writer
            .write_all(&line)
            .await
            .map_err(|e| SinkError::Io(e.to_string()))?;
        writer.flush().await.map_err(|e| SinkError::Io(e.to_string()))?;

        if verbose {
            debug!(sink = %self.name, bytes = line.len(), "message written");
        }
        Ok(())
    }
}

impl<W> std::fmt::Debug for JsonLinesSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonLinesSink")
            .field("name", &self.name)
            .finish()
    }
}
