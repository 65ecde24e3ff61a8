//! Sink implementations and construction from `SinkConfig`.

pub mod lines;
pub mod webhook;

pub use lines::JsonLinesSink;
pub use webhook::WebhookSink;

/// JSON lines on standard output.
pub type StdoutSink = JsonLinesSink<tokio::io::Stdout>;

/// JSON lines appended to a file.
pub type FileSink = JsonLinesSink<tokio::fs::File>;

use std::time::Duration;

use relaybot_core::sink::{MessageSink, ThrottleHandle};
use relaybot_types::Message;
use relaybot_types::config::SinkConfig;
use relaybot_types::error::SinkError;

/// Any sink selectable from configuration.
#[derive(Debug)]
pub enum ConfiguredSink {
    Stdout(StdoutSink),
    File(FileSink),
    Webhook(WebhookSink),
}

/// Build the sink described by `config`.
pub async fn build_sink(config: &SinkConfig) -> Result<ConfiguredSink, SinkError> {
    Ok(match config {
        SinkConfig::Stdout => ConfiguredSink::Stdout(JsonLinesSink::stdout()),
        SinkConfig::File { path } => ConfiguredSink::File(JsonLinesSink::append_to(path).await?),
        SinkConfig::Webhook { url, timeout_secs } => ConfiguredSink::Webhook(WebhookSink::new(
            url.clone(),
            Duration::from_secs(*timeout_secs),
        )?),
    })
}

impl MessageSink for ConfiguredSink {
    fn name(&self) -> &str {
        match self {
            Self::Stdout(sink) => sink.name(),
            Self::File(sink) => sink.name(),
            Self::Webhook(sink) => sink.name(),
        }
    }

    async fn forward(
        &self,
        message: &Message,
        verbose: bool,
        throttle: &ThrottleHandle,
    ) -> Result<(), SinkError> {
        match self {
            Self::Stdout(sink) => sink.forward(message, verbose, throttle).await,
            Self::File(sink) => sink.forward(message, verbose, throttle).await,
            Self::Webhook(sink) => sink.forward(message, verbose, throttle).await,
        }
    }
}
