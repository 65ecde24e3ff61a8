//! HTTP webhook sink.
//!
//! POSTs each message as a JSON body. A 2xx response is a successful forward.
//! `429 Too Many Requests` engages the bot's throttle, so further input is
//! shed for the rest of the run; any other status fails the single message.

use std::time::Duration;

use relaybot_core::sink::{MessageSink, ThrottleHandle};
use relaybot_types::Message;
use relaybot_types::error::SinkError;
use reqwest::StatusCode;
use tracing::{debug, warn};

pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("relaybot/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SinkError::Io(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl MessageSink for WebhookSink {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn forward(
        &self,
        message: &Message,
        verbose: bool,
        throttle: &ThrottleHandle,
    ) -> Result<(), SinkError> {
        let response = self
            .client
            .post(&self.url)
            .json(message)
            .send()
            .await
            .map_err(|e| SinkError::Io(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            if verbose {
                debug!(url = %self.url, status = status.as_u16(), "webhook accepted message");
            }
            return Ok(());
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            if throttle.engage() {
                warn!(url = %self.url, "webhook is rate limiting, shedding further input");
            }
            return Err(SinkError::Throttled);
        }

        let body = response.text().await.unwrap_or_default();
        Err(SinkError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

impl std::fmt::Debug for WebhookSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookSink").field("url", &self.url).finish()
    }
}
