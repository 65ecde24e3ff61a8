//! MessageSink trait definition and the throttle flag sinks may raise.
//!
//! A sink is the downstream consumer of the bridge (a log, a file, an HTTP
//! endpoint). The forwarder hands it one message at a time and never retries;
//! any retry policy belongs to the sink itself.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use relaybot_types::Message;
use relaybot_types::error::SinkError;

/// Shared "downstream is overloaded" flag.
///
/// Once engaged, the receive callback sheds every incoming message instead
/// of enqueuing it. The flag is one-way for the lifetime of a run.
#[derive(Debug, Clone, Default)]
pub struct ThrottleHandle {
    engaged: Arc<AtomicBool>,
}

impl ThrottleHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start shedding input. Returns `true` if this call engaged the flag.
    pub fn engage(&self) -> bool {
        !self.engaged.swap(true, Ordering::SeqCst)
    }

    pub fn is_engaged(&self) -> bool {
        self.engaged.load(Ordering::SeqCst)
    }
}

/// Trait for downstream message consumers.
///
/// Uses native async fn in traits (RPITIT, Rust 2024 edition). Implementations
/// live in relaybot-infra (e.g., `WebhookSink`) or are closures wrapped in
/// [`FnSink`].
pub trait MessageSink: Send + Sync + 'static {
    /// Human-readable sink name for log fields.
    fn name(&self) -> &str;

    /// Deliver one message. `verbose` mirrors the bot's verbosity setting;
    /// `throttle` may be engaged when the downstream reports saturation.
    fn forward(
        &self,
        message: &Message,
        verbose: bool,
        throttle: &ThrottleHandle,
    ) -> impl Future<Output = Result<(), SinkError>> + Send;
}

/// Adapts a synchronous `Fn(&Message, bool, &ThrottleHandle) -> bool` closure
/// into a [`MessageSink`]. Returning `false` counts as a forwarding failure.
pub struct FnSink<F> {
    name: String,
    func: F,
}

impl<F> FnSink<F>
where
    F: Fn(&Message, bool, &ThrottleHandle) -> bool + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> MessageSink for FnSink<F>
where
    F: Fn(&Message, bool, &ThrottleHandle) -> bool + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn forward(
        &self,
        message: &Message,
        verbose: bool,
        throttle: &ThrottleHandle,
    ) -> impl Future<Output = Result<(), SinkError>> + Send {
        let accepted = (self.func)(message, verbose, throttle);
        async move {
            if accepted {
                Ok(())
            } else {
                Err(SinkError::Refused)
            }
        }
    }
}

impl<F> std::fmt::Debug for FnSink<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnSink").field("name", &self.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn throttle_engages_once() {
        let throttle = ThrottleHandle::new();
        assert!(!throttle.is_engaged());
        assert!(throttle.engage());
        assert!(!throttle.engage());
        assert!(throttle.is_engaged());
    }

    #[test]
    fn throttle_clones_share_state() {
        let throttle = ThrottleHandle::new();
        let other = throttle.clone();
        other.engage();
        assert!(throttle.is_engaged());
    }

    #[tokio::test]
    async fn fn_sink_maps_bool_to_result() {
        let sink = FnSink::new("odd-only", |msg: &Message, _verbose, _throttle: &ThrottleHandle| {
            msg["n"].as_u64().is_some_and(|n| n % 2 == 1)
        });
        let throttle = ThrottleHandle::new();

        assert!(sink.forward(&json!({"n": 1}), false, &throttle).await.is_ok());
        assert!(matches!(
            sink.forward(&json!({"n": 2}), false, &throttle).await,
            Err(SinkError::Refused)
        ));
        assert_eq!(sink.name(), "odd-only");
    }

    #[tokio::test]
    async fn fn_sink_can_engage_throttle() {
        let sink = FnSink::new("saturating", |_msg: &Message, _verbose, throttle: &ThrottleHandle| {
            throttle.engage();
            true
        });
        let throttle = ThrottleHandle::new();
        sink.forward(&json!({}), true, &throttle).await.unwrap();
        assert!(throttle.is_engaged());
    }
}
