//! Connection trait definition.
//!
//! A `Connection` owns the transport session to the publish/subscribe
//! service. It reports session-level occurrences through a single event
//! callback and delivers channel messages through a per-subscription
//! callback. Both callbacks may be invoked from the transport's own threads
//! or tasks, concurrently with everything else, and must not be blocked on.
//!
//! Implementations live in relaybot-infra (e.g., `LocalConnection`).

use std::future::Future;
use std::sync::Arc;

use relaybot_types::Message;
use relaybot_types::config::ConnectionConfig;
use relaybot_types::error::ConnectionError;
use relaybot_types::event::ConnectionEvent;

/// Receives every session-level event.
pub type EventCallback = Arc<dyn Fn(ConnectionEvent) + Send + Sync>;

/// Receives every message of a subscription together with its stream position.
pub type MessageCallback = Arc<dyn Fn(Message, String) + Send + Sync>;

/// Trait for transport sessions.
///
/// Methods take `&self`; implementations keep their mutable session state
/// behind interior mutability so the session can be shared with the event
/// callback (which subscribes once authenticated).
pub trait Connection: Send + Sync + 'static {
    /// Store endpoint and credentials for the next `connect`.
    fn configure(&self, config: &ConnectionConfig);

    /// Install the event callback, replacing any previous one.
    fn set_event_callback(&self, callback: EventCallback);

    /// Open the session. Handshake and authentication outcomes are reported
    /// as events; an `Err` means the session could not be started at all.
    fn connect(&self) -> impl Future<Output = Result<(), ConnectionError>> + Send;

    /// Subscribe to `channel`. `on_message` is invoked for every message
    /// until `disconnect`. Must not block.
    fn subscribe(
        &self,
        channel: &str,
        filter: &str,
        position: &str,
        on_message: MessageCallback,
    ) -> Result<(), ConnectionError>;

    /// Close the session. Message callbacks stop promptly afterwards.
    fn disconnect(&self) -> impl Future<Output = ()> + Send;
}
