//! Transport event classification and the receive-path callbacks.
//!
//! `classify` decides what an event means for the run; `EventHandler`
//! performs the side effects (logging, subscribing, raising the fatal flag)
//! and builds the per-message callback that feeds the queue.

use std::sync::{Arc, Weak};

use relaybot_types::Message;
use relaybot_types::event::ConnectionEvent;
use tracing::{debug, error, info, warn};

use super::state::RunState;
use crate::connection::{Connection, MessageCallback};

/// What the bot does in response to a transport event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventAction {
    /// Informational; log and continue.
    Log,
    /// The session is authenticated; issue the subscription.
    Subscribe,
    /// A recoverable error; log at error severity and continue.
    Recoverable,
    /// A non-recoverable error; log and end the run.
    Fatal,
}

/// Map an event onto the action the bot takes.
pub fn classify(event: &ConnectionEvent) -> EventAction {
    match event {
        ConnectionEvent::Authenticated => EventAction::Subscribe,
        ConnectionEvent::Open { .. }
        | ConnectionEvent::Closed { .. }
        | ConnectionEvent::Subscribed { .. }
        | ConnectionEvent::Unsubscribed { .. }
        | ConnectionEvent::Published { .. }
        | ConnectionEvent::Pong { .. } => EventAction::Log,
        ConnectionEvent::Error { .. } => EventAction::Recoverable,
        ConnectionEvent::HandshakeError { .. }
        | ConnectionEvent::AuthenticationError { .. }
        | ConnectionEvent::SubscriptionError { .. } => EventAction::Fatal,
    }
}

/// Event callback state for one run.
///
/// Holds the connection weakly: the connection owns the callback, so a
/// strong reference here would keep both alive forever.
pub(crate) struct EventHandler<C> {
    connection: Weak<C>,
    state: Arc<RunState>,
    channel: String,
    filter: String,
    position: String,
    verbose: bool,
}

impl<C: Connection> EventHandler<C> {
    pub fn new(
        connection: &Arc<C>,
        state: Arc<RunState>,
        channel: String,
        filter: String,
        position: String,
        verbose: bool,
    ) -> Self {
        Self {
            connection: Arc::downgrade(connection),
            state,
            channel,
            filter,
            position,
            verbose,
        }
    }

    pub fn handle(&self, event: ConnectionEvent) {
        match classify(&event) {
            EventAction::Subscribe => {
                info!(channel = %self.channel, "subscriber authenticated");
                self.subscribe();
            }
            EventAction::Fatal => {
                error!(event = event.name(), "subscriber: {event}");
                self.state.fatal.raise(event.to_string());
            }
            EventAction::Recoverable => {
                error!(event = event.name(), "subscriber: {event}");
            }
            EventAction::Log => self.log(&event),
        }
    }

    fn log(&self, event: &ConnectionEvent) {
        match event {
            ConnectionEvent::Open { headers } => {
                info!("subscriber connected");
                for (name, value) in headers {
                    info!(header = %name, "{name}: {value}");
                }
            }
            ConnectionEvent::Published { message_id } => {
                // The bot never publishes, so an ack is unexpected.
                warn!(message_id, "unexpected publish acknowledgement");
            }
            ConnectionEvent::Pong { .. } => debug!("subscriber: {event}"),
            _ => info!(event = event.name(), "subscriber: {event}"),
        }
    }

    fn subscribe(&self) {
        let Some(connection) = self.connection.upgrade() else {
            debug!("connection dropped before subscribe");
            return;
        };

        let on_message = message_callback(Arc::clone(&self.state), self.verbose);
        if let Err(e) =
            connection.subscribe(&self.channel, &self.filter, &self.position, on_message)
        {
            error!(channel = %self.channel, error = %e, "subscribe request failed");
            self.state.fatal.raise(format!("subscribe failed: {e}"));
        }
    }
}

/// Build the per-message callback: shed while throttled, otherwise count
/// and enqueue. Never blocks.
pub(crate) fn message_callback(state: Arc<RunState>, verbose: bool) -> MessageCallback {
    Arc::new(move |message: Message, position: String| {
        if verbose {
            info!(%position, "subscriber received message {message}");
        }

        if state.throttle.is_engaged() {
            state.stats.record_throttled_drop();
            return;
        }

        state.stats.record_received();
        if state.queue.add(message) {
            state.stats.record_overflow_drop();
            debug!(capacity = state.queue.capacity(), "queue full, dropped oldest message");
        }
    })
}
