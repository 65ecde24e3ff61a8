//! Transport implementations.
//!
//! - `local` -- `LocalBroker` / `LocalConnection`, an in-process pub/sub broker
//! - `replay` -- `ReplayConnection`, replays a JSON-lines file as a channel

pub mod local;
pub mod replay;

pub use local::{LocalBroker, LocalConnection};
pub use replay::ReplayConnection;

use std::sync::Mutex;

use relaybot_core::connection::EventCallback;
use relaybot_types::event::ConnectionEvent;

/// Holder for the single event callback of a connection.
///
/// The callback is cloned out of the lock before it runs, so it may call
/// back into the connection.
#[derive(Default)]
pub(crate) struct EventSlot {
    callback: Mutex<Option<EventCallback>>,
}

impl EventSlot {
    pub fn set(&self, callback: EventCallback) {
        *self.callback.lock().unwrap_or_else(|p| p.into_inner()) = Some(callback);
    }

    pub fn emit(&self, event: ConnectionEvent) {
        let callback = self
            .callback
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone();
        match callback {
            Some(callback) => callback(event),
            None => tracing::debug!(event = event.name(), "no event callback installed"),
        }
    }
}
