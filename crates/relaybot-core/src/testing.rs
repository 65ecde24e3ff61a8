//! In-memory `Connection` used by the runtime's unit tests.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use relaybot_types::Message;
use relaybot_types::config::ConnectionConfig;
use relaybot_types::error::ConnectionError;
use relaybot_types::event::ConnectionEvent;

use crate::connection::{Connection, EventCallback, MessageCallback};

/// A connection whose events and messages are driven by the test.
///
/// `connect` emits the scripted connect events (by default `Open` then
/// `Authenticated`); `subscribe` records its arguments, emits `Subscribed`
/// and delivers the backlog.
pub(crate) struct ScriptedConnection {
    connect_events: Vec<ConnectionEvent>,
    backlog: Mutex<Vec<Message>>,
    on_event: Mutex<Option<EventCallback>>,
    on_message: Mutex<Option<MessageCallback>>,
    subscriptions: Mutex<Vec<(String, String, String)>>,
    configured: Mutex<Option<ConnectionConfig>>,
    delivered: AtomicU64,
    disconnected: AtomicBool,
    fail_connect: bool,
    fail_subscribe: bool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap()
}

impl ScriptedConnection {
    pub fn new() -> Self {
        Self {
            connect_events: vec![ConnectionEvent::open(), ConnectionEvent::Authenticated],
            backlog: Mutex::new(Vec::new()),
            on_event: Mutex::new(None),
            on_message: Mutex::new(None),
            subscriptions: Mutex::new(Vec::new()),
            configured: Mutex::new(None),
            delivered: AtomicU64::new(0),
            disconnected: AtomicBool::new(false),
            fail_connect: false,
            fail_subscribe: false,
        }
    }

    pub fn with_connect_events(mut self, events: Vec<ConnectionEvent>) -> Self {
        self.connect_events = events;
        self
    }

    pub fn with_backlog(self, messages: impl IntoIterator<Item = Message>) -> Self {
        lock(&self.backlog).extend(messages);
        self
    }

    pub fn failing_connect(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    pub fn failing_subscribe(mut self) -> Self {
        self.fail_subscribe = true;
        self
    }

    pub fn emit(&self, event: ConnectionEvent) {
        let callback = lock(&self.on_event).clone();
        if let Some(callback) = callback {
            callback(event);
        }
    }

    pub fn deliver(&self, message: Message) {
        if self.disconnected.load(Ordering::SeqCst) {
            return;
        }
        let callback = lock(&self.on_message).clone();
        if let Some(callback) = callback {
            let position = self.delivered.fetch_add(1, Ordering::SeqCst);
            callback(message, position.to_string());
        }
    }

    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::SeqCst)
    }

    pub fn is_subscribed(&self) -> bool {
        lock(&self.on_message).is_some()
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }

    pub fn subscriptions(&self) -> Vec<(String, String, String)> {
        lock(&self.subscriptions).clone()
    }

    pub fn configured_role(&self) -> Option<String> {
        lock(&self.configured).as_ref().map(|c| c.role.clone())
    }
}

impl Connection for ScriptedConnection {
    fn configure(&self, config: &ConnectionConfig) {
        *lock(&self.configured) = Some(config.clone());
    }

    fn set_event_callback(&self, callback: EventCallback) {
        *lock(&self.on_event) = Some(callback);
    }

    async fn connect(&self) -> Result<(), ConnectionError> {
        if self.fail_connect {
            return Err(ConnectionError::Transport("connection refused".to_string()));
        }
        for event in self.connect_events.clone() {
            self.emit(event);
        }
        Ok(())
    }

    fn subscribe(
        &self,
        channel: &str,
        filter: &str,
        position: &str,
        on_message: MessageCallback,
    ) -> Result<(), ConnectionError> {
        if self.fail_subscribe {
            return Err(ConnectionError::NotConnected);
        }
        lock(&self.subscriptions).push((
            channel.to_string(),
            filter.to_string(),
            position.to_string(),
        ));
        *lock(&self.on_message) = Some(on_message);
        self.emit(ConnectionEvent::Subscribed {
            subscription_id: channel.to_string(),
        });

        let backlog: Vec<Message> = lock(&self.backlog).drain(..).collect();
        for message in backlog {
            self.deliver(message);
        }
        Ok(())
    }

    async fn disconnect(&self) {
        self.disconnected.store(true, Ordering::SeqCst);
        lock(&self.on_message).take();
        self.emit(ConnectionEvent::Closed {
            reason: "disconnect requested".to_string(),
        });
    }
}
