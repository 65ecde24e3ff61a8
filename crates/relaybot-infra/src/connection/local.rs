//! In-process pub/sub broker and its `Connection` implementation.
//!
//! `LocalBroker` keeps one `tokio::sync::broadcast` channel per channel name
//! and stamps every published message with a broker-wide sequence number,
//! which subscribers receive as the stream position. `LocalConnection` speaks
//! to a broker with the same session lifecycle a remote transport has:
//! open, authenticate, subscribe, close.
//!
//! The broker delivers live messages only. Filters and start positions are
//! accepted but not evaluated.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use dashmap::DashMap;
use secrecy::ExposeSecret;
use relaybot_core::connection::{Connection, EventCallback, MessageCallback};
use relaybot_types::Message;
use relaybot_types::config::ConnectionConfig;
use relaybot_types::error::ConnectionError;
use relaybot_types::event::ConnectionEvent;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::EventSlot;

/// Default buffer size for each broadcast channel.
const CHANNEL_BUFFER: usize = 1024;

/// Protocol name reported in the `Open` headers.
const PROTOCOL: &str = "relaybot-local/1";

/// In-process publish/subscribe broker.
pub struct LocalBroker {
    name: String,
    credentials: Option<(String, String)>,
    channels: DashMap<String, broadcast::Sender<(u64, Message)>>,
    sequence: AtomicU64,
    channel_capacity: usize,
}

impl LocalBroker {
    /// Create an open broker that accepts any credentials.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            credentials: None,
            channels: DashMap::new(),
            sequence: AtomicU64::new(0),
            channel_capacity: CHANNEL_BUFFER,
        }
    }

    /// Require this role/secret pair from connecting sessions.
    pub fn with_credentials(mut self, role: impl Into<String>, secret: impl Into<String>) -> Self {
        self.credentials = Some((role.into(), secret.into()));
        self
    }

    /// Override the per-channel buffer; slow subscribers past it lag.
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Publish a message. Returns the number of subscribers it reached.
    ///
    /// A channel whose last subscriber has gone is removed here.
    pub fn publish(&self, channel: &str, message: Message) -> usize {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        let reached = match self.channels.get(channel) {
            Some(sender) => sender.send((seq, message)).unwrap_or(0),
            None => {
                debug!(%channel, "no subscribers, message dropped");
                return 0;
            }
        };
        if reached == 0
            && self
                .channels
                .remove_if(channel, |_, sender| sender.receiver_count() == 0)
                .is_some()
        {
            debug!(%channel, "last subscriber gone, channel removed");
        }
        reached
    }

    /// Number of channels that currently hold a broadcast sender.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .get(channel)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }

    fn authenticate(&self, config: &ConnectionConfig) -> bool {
        match &self.credentials {
            Some((role, secret)) => {
                config.role == *role && config.secret.expose_secret() == secret.as_str()
            }
            None => true,
        }
    }

    fn subscribe(&self, channel: &str) -> broadcast::Receiver<(u64, Message)> {
        self.channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.channel_capacity).0)
            .subscribe()
    }
}

impl std::fmt::Debug for LocalBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalBroker")
            .field("name", &self.name)
            .field("channels", &self.channels.len())
            .field("requires_auth", &self.credentials.is_some())
            .finish()
    }
}

/// A session against a [`LocalBroker`].
pub struct LocalConnection {
    shared: Arc<Shared>,
}

struct Shared {
    broker: Arc<LocalBroker>,
    config: Mutex<Option<ConnectionConfig>>,
    events: EventSlot,
    session: Mutex<Option<Session>>,
}

struct Session {
    token: CancellationToken,
    pumps: Vec<(String, JoinHandle<()>)>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|p| p.into_inner())
}

impl LocalConnection {
    pub fn new(broker: Arc<LocalBroker>) -> Self {
        Self {
            shared: Arc::new(Shared {
                broker,
                config: Mutex::new(None),
                events: EventSlot::default(),
                session: Mutex::new(None),
            }),
        }
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.shared.session).is_some()
    }
}

impl Connection for LocalConnection {
    fn configure(&self, config: &ConnectionConfig) {
        *lock(&self.shared.config) = Some(config.clone());
    }

    fn set_event_callback(&self, callback: EventCallback) {
        self.shared.events.set(callback);
    }

    async fn connect(&self) -> Result<(), ConnectionError> {
        let config = lock(&self.shared.config)
            .clone()
            .ok_or(ConnectionError::NotConfigured)?;

        {
            let mut session = lock(&self.shared.session);
            if session.is_some() {
                return Ok(());
            }
            *session = Some(Session {
                token: CancellationToken::new(),
                pumps: Vec::new(),
            });
        }

        let mut headers = BTreeMap::from([
            ("protocol".to_string(), PROTOCOL.to_string()),
            ("server".to_string(), self.shared.broker.name().to_string()),
        ]);
        if !config.endpoint.is_empty() {
            headers.insert("endpoint".to_string(), config.endpoint.clone());
        }
        self.shared.events.emit(ConnectionEvent::Open { headers });

        if self.shared.broker.authenticate(&config) {
            self.shared.events.emit(ConnectionEvent::Authenticated);
        } else {
            lock(&self.shared.session).take();
            self.shared.events.emit(ConnectionEvent::AuthenticationError {
                message: format!("invalid credentials for role '{}'", config.role),
            });
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
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| ConnectionError::Transport(e.to_string()))?;

        if !filter.is_empty() || !position.is_empty() {
            debug!(%channel, %filter, %position, "local broker ignores filter and position");
        }

        {
            let mut session = lock(&self.shared.session);
            let session = session.as_mut().ok_or(ConnectionError::NotConnected)?;
            if session.pumps.iter().any(|(name, _)| name == channel) {
                return Err(ConnectionError::AlreadySubscribed(channel.to_string()));
            }

            let receiver = self.shared.broker.subscribe(channel);
            let pump = runtime.spawn(pump(
                Arc::clone(&self.shared),
                channel.to_string(),
                receiver,
                session.token.clone(),
                on_message,
            ));
            session.pumps.push((channel.to_string(), pump));
        }

        self.shared.events.emit(ConnectionEvent::Subscribed {
            subscription_id: channel.to_string(),
        });
        Ok(())
    }

    async fn disconnect(&self) {
        let Some(session) = lock(&self.shared.session).take() else {
            return;
        };

        session.token.cancel();
        for (channel, pump) in session.pumps {
            if let Err(e) = pump.await {
                debug!(%channel, error = %e, "subscription pump ended abnormally");
            }
        }

        self.shared.events.emit(ConnectionEvent::Closed {
            reason: "disconnect requested".to_string(),
        });
    }
}

async fn pump(
    shared: Arc<Shared>,
    channel: String,
    mut receiver: broadcast::Receiver<(u64, Message)>,
    token: CancellationToken,
    on_message: MessageCallback,
) {
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            received = receiver.recv() => match received {
                Ok((seq, message)) => on_message(message, seq.to_string()),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    shared.events.emit(ConnectionEvent::Error {
                        message: format!("subscription {channel} lagged, {skipped} messages skipped"),
                    });
                }
                Err(broadcast::error::RecvError::Closed) => {
                    shared.events.emit(ConnectionEvent::Unsubscribed {
                        subscription_id: channel.clone(),
                    });
                    break;
                }
            },
        }
    }
}

impl std::fmt::Debug for LocalConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalConnection")
            .field("broker", &self.shared.broker.name())
            .field("connected", &self.is_connected())
            .finish()
    }
}
