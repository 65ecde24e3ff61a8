//! JSON-lines replay transport.
//!
//! `ReplayConnection` presents a file (or stdin, when the path is `-`) as a
//! single subscribable channel: each non-blank line is parsed as one JSON
//! message and delivered with its 1-based line number as the stream position.
//! An unreadable source is reported as a `HandshakeError`; a malformed line is
//! a recoverable `Error` and the replay continues with the next line.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use relaybot_core::connection::{Connection, EventCallback, MessageCallback};
use relaybot_types::Message;
use relaybot_types::config::ConnectionConfig;
use relaybot_types::error::ConnectionError;
use relaybot_types::event::ConnectionEvent;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::EventSlot;

type Reader = Box<dyn AsyncBufRead + Send + Unpin>;

/// Replays recorded messages as a live subscription.
pub struct ReplayConnection {
    shared: Arc<Shared>,
}

struct Shared {
    path: PathBuf,
    line_delay: Duration,
    config: Mutex<Option<ConnectionConfig>>,
    events: EventSlot,
    session: Mutex<Option<Session>>,
}

struct Session {
    token: CancellationToken,
    reader: Option<Reader>,
    pump: Option<JoinHandle<()>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|p| p.into_inner())
}

fn is_stdin(path: &Path) -> bool {
    path.as_os_str() == "-"
}

async fn open(path: &Path) -> std::io::Result<Reader> {
    if is_stdin(path) {
        return Ok(Box::new(BufReader::new(tokio::io::stdin())));
    }
    let file = tokio::fs::File::open(path).await?;
    Ok(Box::new(BufReader::new(file)))
}

impl ReplayConnection {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_line_delay(path, Duration::ZERO)
    }

    /// Pause `delay` between lines, to approximate a live feed.
    pub fn with_line_delay(path: impl Into<PathBuf>, delay: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                path: path.into(),
                line_delay: delay,
                config: Mutex::new(None),
                events: EventSlot::default(),
                session: Mutex::new(None),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    fn source_name(&self) -> String {
        if is_stdin(&self.shared.path) {
            "stdin".to_string()
        } else {
            self.shared.path.display().to_string()
        }
    }
}

impl Connection for ReplayConnection {
    fn configure(&self, config: &ConnectionConfig) {
        *lock(&self.shared.config) = Some(config.clone());
    }

    fn set_event_callback(&self, callback: EventCallback) {
        self.shared.events.set(callback);
    }

    async fn connect(&self) -> Result<(), ConnectionError> {
        let endpoint = lock(&self.shared.config)
            .as_ref()
            .map(|config| config.endpoint.clone())
            .ok_or(ConnectionError::NotConfigured)?;
        if lock(&self.shared.session).is_some() {
            return Ok(());
        }

        let source = self.source_name();
        let reader = match open(&self.shared.path).await {
            Ok(reader) => reader,
            Err(e) => {
                self.shared.events.emit(ConnectionEvent::HandshakeError {
                    message: format!("cannot open replay source {source}: {e}"),
                });
                return Ok(());
            }
        };

        *lock(&self.shared.session) = Some(Session {
            token: CancellationToken::new(),
            reader: Some(reader),
            pump: None,
        });

        let mut headers = BTreeMap::from([
            ("protocol".to_string(), "relaybot-replay/1".to_string()),
            ("source".to_string(), source),
        ]);
        if !endpoint.is_empty() {
            headers.insert("endpoint".to_string(), endpoint);
        }
        self.shared.events.emit(ConnectionEvent::Open { headers });
        self.shared.events.emit(ConnectionEvent::Authenticated);
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
            debug!(%channel, %filter, %position, "replay ignores filter and position");
        }

        {
            let mut session = lock(&self.shared.session);
            let session = session.as_mut().ok_or(ConnectionError::NotConnected)?;
            let reader = session
                .reader
                .take()
                .ok_or_else(|| ConnectionError::AlreadySubscribed(channel.to_string()))?;

            session.pump = Some(runtime.spawn(replay(
                Arc::clone(&self.shared),
                channel.to_string(),
                reader,
                session.token.clone(),
                on_message,
            )));
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
        if let Some(pump) = session.pump {
            if let Err(e) = pump.await {
                debug!(error = %e, "replay task ended abnormally");
            }
        }

        self.shared.events.emit(ConnectionEvent::Closed {
            reason: "disconnect requested".to_string(),
        });
    }
}

async fn replay(
    shared: Arc<Shared>,
    channel: String,
    reader: Reader,
    token: CancellationToken,
    on_message: MessageCallback,
) {
    let mut lines = reader.lines();
    let mut line_no: u64 = 0;

    loop {
        let next = tokio::select! {
            biased;
            _ = token.cancelled() => return,
            next = lines.next_line() => next,
        };

        let line = match next {
            Ok(Some(line)) => line,
            Ok(None) => {
                info!(%channel, lines = line_no, "replay source exhausted");
                shared.events.emit(ConnectionEvent::Unsubscribed {
                    subscription_id: channel,
                });
                return;
            }
            Err(e) => {
                shared.events.emit(ConnectionEvent::Error {
                    message: format!("replay read failed after line {line_no}: {e}"),
                });
                return;
            }
        };

        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<Message>(&line) {
            Ok(message) => on_message(message, line_no.to_string()),
            Err(e) => shared.events.emit(ConnectionEvent::Error {
                message: format!("line {line_no}: {e}"),
            }),
        }

        if !shared.line_delay.is_zero() {
            tokio::select! {
                biased;
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(shared.line_delay) => {}
            }
        }
    }
}

impl std::fmt::Debug for ReplayConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplayConnection")
            .field("path", &self.shared.path)
            .field("line_delay", &self.shared.line_delay)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaybot_core::sink::{FnSink, ThrottleHandle};
    use relaybot_core::{Bot, BotSettings};
    use relaybot_types::config::Runtime;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn replay_file(lines: &[&str]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
        file.flush().unwrap();
        file
    }

    fn recorder(conn: &ReplayConnection) -> Arc<Mutex<Vec<ConnectionEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        conn.set_event_callback(Arc::new(move |event| sink.lock().unwrap().push(event)));
        events
    }

    async fn wait_for_event(
        events: &Arc<Mutex<Vec<ConnectionEvent>>>,
        pred: impl Fn(&ConnectionEvent) -> bool,
    ) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !events.lock().unwrap().iter().any(&pred) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("event never arrived");
    }

    #[tokio::test]
    async fn missing_file_is_a_handshake_error() {
        let dir = tempfile::tempdir().unwrap();
        let conn = ReplayConnection::new(dir.path().join("absent.jsonl"));
        let events = recorder(&conn);
        conn.configure(&ConnectionConfig::default());

        conn.connect().await.unwrap();

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], ConnectionEvent::HandshakeError { message } if message.contains("absent.jsonl")));
    }

    #[tokio::test]
    async fn open_headers_report_configured_endpoint() {
        let file = replay_file(&[]);
        let conn = ReplayConnection::new(file.path());
        let events = recorder(&conn);
        conn.configure(&ConnectionConfig::new("replay://fixtures", "", ""));
        conn.connect().await.unwrap();

        let events = events.lock().unwrap();
        let ConnectionEvent::Open { headers } = &events[0] else {
            panic!("expected open, got {:?}", events[0]);
        };
        assert_eq!(headers["endpoint"], "replay://fixtures");
        assert_eq!(headers["protocol"], "relaybot-replay/1");
        assert_eq!(events[1], ConnectionEvent::Authenticated);
    }

    #[tokio::test]
    async fn connect_requires_configuration() {
        let file = replay_file(&[]);
        let conn = ReplayConnection::new(file.path());
        assert!(matches!(
            conn.connect().await,
            Err(ConnectionError::NotConfigured)
        ));
    }

    #[tokio::test]
    async fn lines_are_delivered_with_line_positions() {
        let file = replay_file(&[r#"{"n":1}"#, "", "not json", r#"{"n":2}"#]);
        let conn = ReplayConnection::new(file.path());
        let events = recorder(&conn);
        conn.configure(&ConnectionConfig::default());
        conn.connect().await.unwrap();

        let received = Arc::new(Mutex::new(Vec::new()));
        let into = Arc::clone(&received);
        conn.subscribe(
            "replay",
            "",
            "",
            Arc::new(move |msg, position| into.lock().unwrap().push((msg, position))),
        )
        .unwrap();

        wait_for_event(&events, |e| matches!(e, ConnectionEvent::Unsubscribed { .. })).await;
        conn.disconnect().await;

        assert_eq!(
            *received.lock().unwrap(),
            vec![
                (json!({"n": 1}), "1".to_string()),
                (json!({"n": 2}), "4".to_string()),
            ]
        );
        let events = events.lock().unwrap();
        assert!(events
            .iter()
            .any(|e| matches!(e, ConnectionEvent::Error { message } if message.starts_with("line 3"))));
        assert!(matches!(events.last(), Some(ConnectionEvent::Closed { .. })));
    }

    #[tokio::test]
    async fn second_subscribe_is_rejected() {
        let file = replay_file(&[r#"{"n":1}"#]);
        let conn = ReplayConnection::new(file.path());
        conn.configure(&ConnectionConfig::default());
        conn.connect().await.unwrap();

        conn.subscribe("a", "", "", Arc::new(|_, _| {})).unwrap();
        let again = conn.subscribe("b", "", "", Arc::new(|_, _| {}));
        assert!(matches!(again, Err(ConnectionError::AlreadySubscribed(_))));
        conn.disconnect().await;
    }

    #[tokio::test]
    async fn disconnect_interrupts_a_slow_replay() {
        let lines: Vec<String> = (0..100).map(|i| json!({"n": i}).to_string()).collect();
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        let file = replay_file(&refs);
        let conn = ReplayConnection::with_line_delay(file.path(), Duration::from_millis(50));
        conn.configure(&ConnectionConfig::default());
        conn.connect().await.unwrap();

        let count = Arc::new(Mutex::new(0usize));
        let counter = Arc::clone(&count);
        conn.subscribe("a", "", "", Arc::new(move |_, _| *counter.lock().unwrap() += 1))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(120)).await;
        tokio::time::timeout(Duration::from_secs(1), conn.disconnect())
            .await
            .expect("disconnect must not wait for the replay to finish");

        let seen = *count.lock().unwrap();
        assert!(seen > 0 && seen < 100);
    }

    #[tokio::test]
    async fn bot_forwards_replayed_messages() {
        let file = replay_file(&[r#"{"a":1}"#, r#"{"a":2}"#, r#"{"a":3}"#]);
        let conn = Arc::new(ReplayConnection::new(file.path()));
        let bot = Bot::new(FnSink::new(
            "accept",
            |_: &Message, _: bool, _: &ThrottleHandle| true,
        ));
        let settings = BotSettings {
            enable_heartbeat: false,
            runtime: Runtime::Finite(Duration::from_millis(300)),
            poll_interval: Duration::from_millis(20),
            ..BotSettings::new("replay")
        };

        let report = bot
            .run(conn, &ConnectionConfig::default(), &settings)
            .await
            .unwrap();

        assert_eq!(report.stats.received, 3);
        assert_eq!(report.code(), 3);
    }
}
