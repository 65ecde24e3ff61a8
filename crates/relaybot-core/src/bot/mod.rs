//! Bot orchestrator: subscribe, buffer, forward, supervise.
//!
//! `Bot::run` drives one session through
//! `Idle -> Connecting -> Running -> Draining -> Stopped`:
//!
//! - **Connecting:** configure the connection, install the event callback,
//!   connect, start the progress, watchdog and forwarder duties.
//! - **Running:** tick every `poll_interval`, checking the fatal flag, until
//!   the configured runtime elapses, a fatal transport event arrives, or a
//!   `ShutdownHandle` fires.
//! - **Draining:** disconnect, cancel `stop`, close the queue.
//! - **Stopped:** join progress, watchdog and forwarder, in that order.
//!
//! Every duty is owned by a `Duties` group; if the run future is dropped
//! part-way, the group still signals and aborts them.

pub mod events;
mod forwarder;
mod progress;
pub mod settings;
pub mod state;
pub mod watchdog;

use std::sync::Arc;

use relaybot_types::config::{ConnectionConfig, Runtime};
use relaybot_types::error::BotError;
use relaybot_types::event::ConnectionEvent;
use relaybot_types::stats::RunReport;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::connection::{Connection, EventCallback};
use crate::sink::MessageSink;

use self::events::EventHandler;
use self::state::RunState;
use self::watchdog::{StallHandler, terminate_process};

pub use self::settings::BotSettings;

/// Requests an orderly, non-fatal end of a running bot from outside.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    token: CancellationToken,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Bridges one subscription to one sink.
///
/// The sink is fixed at construction, so a bot can never run without one.
pub struct Bot<S> {
    sink: Arc<S>,
    on_stall: StallHandler,
    shutdown: CancellationToken,
}

impl<S: MessageSink> Bot<S> {
    pub fn new(sink: S) -> Self {
        Self::with_shared_sink(Arc::new(sink))
    }

    pub fn with_shared_sink(sink: Arc<S>) -> Self {
        Self {
            sink,
            on_stall: Arc::new(terminate_process),
            shutdown: CancellationToken::new(),
        }
    }

    /// Replace the stall action. The default terminates the process.
    pub fn with_stall_handler(mut self, on_stall: StallHandler) -> Self {
        self.on_stall = on_stall;
        self
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            token: self.shutdown.clone(),
        }
    }

    pub fn sink(&self) -> &Arc<S> {
        &self.sink
    }

    /// Run the bridge until the runtime elapses, a fatal transport event
    /// arrives, or shutdown is requested.
    ///
    /// Returns `Err` only if the session could not be started; transport
    /// failures after that end the run with a fatal `RunReport`.
    pub async fn run<C: Connection>(
        &self,
        connection: Arc<C>,
        connection_config: &ConnectionConfig,
        settings: &BotSettings,
    ) -> Result<RunReport, BotError> {
        let run_id = Uuid::now_v7();
        let span = info_span!("bot_run", %run_id, channel = %settings.channel);
        self.run_session(run_id, connection, connection_config, settings)
            .instrument(span)
            .await
    }

    async fn run_session<C: Connection>(
        &self,
        run_id: Uuid,
        connection: Arc<C>,
        connection_config: &ConnectionConfig,
        settings: &BotSettings,
    ) -> Result<RunReport, BotError> {
        let started = Instant::now();
        let state = Arc::new(RunState::new(settings.max_queue_size));

        // Connecting
        connection.configure(connection_config);
        let handler = Arc::new(EventHandler::new(
            &connection,
            Arc::clone(&state),
            settings.channel.clone(),
            settings.filter.clone(),
            settings.position.clone(),
            settings.verbose,
        ));
        let on_event: EventCallback = Arc::new(move |event: ConnectionEvent| handler.handle(event));
        connection.set_event_callback(on_event);

        if let Err(e) = connection.connect().await {
            error!(error = %e, "failed to connect");
            return Err(BotError::Connect(e));
        }

        let duties = Duties::start(Arc::clone(&state), Arc::clone(&self.sink), settings, &self.on_stall);

        // Running
        self.wait(&state, settings).await;

        // Draining
        connection.disconnect().await;
        duties.shutdown().await;

        let stats = state.stats.snapshot();
        let fatal = state.fatal.reason().map(str::to_string);
        match &fatal {
            Some(reason) => error!(
                received = stats.received,
                sent = stats.sent,
                reason = %reason,
                "bot run ended on fatal transport event"
            ),
            None => info!(
                received = stats.received,
                sent = stats.sent,
                dropped = stats.dropped(),
                failed = stats.failed,
                "bot run completed"
            ),
        }

        Ok(RunReport {
            run_id,
            stats,
            fatal,
            elapsed: started.elapsed(),
        })
    }

    async fn wait(&self, state: &RunState, settings: &BotSettings) {
        // A finite runtime too large to add to the clock has no deadline.
        let deadline = match settings.runtime {
            Runtime::Finite(duration) => Instant::now().checked_add(duration),
            Runtime::Indefinite => None,
        };

        loop {
            if state.fatal.is_raised() {
                break;
            }

            let tick = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        break;
                    }
                    remaining.min(settings.poll_interval)
                }
                None => settings.poll_interval,
            };

            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("shutdown requested");
                    break;
                }
                _ = tokio::time::sleep(tick) => {}
            }
        }
    }
}

impl<S> std::fmt::Debug for Bot<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bot")
            .field("shutdown_requested", &self.shutdown.is_cancelled())
            .finish()
    }
}

/// The three auxiliary duties of one run, joined in a fixed order.
struct Duties {
    state: Arc<RunState>,
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl Duties {
    fn start<S: MessageSink>(
        state: Arc<RunState>,
        sink: Arc<S>,
        settings: &BotSettings,
        on_stall: &StallHandler,
    ) -> Self {
        let progress = tokio::spawn(
            progress::run_progress(Arc::clone(&state), settings.progress_interval).in_current_span(),
        );
        let watchdog = tokio::spawn(
            watchdog::run_watchdog(
                Arc::clone(&state),
                settings.enable_heartbeat,
                settings.heartbeat_interval,
                Arc::clone(on_stall),
            )
            .in_current_span(),
        );
        let forwarder = tokio::spawn(
            forwarder::run_forwarder(Arc::clone(&state), sink, settings.verbose).in_current_span(),
        );

        Self {
            state,
            handles: vec![
                ("progress reporter", progress),
                ("heartbeat watchdog", watchdog),
                ("forwarder", forwarder),
            ],
        }
    }

    /// Signal stop and await every duty.
    async fn shutdown(mut self) {
        self.state.request_stop();
        for (name, handle) in self.handles.drain(..) {
            if let Err(e) = handle.await {
                warn!(duty = name, error = %e, "duty ended abnormally");
            }
        }
    }
}

impl Drop for Duties {
    fn drop(&mut self) {
        if self.handles.is_empty() {
            return;
        }
        self.state.request_stop();
        for (_, handle) in &self.handles {
            handle.abort();
        }
    }
}
