//! Forwarder duty: drain the queue into the sink.

use std::sync::Arc;

use tracing::{error, info};

use super::state::RunState;
use crate::sink::MessageSink;

/// Pop messages and hand each to the sink exactly once.
///
/// Exits as soon as `stop` is observed, even if a message was popped
/// concurrently with the stop request; that message is discarded.
pub(crate) async fn run_forwarder<S: MessageSink>(state: Arc<RunState>, sink: Arc<S>, verbose: bool) {
    loop {
        let popped = state.queue.pop().await;

        if state.stop.is_cancelled() {
            break;
        }

        let Some(message) = popped else {
            if state.queue.is_closed() {
                break;
            }
            continue;
        };

        match sink.forward(&message, verbose, &state.throttle).await {
            Ok(()) => {
                state.stats.record_sent();
                if verbose {
                    info!(sink = sink.name(), "forwarded message");
                }
            }
            Err(e) => {
                state.stats.record_failed();
                error!(sink = sink.name(), error = %e, "error forwarding message");
            }
        }

        if state.stop.is_cancelled() {
            break;
        }
    }

    info!("forwarder done");
}
