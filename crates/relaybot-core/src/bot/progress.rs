//! Progress reporter duty: periodic throughput log line.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use super::state::RunState;

/// Log the counters every `interval` until `stop` is observed.
pub(crate) async fn run_progress(state: Arc<RunState>, interval: Duration) {
    loop {
        if state.stop.is_cancelled() {
            break;
        }

        let snap = state.stats.snapshot();
        info!(
            received = snap.received,
            sent = snap.sent,
            dropped = snap.dropped(),
            queued = state.queue.len(),
            "messages received {} sent {}",
            snap.received,
            snap.sent
        );

        tokio::select! {
            _ = state.stop.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    info!("progress reporter done");
}
