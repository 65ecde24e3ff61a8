//! Stall watchdog duty: a dead man's switch on the progress counters.
//!
//! If neither `received` nor `sent` moves during a full interval the pipeline
//! is assumed wedged in a way the process cannot recover from, and the
//! process is terminated so a supervisor can restart it.

use std::sync::Arc;
use std::time::Duration;

use relaybot_types::stats::StatsSnapshot;
use tracing::{error, info};

use super::state::RunState;

/// Invoked when the watchdog detects a stall.
pub type StallHandler = Arc<dyn Fn(StatsSnapshot) + Send + Sync>;

/// Exit status used when the watchdog terminates the process.
pub const STALL_EXIT_CODE: i32 = 1;

/// Default stall action: terminate the whole process. The watchdog has
/// already logged the stall.
pub fn terminate_process(_snapshot: StatsSnapshot) {
    std::process::exit(STALL_EXIT_CODE);
}

/// Compare the counter signature every `interval`; call `on_stall` and
/// return if it did not change.
///
/// When disabled the duty only waits for `stop`, so shutdown joins every
/// duty the same way.
pub(crate) async fn run_watchdog(
    state: Arc<RunState>,
    enabled: bool,
    interval: Duration,
    on_stall: StallHandler,
) {
    if !enabled {
        state.stop.cancelled().await;
        return;
    }

    let mut previous: Option<(u64, u64)> = None;
    loop {
        if state.stop.is_cancelled() {
            break;
        }

        let current = state.stats.snapshot();
        if previous == Some(current.signature()) {
            error!(
                received = current.received,
                sent = current.sent,
                interval_secs = interval.as_secs(),
                "stall detected: no messages received or sent for a full heartbeat interval"
            );
            on_stall(current);
            return;
        }
        previous = Some(current.signature());

        tokio::select! {
            _ = state.stop.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    info!("heartbeat watchdog done");
}
