//! Counter snapshots and the final report of a bot run.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Point-in-time copy of the bot's counters.
///
/// Each field is read independently, so a snapshot taken while the bot is
/// running is not a consistent cut: `sent` may briefly lag or lead what
/// `received` suggests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Messages accepted from the transport and enqueued.
    pub received: u64,
    /// Messages the sink accepted.
    pub sent: u64,
    /// Messages shed at the receive callback while throttled.
    pub dropped_throttled: u64,
    /// Messages evicted from the queue by the drop-oldest policy.
    pub dropped_overflow: u64,
    /// Messages the sink rejected.
    pub failed: u64,
}

impl StatsSnapshot {
    /// The progress signature the stall watchdog compares between checks.
    pub fn signature(&self) -> (u64, u64) {
        (self.received, self.sent)
    }

    /// Total messages lost to throttling and overflow.
    pub fn dropped(&self) -> u64 {
        self.dropped_throttled + self.dropped_overflow
    }
}

/// Outcome of one `Bot::run` invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub stats: StatsSnapshot,
    /// The fatal transport event that ended the run, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fatal: Option<String>,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn is_fatal(&self) -> bool {
        self.fatal.is_some()
    }

    /// `-1` when the run ended on a fatal transport event, otherwise the
    /// number of messages forwarded.
    pub fn code(&self) -> i64 {
        if self.is_fatal() {
            -1
        } else {
            i64::try_from(self.stats.sent).unwrap_or(i64::MAX)
        }
    }
}
