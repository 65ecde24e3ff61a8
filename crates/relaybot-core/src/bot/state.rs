//! State shared by every duty of a single bot run.

use std::sync::OnceLock;

use tokio_util::sync::CancellationToken;

use crate::queue::MessageQueue;
use crate::sink::ThrottleHandle;
use crate::stats::BotStats;

/// One-way "a non-recoverable transport event happened" flag.
///
/// The first reason wins; later raises are ignored.
#[derive(Debug, Default)]
pub struct FatalSignal {
    reason: OnceLock<String>,
}

impl FatalSignal {
    /// Record a fatal reason. Returns `true` if this call set the flag.
    pub fn raise(&self, reason: impl Into<String>) -> bool {
        self.reason.set(reason.into()).is_ok()
    }

    pub fn is_raised(&self) -> bool {
        self.reason.get().is_some()
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.get().map(String::as_str)
    }
}

/// Queue, counters and flags owned by one `Bot::run` invocation.
#[derive(Debug)]
pub(crate) struct RunState {
    pub queue: MessageQueue,
    pub stats: BotStats,
    pub throttle: ThrottleHandle,
    pub fatal: FatalSignal,
    /// Orchestrated shutdown. Cancelled once, never reset.
    pub stop: CancellationToken,
}

impl RunState {
    pub fn new(max_queue_size: usize) -> Self {
        Self {
            queue: MessageQueue::new(max_queue_size),
            stats: BotStats::new(),
            throttle: ThrottleHandle::new(),
            fatal: FatalSignal::default(),
            stop: CancellationToken::new(),
        }
    }

    /// Signal every duty to finish and wake a forwarder blocked in `pop`.
    ///
    /// `stop` is cancelled before the queue is closed so a woken forwarder
    /// always observes it.
    pub fn request_stop(&self) {
        self.stop.cancel();
        self.queue.close();
    }
}
