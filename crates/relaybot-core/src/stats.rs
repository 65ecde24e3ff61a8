//! Lock-free counters shared by the receive path, the forwarder and the
//! observers.
//!
//! Every counter is an independent `AtomicU64`; the hot receive path never
//! contends with the progress reporter or the watchdog.

use std::sync::atomic::{AtomicU64, Ordering};

use relaybot_types::stats::StatsSnapshot;

/// Monotonic counters for one bot run.
#[derive(Debug, Default)]
pub struct BotStats {
    received: AtomicU64,
    sent: AtomicU64,
    dropped_throttled: AtomicU64,
    dropped_overflow: AtomicU64,
    failed: AtomicU64,
}

impl BotStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_throttled_drop(&self) {
        self.dropped_throttled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_overflow_drop(&self) {
        self.dropped_overflow.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Read every counter. The fields are loaded one at a time.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
            dropped_throttled: self.dropped_throttled.load(Ordering::Relaxed),
            dropped_overflow: self.dropped_overflow.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn counters_start_at_zero() {
        let stats = BotStats::new();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
    }

    #[test]
    fn each_counter_is_independent() {
        let stats = BotStats::new();
        stats.record_received();
        stats.record_received();
        stats.record_sent();
        stats.record_throttled_drop();
        stats.record_overflow_drop();
        stats.record_overflow_drop();
        stats.record_failed();

        let snap = stats.snapshot();
        assert_eq!(snap.received, 2);
        assert_eq!(snap.sent, 1);
        assert_eq!(snap.dropped_throttled, 1);
        assert_eq!(snap.dropped_overflow, 2);
        assert_eq!(snap.failed, 1);
    }

    #[test]
    fn concurrent_increments_are_not_lost() {
        let stats = Arc::new(BotStats::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let stats = Arc::clone(&stats);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        stats.record_received();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(stats.received(), 8000);
    }
}
