//! Bounded FIFO message queue with drop-oldest overflow.
//!
//! `MessageQueue` is the single point of backpressure between the transport's
//! receive callback (producer) and the forwarder (consumer). The producer side
//! never blocks: once the queue holds `capacity` messages, adding a new one
//! evicts the oldest. The consumer side waits on a `tokio::sync::Notify` until
//! data arrives or the queue is closed.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use relaybot_types::Message;
use tokio::sync::Notify;

/// Bounded, drop-oldest, multi-producer message queue.
///
/// `add` and `len` are synchronous so they can be called from a transport's
/// own threads. `pop` is async and is woken either by `add` or by `close`.
pub struct MessageQueue {
    items: Mutex<VecDeque<Message>>,
    capacity: usize,
    notify: Notify,
    closed: AtomicBool,
}

impl MessageQueue {
    /// Create a queue holding at most `capacity` messages.
    ///
    /// A capacity of zero is treated as one so that the newest message is
    /// always retained.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity.min(4096))),
            capacity,
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Append a message at the tail, evicting the head if the queue is full.
    ///
    /// Returns `true` when an older message was evicted to make room.
    pub fn add(&self, message: Message) -> bool {
        let evicted = {
            let mut items = self.lock();
            let evicted = if items.len() >= self.capacity {
                items.pop_front().is_some()
            } else {
                false
            };
            items.push_back(message);
            evicted
        };
        self.notify.notify_one();
        evicted
    }

    /// Wait for the next message.
    ///
    /// Returns `None` only once the queue has been closed and is empty, or
    /// when a close races with a wakeup; callers treat `None` as "check your
    /// stop condition".
    pub async fn pop(&self) -> Option<Message> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking state so a concurrent add/close is not missed.
            notified.as_mut().enable();

            if let Some(message) = self.lock().pop_front() {
                return Some(message);
            }
            if self.is_closed() {
                return None;
            }

            notified.await;
        }
    }

    /// Take the head without waiting.
    pub fn try_pop(&self) -> Option<Message> {
        self.lock().pop_front()
    }

    /// Close the queue and wake every waiting consumer.
    ///
    /// Messages already buffered stay poppable; `pop` returns `None` once they
    /// are gone.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Current number of buffered messages. Diagnostic only.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Message>> {
        // A panic while holding the lock cannot leave the deque half-updated.
        self.items.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for MessageQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .field("closed", &self.is_closed())
            .finish()
    }
}
