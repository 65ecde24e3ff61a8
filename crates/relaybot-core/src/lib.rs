//! Bot runtime and trait definitions for relaybot.
//!
//! This crate defines the "ports" (the `Connection` and `MessageSink` traits)
//! that the infrastructure layer implements, plus the runtime that drives
//! them: the bounded queue, the shared counters and flags, and the `Bot`
//! orchestrator with its forwarder, progress and watchdog duties. It depends
//! only on `relaybot-types` -- never on `relaybot-infra` or any I/O crate.

pub mod bot;
pub mod connection;
pub mod queue;
pub mod sink;
pub mod stats;

#[cfg(test)]
mod testing;

pub use bot::watchdog::StallHandler;
pub use bot::{Bot, BotSettings, ShutdownHandle};
pub use connection::{Connection, EventCallback, MessageCallback};
pub use queue::MessageQueue;
pub use sink::{FnSink, MessageSink, ThrottleHandle};
pub use stats::BotStats;
