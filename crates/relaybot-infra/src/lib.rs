//! Infrastructure layer for relaybot.
//!
//! Contains implementations of the `Connection` and `MessageSink` traits
//! defined in `relaybot-core`: an in-process pub/sub broker, a JSON-lines
//! replay source, and stdout, file and webhook sinks.

pub mod connection;
pub mod sink;
