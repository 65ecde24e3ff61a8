//! Shared domain types for relaybot.
//!
//! This crate contains the types exchanged between the bot runtime, the
//! transports and the sinks: connection events, bridge configuration, stats
//! snapshots and their associated error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, thiserror.

pub mod config;
pub mod error;
pub mod event;
pub mod stats;

/// An opaque structured message received from the bus.
///
/// The runtime never inspects message contents; it only moves them from the
/// transport to the sink.
pub type Message = serde_json::Value;
