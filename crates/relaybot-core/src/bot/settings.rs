//! Per-run settings for the bot orchestrator.

use std::time::Duration;

use relaybot_types::config::{BridgeConfig, Runtime};
use relaybot_types::error::ConfigError;

/// How often the wait loop wakes up to check for a fatal event.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Everything `Bot::run` needs besides the connection and the sink.
#[derive(Debug, Clone)]
pub struct BotSettings {
    pub channel: String,
    pub filter: String,
    pub position: String,
    pub verbose: bool,
    pub max_queue_size: usize,
    pub enable_heartbeat: bool,
    pub runtime: Runtime,
    /// Interval between progress log lines.
    pub progress_interval: Duration,
    /// Interval between stall watchdog checks.
    pub heartbeat_interval: Duration,
    /// Wait-loop tick.
    pub poll_interval: Duration,
}

impl BotSettings {
    /// Settings for `channel` with every other knob at its default.
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            filter: String::new(),
            position: String::new(),
            verbose: false,
            max_queue_size: 1000,
            enable_heartbeat: true,
            runtime: Runtime::Indefinite,
            progress_interval: Duration::from_secs(1),
            heartbeat_interval: Duration::from_secs(60),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Build validated settings from a bridge configuration.
    pub fn from_config(config: &BridgeConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            channel: config.channel.clone(),
            filter: config.filter.clone(),
            position: config.position.clone(),
            verbose: config.verbose,
            max_queue_size: config.max_queue_size,
            enable_heartbeat: config.enable_heartbeat,
            runtime: config.runtime(),
            progress_interval: config.progress_interval(),
            heartbeat_interval: config.heartbeat_interval(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }
}
