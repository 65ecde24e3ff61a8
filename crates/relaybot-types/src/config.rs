//! Bridge configuration types for relaybot.
//!
//! `BridgeConfig` represents the `relaybot.toml` file that selects the
//! channel to subscribe to, the queue bound, the watchdog, the message source
//! and the sink. All fields have sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ConfigError;

/// Top-level configuration for one bridge process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Channel to subscribe to.
    #[serde(default)]
    pub channel: String,

    /// Server-side filter expression passed through to the subscription.
    #[serde(default)]
    pub filter: String,

    /// Stream position to resume from. Empty means "latest".
    #[serde(default)]
    pub position: String,

    /// Log every received message and every successful forward.
    #[serde(default)]
    pub verbose: bool,

    /// Maximum number of buffered messages before the oldest is evicted.
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,

    /// Terminate the process when no progress is seen for a full heartbeat interval.
    #[serde(default = "default_enable_heartbeat")]
    pub enable_heartbeat: bool,

    /// How long to run, in seconds. Absent or negative runs until a fatal error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_secs: Option<i64>,

    /// Interval between progress log lines, in milliseconds.
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,

    /// Interval between watchdog checks, in seconds.
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,

    #[serde(default)]
    pub connection: ConnectionConfig,

    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default)]
    pub sink: SinkConfig,
}

fn default_max_queue_size() -> usize {
    1000
}

fn default_enable_heartbeat() -> bool {
    true
}

fn default_progress_interval_ms() -> u64 {
    1000
}

fn default_heartbeat_interval_secs() -> u64 {
    60
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            channel: String::new(),
            filter: String::new(),
            position: String::new(),
            verbose: false,
            max_queue_size: default_max_queue_size(),
            enable_heartbeat: default_enable_heartbeat(),
            runtime_secs: None,
            progress_interval_ms: default_progress_interval_ms(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            connection: ConnectionConfig::default(),
            source: SourceConfig::default(),
            sink: SinkConfig::default(),
        }
    }
}

impl BridgeConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Check the invariants the runtime relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channel.trim().is_empty() {
            return Err(ConfigError::Invalid("channel must not be empty".to_string()));
        }
        if self.max_queue_size == 0 {
            return Err(ConfigError::Invalid(
                "max_queue_size must be at least 1".to_string(),
            ));
        }
        if self.progress_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "progress_interval_ms must be at least 1".to_string(),
            ));
        }
        if self.heartbeat_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "heartbeat_interval_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// The run duration derived from `runtime_secs`.
    pub fn runtime(&self) -> Runtime {
        Runtime::from_secs(self.runtime_secs)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }
}

/// How long a bot run lasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Runtime {
    /// Run until a fatal transport event (or an external shutdown request).
    Indefinite,
    /// Run for the given duration, or less on a fatal transport event.
    Finite(Duration),
}

impl Runtime {
    /// Map the legacy "seconds, -1 for forever" convention onto `Runtime`.
    pub fn from_secs(secs: Option<i64>) -> Self {
        match secs {
            Some(s) if s >= 0 => Self::Finite(Duration::from_secs(s.unsigned_abs())),
            _ => Self::Indefinite,
        }
    }
}

/// Credentials and endpoint for the transport session.
///
/// The secret is never serialized; `Debug` prints it redacted.
#[derive(Debug, Deserialize, Serialize)]
pub struct ConnectionConfig {
    /// Transport endpoint (URL or broker name), reported by the transport
    /// in its `Open` headers.
    #[serde(default)]
    pub endpoint: String,

    /// Role name presented during authentication.
    #[serde(default)]
    pub role: String,

    /// Role secret presented during authentication.
    #[serde(default = "empty_secret", deserialize_with = "deserialize_secret", skip_serializing)]
    pub secret: SecretString,
}

fn empty_secret() -> SecretString {
    SecretString::from("")
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(SecretString::from)
}

impl ConnectionConfig {
    pub fn new(
        endpoint: impl Into<String>,
        role: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            role: role.into(),
            secret: SecretString::from(secret.into()),
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::new("", "", "")
    }
}

impl Clone for ConnectionConfig {
    fn clone(&self) -> Self {
        Self::new(
            self.endpoint.clone(),
            self.role.clone(),
            self.secret.expose_secret(),
        )
    }
}

/// Where messages come from when the bridge runs as a standalone binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceConfig {
    /// Replay a JSON-lines file as the subscribed channel. `-` reads stdin.
    Replay { path: PathBuf },
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self::Replay {
            path: PathBuf::from("-"),
        }
    }
}

/// Where forwarded messages go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SinkConfig {
    /// One JSON document per line on standard output.
    Stdout,
    /// Append JSON lines to a file.
    File { path: PathBuf },
    /// POST each message as JSON to an HTTP endpoint.
    Webhook {
        url: String,
        #[serde(default = "default_webhook_timeout_secs")]
        timeout_secs: u64,
    },
}

fn default_webhook_timeout_secs() -> u64 {
    10
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self::Stdout
    }
}

impl SinkConfig {
    /// Parse the compact command-line form: `stdout`, `file:PATH` or an http(s) URL.
    pub fn parse_shorthand(value: &str) -> Result<Self, ConfigError> {
        if value == "stdout" {
            return Ok(Self::Stdout);
        }
        if let Some(path) = value.strip_prefix("file:") {
            if path.is_empty() {
                return Err(ConfigError::Invalid("file sink needs a path".to_string()));
            }
            return Ok(Self::File {
                path: PathBuf::from(path),
            });
        }
        if value.starts_with("http://") || value.starts_with("https://") {
            return Ok(Self::Webhook {
                url: value.to_string(),
                timeout_secs: default_webhook_timeout_secs(),
            });
        }
        Err(ConfigError::Invalid(format!("unknown sink '{value}'")))
    }
}
