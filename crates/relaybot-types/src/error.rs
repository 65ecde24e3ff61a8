use thiserror::Error;

/// Errors raised by a transport while establishing or tearing down a session.
///
/// Protocol-level failures after the session is up are reported as
/// [`ConnectionEvent`](crate::event::ConnectionEvent) variants instead.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("connection is not configured")]
    NotConfigured,

    #[error("connection is not open")]
    NotConnected,

    #[error("already subscribed to channel '{0}'")]
    AlreadySubscribed(String),

    #[error("transport error: {0}")]
    Transport(String),
}

/// Errors returned by a message sink for a single forward attempt.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("downstream is throttling requests")]
    Throttled,

    #[error("downstream rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("sink I/O error: {0}")]
    Io(String),

    #[error("message could not be encoded: {0}")]
    Encode(String),

    #[error("sink refused the message")]
    Refused,
}

/// Errors related to bridge configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to parse configuration: {0}")]
    Parse(String),
}

/// Errors that prevent a bot run from starting.
#[derive(Debug, Error)]
pub enum BotError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to connect: {0}")]
    Connect(#[from] ConnectionError),
}
