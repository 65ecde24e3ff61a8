//! Transport event types delivered to the bot's event callback.
//!
//! `ConnectionEvent` is the closed set of session-level occurrences a
//! transport reports. Message payloads travel through the separate
//! per-subscription callback, never through this enum.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Session-level events emitted by a transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConnectionEvent {
    /// The underlying connection is open. Carries the handshake headers.
    Open {
        #[serde(default)]
        headers: BTreeMap<String, String>,
    },

    /// The connection was closed, by either side.
    Closed { reason: String },

    /// The session is authenticated and may subscribe.
    Authenticated,

    /// A subscription is active.
    Subscribed { subscription_id: String },

    /// A subscription was removed.
    Unsubscribed { subscription_id: String },

    /// A recoverable protocol or transport error.
    Error { message: String },

    /// Acknowledgement of a publish issued on this session.
    Published { message_id: u64 },

    /// Keep-alive response.
    Pong { message: String },

    /// The protocol handshake failed.
    HandshakeError { message: String },

    /// The server rejected the session credentials.
    AuthenticationError { message: String },

    /// The server rejected the subscription request.
    SubscriptionError { message: String },
}

impl ConnectionEvent {
    /// Short, stable name of the variant for log fields.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Open { .. } => "open",
            Self::Closed { .. } => "closed",
            Self::Authenticated => "authenticated",
            Self::Subscribed { .. } => "subscribed",
            Self::Unsubscribed { .. } => "unsubscribed",
            Self::Error { .. } => "error",
            Self::Published { .. } => "published",
            Self::Pong { .. } => "pong",
            Self::HandshakeError { .. } => "handshake_error",
            Self::AuthenticationError { .. } => "authentication_error",
            Self::SubscriptionError { .. } => "subscription_error",
        }
    }

    /// Convenience constructor for an `Open` event without headers.
    pub fn open() -> Self {
        Self::Open {
            headers: BTreeMap::new(),
        }
    }
}

impl fmt::Display for ConnectionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open { .. } | Self::Authenticated => write!(f, "{}", self.name()),
            Self::Closed { reason } => write!(f, "closed: {reason}"),
            Self::Subscribed { subscription_id } => write!(f, "subscribed to {subscription_id}"),
            Self::Unsubscribed { subscription_id } => {
                write!(f, "unsubscribed from {subscription_id}")
            }
            Self::Published { message_id } => write!(f, "published {message_id}"),
            Self::Error { message }
            | Self::Pong { message }
            | Self::HandshakeError { message }
            | Self::AuthenticationError { message }
            | Self::SubscriptionError { message } => write!(f, "{}: {message}", self.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_uses_snake_case_tag() {
        let event = ConnectionEvent::HandshakeError {
            message: "bad role".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"handshake_error\""));
        assert!(json.contains("\"message\":\"bad role\""));
    }

    #[test]
    fn test_open_event_defaults_headers() {
        let event: ConnectionEvent = serde_json::from_str(r#"{"type":"open"}"#).unwrap();
        assert_eq!(event, ConnectionEvent::open());
    }

    #[test]
    fn test_display_includes_metadata() {
        let event = ConnectionEvent::Subscribed {
            subscription_id: "sms_republished_v1".to_string(),
        };
        assert_eq!(event.to_string(), "subscribed to sms_republished_v1");

        let event = ConnectionEvent::AuthenticationError {
            message: "invalid secret".to_string(),
        };
        assert_eq!(event.to_string(), "authentication_error: invalid secret");
    }
}
