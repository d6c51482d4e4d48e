//! Error types for broker operations.

use thiserror::Error;

/// Boxed transport error carried as the source of a [`BrokerError`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error returned by every broker, subscriber and publication operation.
///
/// Transport failures are carried as boxed sources and displayed unchanged,
/// so callers see exactly what the underlying client reported. Nothing in
/// this crate retries on any of these.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The transport connection attempt failed
    #[error("{source}")]
    Connection {
        #[source]
        source: BoxError,
    },

    /// The message could not be encoded; nothing was sent
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    /// The transport refused the send
    #[error("{source}")]
    Publish {
        #[source]
        source: BoxError,
    },

    /// The transport refused the subscription, or the handle is already closed
    #[error("{source}")]
    Subscription {
        #[source]
        source: BoxError,
    },

    /// An inbound payload could not be decoded (only surfaced by the `Fail` policy)
    #[error("failed to decode message on {topic}: {source}")]
    Decode {
        topic: String,
        #[source]
        source: serde_json::Error,
    },

    /// Operation requires a connection and the broker has none
    #[error("broker is not connected")]
    NotConnected,

    /// No constructor is registered under this backend name
    #[error("unknown broker backend: {0}")]
    UnknownBackend(String),

    /// Error raised by a subscription handler
    #[error("handler error: {0}")]
    Handler(String),
}

impl BrokerError {
    /// Create a connection error.
    pub fn connection(source: impl Into<BoxError>) -> Self {
        Self::Connection {
            source: source.into(),
        }
    }

    /// Create a publish error.
    pub fn publish(source: impl Into<BoxError>) -> Self {
        Self::Publish {
            source: source.into(),
        }
    }

    /// Create a subscription error.
    pub fn subscription(source: impl Into<BoxError>) -> Self {
        Self::Subscription {
            source: source.into(),
        }
    }

    /// Create a handler error.
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler(message.into())
    }

    pub fn is_not_connected(&self) -> bool {
        matches!(self, Self::NotConnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_transport_errors_display_verbatim() {
        let err = BrokerError::connection(io::Error::new(
            io::ErrorKind::ConnectionRefused,
            "connection refused",
        ));
        assert_eq!(err.to_string(), "connection refused");

        let err = BrokerError::publish("maximum payload exceeded");
        assert_eq!(err.to_string(), "maximum payload exceeded");

        let err = BrokerError::subscription("invalid subject");
        assert_eq!(err.to_string(), "invalid subject");
    }

    #[test]
    fn test_connection_error_keeps_source() {
        let err = BrokerError::connection(io::Error::new(io::ErrorKind::TimedOut, "timed out"));
        let source = std::error::Error::source(&err).expect("source should be set");
        assert_eq!(source.to_string(), "timed out");
    }

    #[test]
    fn test_serialization_error_is_transparent() {
        let json_err = serde_json::from_str::<u32>("nope").unwrap_err();
        let expected = json_err.to_string();
        let err = BrokerError::from(json_err);
        assert_eq!(err.to_string(), expected);
    }

    #[test]
    fn test_not_connected() {
        let err = BrokerError::NotConnected;
        assert!(err.is_not_connected());
        assert_eq!(err.to_string(), "broker is not connected");
        assert!(!BrokerError::handler("boom").is_not_connected());
    }

    #[test]
    fn test_decode_error_names_topic() {
        let source = serde_json::from_slice::<u32>(b"{").unwrap_err();
        let err = BrokerError::Decode {
            topic: "orders.created".to_string(),
            source,
        };
        assert!(err.to_string().starts_with("failed to decode message on orders.created"));
    }
}
