//! Message envelope and the publication wrapper handed to handlers.

use crate::error::BrokerError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Immutable message envelope: string headers plus an opaque body.
///
/// The whole envelope, headers included, is what travels on the wire
/// (see [`crate::codec`]).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(
        rename = "Header",
        default,
        deserialize_with = "crate::codec::headers::deserialize"
    )]
    headers: BTreeMap<String, String>,

    #[serde(rename = "Body", default, with = "crate::codec::body")]
    body: Vec<u8>,
}

impl Message {
    /// Create a message with the given body and no headers.
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    /// Create a message from headers and body.
    pub fn from_parts(headers: BTreeMap<String, String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            headers,
            body: body.into(),
        }
    }

    /// Add a header.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Look up a single header.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Take the headers and body apart.
    pub fn into_parts(self) -> (BTreeMap<String, String>, Vec<u8>) {
        (self.headers, self.body)
    }
}

/// Acknowledgment capability for one delivery.
///
/// Backends that support redelivery hand out an implementation tied to the
/// delivery; auto-ack subscriptions get [`AutoAck`].
#[async_trait]
pub trait Acknowledger: Send + Sync {
    /// Confirm the delivery was handled.
    async fn ack(&self) -> Result<(), BrokerError>;

    /// Reject the delivery so the backend may redeliver it.
    async fn nack(&self) -> Result<(), BrokerError>;
}

/// Acknowledger for auto-ack deliveries: both calls succeed and do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoAck;

#[async_trait]
impl Acknowledger for AutoAck {
    async fn ack(&self) -> Result<(), BrokerError> {
        Ok(())
    }

    async fn nack(&self) -> Result<(), BrokerError> {
        Ok(())
    }
}

/// A received message bound to the topic its subscription was registered on.
#[derive(Clone)]
pub struct Publication {
    topic: String,
    message: Message,
    acknowledger: Arc<dyn Acknowledger>,
}

impl Publication {
    /// Create a publication with an explicit acknowledger.
    pub fn new(
        topic: impl Into<String>,
        message: Message,
        acknowledger: Arc<dyn Acknowledger>,
    ) -> Self {
        Self {
            topic: topic.into(),
            message,
            acknowledger,
        }
    }

    /// Create an auto-acknowledged publication.
    pub fn auto_acked(topic: impl Into<String>, message: Message) -> Self {
        Self::new(topic, message, Arc::new(AutoAck))
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn into_message(self) -> Message {
        self.message
    }

    /// Acknowledge the delivery.
    pub async fn ack(&self) -> Result<(), BrokerError> {
        self.acknowledger.ack().await
    }

    /// Negatively acknowledge the delivery.
    pub async fn nack(&self) -> Result<(), BrokerError> {
        self.acknowledger.nack().await
    }
}

impl fmt::Debug for Publication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publication")
            .field("topic", &self.topic)
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_builder() {
        let msg = Message::new("payload")
            .with_header("k", "v")
            .with_header("content-type", "text/plain");

        assert_eq!(msg.body(), b"payload");
        assert_eq!(msg.header("k"), Some("v"));
        assert_eq!(msg.header("missing"), None);
        assert_eq!(msg.headers().len(), 2);

        let (headers, body) = msg.into_parts();
        assert_eq!(headers.get("content-type").map(String::as_str), Some("text/plain"));
        assert_eq!(body, b"payload".to_vec());
    }

    #[test]
    fn test_later_header_wins() {
        let msg = Message::new(Vec::<u8>::new()).with_header("k", "1").with_header("k", "2");
        assert_eq!(msg.header("k"), Some("2"));
    }

    #[tokio::test]
    async fn test_auto_acked_publication() {
        let publication = Publication::auto_acked("orders", Message::new("x"));

        assert_eq!(publication.topic(), "orders");
        assert_eq!(publication.message().body(), b"x");
        assert!(publication.ack().await.is_ok());
        assert!(publication.ack().await.is_ok());
        assert!(publication.nack().await.is_ok());
    }

    #[test]
    fn test_publication_debug_omits_acknowledger() {
        let publication = Publication::auto_acked("t", Message::default());
        let debug = format!("{:?}", publication);
        assert!(debug.contains("topic: \"t\""));
        assert!(debug.ends_with(".. }"));
    }
}
