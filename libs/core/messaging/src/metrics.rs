//! Broker metrics, recorded through the `metrics` facade.
//!
//! No recorder is installed here; the hosting application picks the exporter.

use metrics::{counter, gauge};

/// Metrics for one broker instance, labelled by backend.
#[derive(Debug, Clone)]
pub struct BrokerMetrics {
    backend: &'static str,
}

impl BrokerMetrics {
    pub fn new(backend: &'static str) -> Self {
        Self { backend }
    }

    /// Record a message published.
    pub fn message_published(&self, topic: &str) {
        counter!(
            "broker_messages_published_total",
            "backend" => self.backend,
            "topic" => topic.to_string()
        )
        .increment(1);
    }

    /// Record a message received by a subscription.
    pub fn message_received(&self, topic: &str) {
        counter!(
            "broker_messages_received_total",
            "backend" => self.backend,
            "topic" => topic.to_string()
        )
        .increment(1);
    }

    /// Record a payload that failed to decode.
    pub fn decode_failure(&self, topic: &str) {
        counter!(
            "broker_decode_failures_total",
            "backend" => self.backend,
            "topic" => topic.to_string()
        )
        .increment(1);
    }

    /// Record a handler returning an error.
    pub fn handler_error(&self, topic: &str) {
        counter!(
            "broker_handler_errors_total",
            "backend" => self.backend,
            "topic" => topic.to_string()
        )
        .increment(1);
    }

    pub fn subscription_opened(&self) {
        gauge!("broker_active_subscriptions", "backend" => self.backend).increment(1.0);
    }

    pub fn subscription_closed(&self) {
        gauge!("broker_active_subscriptions", "backend" => self.backend).decrement(1.0);
    }
}
