//! Option records for brokers, publishes and subscriptions.
//!
//! Options are plain values built with `with_*` calls applied left to right;
//! a later call overrides an earlier one on the same field.

use std::time::Duration;

/// What a subscription does with an inbound payload it cannot decode.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DecodeFailurePolicy {
    /// Drop the payload; neither the handler nor the caller hears about it
    #[default]
    Drop,

    /// Forward the raw payload unchanged to another topic, then drop it
    DeadLetter { topic: String },

    /// Stop the subscription; `unsubscribe()` reports the decode error
    Fail,
}

impl DecodeFailurePolicy {
    /// Dead-letter policy forwarding to `topic`.
    pub fn dead_letter(topic: impl Into<String>) -> Self {
        Self::DeadLetter {
            topic: topic.into(),
        }
    }
}

/// Broker-level options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerOptions {
    /// Client connection name reported to the server
    pub name: Option<String>,

    /// Upper bound on a single connection attempt
    pub connect_timeout: Duration,

    /// Decode policy for subscriptions that do not set their own
    pub decode_failure: DecodeFailurePolicy,
}

impl Default for BrokerOptions {
    fn default() -> Self {
        Self {
            name: None,
            connect_timeout: Duration::from_secs(2),
            decode_failure: DecodeFailurePolicy::Drop,
        }
    }
}

impl BrokerOptions {
    /// Set the client connection name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the connection timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the default decode failure policy.
    pub fn with_decode_failure(mut self, policy: DecodeFailurePolicy) -> Self {
        self.decode_failure = policy;
        self
    }
}

/// Per-publish options. No field is recognised yet; every backend accepts
/// and ignores it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishOptions {}

/// Per-subscription options, fixed for the life of the subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeOptions {
    /// Queue group name; a non-empty name enables load-balanced delivery
    pub queue: Option<String>,

    /// Acknowledge on dispatch, with no explicit confirmation step
    pub auto_ack: bool,

    /// Decode policy; `None` falls back to the broker's default
    pub decode_failure: Option<DecodeFailurePolicy>,
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        Self {
            queue: None,
            auto_ack: true,
            decode_failure: None,
        }
    }
}

impl SubscribeOptions {
    /// Join the named queue group.
    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    /// Enable or disable automatic acknowledgment.
    pub fn with_auto_ack(mut self, auto_ack: bool) -> Self {
        self.auto_ack = auto_ack;
        self
    }

    /// Set the decode failure policy for this subscription.
    pub fn with_decode_failure(mut self, policy: DecodeFailurePolicy) -> Self {
        self.decode_failure = Some(policy);
        self
    }

    /// The queue group, if one with a non-empty name was configured.
    pub fn queue_group(&self) -> Option<&str> {
        self.queue.as_deref().filter(|q| !q.is_empty())
    }

    /// The decode policy in effect, given the broker's options.
    pub fn decode_policy<'a>(&'a self, broker: &'a BrokerOptions) -> &'a DecodeFailurePolicy {
        self.decode_failure.as_ref().unwrap_or(&broker.decode_failure)
    }

    /// Copy with the decode policy filled in from the broker's options.
    pub(crate) fn resolve(mut self, broker: &BrokerOptions) -> Self {
        if self.decode_failure.is_none() {
            self.decode_failure = Some(broker.decode_failure.clone());
        }
        self
    }
}
