//! Backend-agnostic broker contract.
//!
//! Application code holds a `Box<dyn Broker>` (usually built by
//! [`crate::BrokerFactory`]) and never names a backend type, so swapping NATS
//! for another transport is a configuration change.

use crate::address::first_address;
use crate::config::{BrokerOptions, PublishOptions, SubscribeOptions};
use crate::error::BrokerError;
use crate::message::{Message, Publication};
use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Callback invoked once per decoded inbound message.
///
/// A subscription awaits its handler before taking the next message, but
/// different subscriptions run concurrently, so a handler shared between
/// subscriptions may be called from several tasks at once. Errors are logged
/// by the dispatch loop and otherwise ignored.
///
/// Any `Fn(Publication) -> impl Future<Output = Result<(), BrokerError>>`
/// closure is a handler.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, publication: Publication) -> Result<(), BrokerError>;
}

#[async_trait]
impl<F, Fut> Handler for F
where
    F: Fn(Publication) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), BrokerError>> + Send,
{
    async fn handle(&self, publication: Publication) -> Result<(), BrokerError> {
        (self)(publication).await
    }
}

/// Handle to an active subscription.
#[async_trait]
pub trait Subscriber: Send + Sync {
    /// Subject the transport subscription was registered on.
    fn topic(&self) -> &str;

    /// Options resolved at subscribe time.
    fn options(&self) -> &SubscribeOptions;

    /// Cancel the subscription.
    ///
    /// No handler call starts after this returns; one already in flight
    /// finishes first. Calling it again returns a subscription error.
    async fn unsubscribe(&mut self) -> Result<(), BrokerError>;
}

/// A message broker backend.
///
/// Lifecycle: construction is pure (addresses are only normalized),
/// [`connect`](Broker::connect) establishes the single transport connection
/// and is idempotent, [`disconnect`](Broker::disconnect) tears it down along
/// with every dispatch loop this broker started. Publish and subscribe
/// require a connection and return [`BrokerError::NotConnected`] otherwise.
#[async_trait]
pub trait Broker: Send + Sync + fmt::Display {
    /// Backend name, e.g. `"nats"`.
    fn name(&self) -> &'static str;

    /// Normalized server addresses, in the order given.
    fn addresses(&self) -> &[String];

    /// First normalized address, or `""` when there is none.
    fn address(&self) -> &str {
        first_address(self.addresses())
    }

    fn options(&self) -> &BrokerOptions;

    /// Accept options after construction. Reserved: changes nothing and
    /// always succeeds.
    async fn init(&self, _options: BrokerOptions) -> Result<(), BrokerError> {
        Ok(())
    }

    async fn connect(&self) -> Result<(), BrokerError>;

    async fn disconnect(&self) -> Result<(), BrokerError>;

    async fn is_connected(&self) -> bool;

    /// Encode `message` and send it to `topic`.
    async fn publish(
        &self,
        topic: &str,
        message: &Message,
        options: PublishOptions,
    ) -> Result<(), BrokerError>;

    /// Send already-encoded bytes to `topic` unchanged.
    async fn publish_raw(&self, topic: &str, payload: &[u8]) -> Result<(), BrokerError>;

    /// Register `handler` for messages on `topic`.
    async fn subscribe(
        &self,
        topic: &str,
        handler: Arc<dyn Handler>,
        options: SubscribeOptions,
    ) -> Result<Box<dyn Subscriber>, BrokerError>;
}

/// Subjects must be non-empty and free of whitespace.
pub(crate) fn valid_topic(topic: &str) -> bool {
    !topic.is_empty() && !topic.chars().any(char::is_whitespace)
}
