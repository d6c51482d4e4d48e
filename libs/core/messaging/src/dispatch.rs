//! Subscription dispatch loop shared by every backend.
//!
//! A backend adapts its transport subscription to an [`Inbox`] of raw
//! deliveries; everything after that (decoding, the decode failure policy,
//! handler invocation, cancellation and broker shutdown) lives here, so every
//! backend behaves the same way.

use crate::broker::{Handler, Subscriber};
use crate::codec;
use crate::config::{DecodeFailurePolicy, SubscribeOptions};
use crate::error::BrokerError;
use crate::message::{Acknowledger, AutoAck, Publication};
use crate::metrics::BrokerMetrics;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// One raw inbound payload plus the capability to acknowledge it.
pub(crate) struct Delivery {
    pub payload: Vec<u8>,
    pub acknowledger: Arc<dyn Acknowledger>,
}

impl Delivery {
    /// Delivery that needs no acknowledgment.
    pub fn auto_acked(payload: Vec<u8>) -> Self {
        Self {
            payload,
            acknowledger: Arc::new(AutoAck),
        }
    }
}

/// Transport-side source of deliveries for one subscription.
#[async_trait]
pub(crate) trait Inbox: Send + 'static {
    /// Next delivery, or `None` once the transport closed the subscription.
    async fn next(&mut self) -> Option<Delivery>;

    /// Cancel the transport subscription.
    async fn close(&mut self) -> Result<(), BrokerError>;
}

/// Where the dead-letter policy sends undecodable payloads.
#[async_trait]
pub(crate) trait DeadLetterSink: Send + Sync + 'static {
    async fn forward(&self, topic: &str, payload: &[u8]) -> Result<(), BrokerError>;
}

/// Decodes deliveries and hands them to the subscription's handler.
pub(crate) struct Dispatcher {
    topic: String,
    handler: Arc<dyn Handler>,
    policy: DecodeFailurePolicy,
    sink: Arc<dyn DeadLetterSink>,
    metrics: BrokerMetrics,
}

impl Dispatcher {
    pub fn new(
        topic: impl Into<String>,
        handler: Arc<dyn Handler>,
        policy: DecodeFailurePolicy,
        sink: Arc<dyn DeadLetterSink>,
        metrics: BrokerMetrics,
    ) -> Self {
        Self {
            topic: topic.into(),
            handler,
            policy,
            sink,
            metrics,
        }
    }

    /// Handle one delivery. Only the `Fail` policy returns an error.
    async fn dispatch(&self, delivery: Delivery) -> Result<(), BrokerError> {
        self.metrics.message_received(&self.topic);

        let message = match codec::decode(&delivery.payload) {
            Ok(message) => message,
            Err(source) => return self.decode_failed(&delivery.payload, source).await,
        };

        // Bound to the subscription's topic, never to anything in the payload
        let publication = Publication::new(self.topic.clone(), message, delivery.acknowledger);

        if let Err(error) = self.handler.handle(publication).await {
            self.metrics.handler_error(&self.topic);
            warn!(topic = %self.topic, error = %error, "Handler returned an error");
        }

        Ok(())
    }

    async fn decode_failed(
        &self,
        payload: &[u8],
        source: serde_json::Error,
    ) -> Result<(), BrokerError> {
        self.metrics.decode_failure(&self.topic);

        match &self.policy {
            DecodeFailurePolicy::Drop => {
                debug!(
                    topic = %self.topic,
                    error = %source,
                    bytes = payload.len(),
                    "Dropping undecodable message"
                );
                Ok(())
            }
            DecodeFailurePolicy::DeadLetter { topic } => {
                if let Err(error) = self.sink.forward(topic, payload).await {
                    warn!(
                        topic = %self.topic,
                        dead_letter_topic = %topic,
                        error = %error,
                        "Failed to dead-letter undecodable message"
                    );
                } else {
                    debug!(
                        topic = %self.topic,
                        dead_letter_topic = %topic,
                        "Dead-lettered undecodable message"
                    );
                }
                Ok(())
            }
            DecodeFailurePolicy::Fail => Err(BrokerError::Decode {
                topic: self.topic.clone(),
                source,
            }),
        }
    }
}

enum Stop {
    Cancelled,
    Shutdown,
    Drained,
    Failed(BrokerError),
}

/// Start the dispatch loop for a subscription and return its handle.
///
/// The loop ends when the handle is unsubscribed, when the broker's
/// `shutdown` channel fires or closes, when the transport ends the inbox, or
/// when the `Fail` policy trips. Dropping the handle leaves the loop running.
pub(crate) fn spawn<I: Inbox>(
    inbox: I,
    dispatcher: Dispatcher,
    options: SubscribeOptions,
    shutdown: watch::Receiver<bool>,
) -> DispatchSubscriber {
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let topic = dispatcher.topic.clone();

    dispatcher.metrics.subscription_opened();
    let task = tokio::spawn(run(inbox, dispatcher, cancel_rx, shutdown));

    DispatchSubscriber {
        topic,
        options,
        cancel: cancel_tx,
        task: Some(task),
    }
}

async fn run<I: Inbox>(
    mut inbox: I,
    dispatcher: Dispatcher,
    mut cancel: watch::Receiver<bool>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), BrokerError> {
    let mut handle_alive = true;

    let stop = loop {
        tokio::select! {
            biased;

            changed = cancel.changed(), if handle_alive => {
                match changed {
                    Ok(()) => break Stop::Cancelled,
                    // Handle dropped without unsubscribing; keep delivering
                    Err(_) => handle_alive = false,
                }
            }

            _ = shutdown.changed() => break Stop::Shutdown,

            delivery = inbox.next() => match delivery {
                Some(delivery) => {
                    if let Err(error) = dispatcher.dispatch(delivery).await {
                        break Stop::Failed(error);
                    }
                }
                None => break Stop::Drained,
            },
        }
    };

    dispatcher.metrics.subscription_closed();
    let closed = inbox.close().await;

    match stop {
        Stop::Cancelled => {
            debug!(topic = %dispatcher.topic, "Subscription cancelled");
            closed
        }
        Stop::Failed(error) => {
            warn!(topic = %dispatcher.topic, error = %error, "Subscription stopped on decode failure");
            Err(error)
        }
        Stop::Shutdown | Stop::Drained => {
            if let Err(error) = closed {
                debug!(topic = %dispatcher.topic, error = %error, "Transport already closed subscription");
            }
            debug!(topic = %dispatcher.topic, "Subscription ended with its connection");
            Ok(())
        }
    }
}

/// Subscriber handle backed by a dispatch task.
pub(crate) struct DispatchSubscriber {
    topic: String,
    options: SubscribeOptions,
    cancel: watch::Sender<bool>,
    task: Option<JoinHandle<Result<(), BrokerError>>>,
}

#[async_trait]
impl Subscriber for DispatchSubscriber {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn options(&self) -> &SubscribeOptions {
        &self.options
    }

    async fn unsubscribe(&mut self) -> Result<(), BrokerError> {
        let task = self
            .task
            .take()
            .ok_or_else(|| BrokerError::subscription("subscription already closed"))?;

        // The task may have ended on its own already; its result is still reported
        let _ = self.cancel.send(true);

        task.await.map_err(BrokerError::subscription)?
    }
}
