//! In-process broker backend.
//!
//! Implements the full [`Broker`] contract without a server: messages go
//! through the same wire codec as on NATS and are routed by a [`MemoryHub`].
//! Unlike core NATS it supports manual acknowledgment: with `auto_ack`
//! disabled, `Publication::nack()` redelivers the message to the same
//! subscription.

mod hub;

pub use hub::MemoryHub;

use crate::address::normalize_addresses;
use crate::broker::{valid_topic, Broker, Handler, Subscriber};
use crate::codec;
use crate::config::{BrokerOptions, PublishOptions, SubscribeOptions};
use crate::dispatch::{self, Delivery, Dispatcher, Inbox};
use crate::error::BrokerError;
use crate::message::{Acknowledger, Message};
use crate::metrics::BrokerMetrics;
use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, RwLock};
use tracing::{debug, info};

/// Address scheme of the in-memory backend.
pub const SCHEME: &str = "memory://";

/// Address used when none is given.
pub const DEFAULT_ADDRESS: &str = "memory://local";

/// In-memory broker.
pub struct MemoryBroker {
    addrs: Vec<String>,
    options: BrokerOptions,
    hub: MemoryHub,
    connection: RwLock<Option<MemoryConnection>>,
    metrics: BrokerMetrics,
}

struct MemoryConnection {
    shutdown: watch::Sender<bool>,
}

impl MemoryBroker {
    /// Create a broker on its own private hub.
    pub fn new<I, S>(addrs: I, options: BrokerOptions) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::with_hub(MemoryHub::new(), addrs, options)
    }

    /// Create a broker on a shared hub.
    pub fn with_hub<I, S>(hub: MemoryHub, addrs: I, options: BrokerOptions) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            addrs: normalize_addresses(addrs, SCHEME, DEFAULT_ADDRESS),
            options,
            hub,
            connection: RwLock::new(None),
            metrics: BrokerMetrics::new("memory"),
        }
    }

    pub fn hub(&self) -> &MemoryHub {
        &self.hub
    }

    async fn shutdown_signal(&self) -> Result<watch::Receiver<bool>, BrokerError> {
        let connection = self.connection.read().await;
        connection
            .as_ref()
            .map(|conn| conn.shutdown.subscribe())
            .ok_or(BrokerError::NotConnected)
    }

    async fn send(&self, topic: &str, payload: &[u8]) -> Result<(), BrokerError> {
        if self.connection.read().await.is_none() {
            return Err(BrokerError::NotConnected);
        }
        if !valid_topic(topic) {
            return Err(BrokerError::publish(format!("invalid subject: {:?}", topic)));
        }

        let delivered = self.hub.deliver(topic, payload).await;
        self.metrics.message_published(topic);
        debug!(topic = %topic, delivered = delivered, "Published message");
        Ok(())
    }
}

impl fmt::Display for MemoryBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("memory")
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn addresses(&self) -> &[String] {
        &self.addrs
    }

    fn options(&self) -> &BrokerOptions {
        &self.options
    }

    async fn connect(&self) -> Result<(), BrokerError> {
        let mut connection = self.connection.write().await;
        if connection.is_some() {
            return Ok(());
        }

        self.hub.open_connection();
        let (shutdown, _) = watch::channel(false);
        *connection = Some(MemoryConnection { shutdown });

        info!(address = %self.address(), "Connected to in-memory broker");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), BrokerError> {
        let conn = self
            .connection
            .write()
            .await
            .take()
            .ok_or(BrokerError::NotConnected)?;

        // Receivers may all be gone already
        let _ = conn.shutdown.send(true);

        info!(address = %self.address(), "Disconnected from in-memory broker");
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.connection.read().await.is_some()
    }

    async fn publish(
        &self,
        topic: &str,
        message: &Message,
        _options: PublishOptions,
    ) -> Result<(), BrokerError> {
        if self.connection.read().await.is_none() {
            return Err(BrokerError::NotConnected);
        }
        let payload = codec::encode(message)?;
        self.send(topic, &payload).await
    }

    async fn publish_raw(&self, topic: &str, payload: &[u8]) -> Result<(), BrokerError> {
        self.send(topic, payload).await
    }

    async fn subscribe(
        &self,
        topic: &str,
        handler: Arc<dyn Handler>,
        options: SubscribeOptions,
    ) -> Result<Box<dyn Subscriber>, BrokerError> {
        let shutdown = self.shutdown_signal().await?;
        if !valid_topic(topic) {
            return Err(BrokerError::subscription(format!(
                "invalid subject: {:?}",
                topic
            )));
        }

        let options = options.resolve(&self.options);
        let registration = self.hub.register(topic, options.queue_group()).await;

        let inbox = MemoryInbox {
            hub: self.hub.clone(),
            id: registration.id,
            mailbox: registration.mailbox,
            requeue: registration.requeue,
            auto_ack: options.auto_ack,
        };
        let dispatcher = Dispatcher::new(
            topic,
            handler,
            options.decode_policy(&self.options).clone(),
            Arc::new(self.hub.clone()),
            self.metrics.clone(),
        );

        debug!(
            topic = %topic,
            queue = ?options.queue_group(),
            auto_ack = options.auto_ack,
            "Subscribed"
        );

        Ok(Box::new(dispatch::spawn(inbox, dispatcher, options, shutdown)))
    }
}

struct MemoryInbox {
    hub: MemoryHub,
    id: u64,
    mailbox: mpsc::UnboundedReceiver<Vec<u8>>,
    requeue: mpsc::UnboundedSender<Vec<u8>>,
    auto_ack: bool,
}

#[async_trait]
impl Inbox for MemoryInbox {
    async fn next(&mut self) -> Option<Delivery> {
        let payload = self.mailbox.recv().await?;

        if self.auto_ack {
            return Some(Delivery::auto_acked(payload));
        }

        let acknowledger = Arc::new(Redelivery {
            requeue: self.requeue.clone(),
            payload: payload.clone(),
            settled: AtomicBool::new(false),
        });
        Some(Delivery {
            payload,
            acknowledger,
        })
    }

    async fn close(&mut self) -> Result<(), BrokerError> {
        self.hub.remove(self.id).await;
        self.mailbox.close();
        Ok(())
    }
}

/// Manual acknowledgment for one in-memory delivery.
///
/// The first `ack` or `nack` settles the delivery; `nack` puts the payload
/// back on the subscription's mailbox. Later calls are no-ops.
struct Redelivery {
    requeue: mpsc::UnboundedSender<Vec<u8>>,
    payload: Vec<u8>,
    settled: AtomicBool,
}

#[async_trait]
impl Acknowledger for Redelivery {
    async fn ack(&self) -> Result<(), BrokerError> {
        self.settled.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn nack(&self) -> Result<(), BrokerError> {
        if self.settled.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.requeue
            .send(self.payload.clone())
            .map_err(|_| BrokerError::subscription("subscription closed"))
    }
}
