use crate::address::normalize_addresses;
use crate::broker::{valid_topic, Broker, Handler, Subscriber};
use crate::codec;
use crate::config::{BrokerOptions, PublishOptions, SubscribeOptions};
use crate::dispatch::{self, DeadLetterSink, Delivery, Dispatcher, Inbox};
use crate::error::BrokerError;
use crate::message::Message;
use crate::metrics::BrokerMetrics;
use async_nats::{Client, ConnectOptions, ServerAddr};
use async_trait::async_trait;
use futures::StreamExt;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, instrument};

/// Address scheme prepended to bare `host:port` addresses.
pub const SCHEME: &str = "nats://";

/// Server used when no address is configured.
pub const DEFAULT_URL: &str = "nats://127.0.0.1:4222";

/// Broker backed by a single NATS client connection.
pub struct NatsBroker {
    addrs: Vec<String>,
    options: BrokerOptions,
    connection: RwLock<Option<NatsConnection>>,
    metrics: BrokerMetrics,
}

struct NatsConnection {
    client: Client,
    shutdown: watch::Sender<bool>,
}

impl NatsBroker {
    /// Create an unconnected broker. Empty addresses are dropped and bare
    /// ones get the `nats://` scheme.
    pub fn new<I, S>(addrs: I, options: BrokerOptions) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            addrs: normalize_addresses(addrs, SCHEME, DEFAULT_URL),
            options,
            connection: RwLock::new(None),
            metrics: BrokerMetrics::new("nats"),
        }
    }

    /// The underlying client, while connected.
    pub async fn client(&self) -> Option<Client> {
        self.connection
            .read()
            .await
            .as_ref()
            .map(|conn| conn.client.clone())
    }

    async fn connected(&self) -> Result<(Client, watch::Receiver<bool>), BrokerError> {
        let connection = self.connection.read().await;
        let conn = connection.as_ref().ok_or(BrokerError::NotConnected)?;
        Ok((conn.client.clone(), conn.shutdown.subscribe()))
    }

    async fn send(&self, topic: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
        let (client, _) = self.connected().await?;
        if !valid_topic(topic) {
            return Err(BrokerError::publish(format!("invalid subject: {:?}", topic)));
        }

        client
            .publish(topic.to_string(), payload.into())
            .await
            .map_err(BrokerError::publish)?;

        self.metrics.message_published(topic);
        debug!(topic = %topic, "Published message");
        Ok(())
    }
}

impl fmt::Display for NatsBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("nats")
    }
}

#[async_trait]
impl Broker for NatsBroker {
    fn name(&self) -> &'static str {
        "nats"
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

        let servers = self
            .addrs
            .iter()
            .map(|addr| addr.parse::<ServerAddr>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(BrokerError::connection)?;

        let mut connect_options =
            ConnectOptions::new().connection_timeout(self.options.connect_timeout);
        if let Some(name) = &self.options.name {
            connect_options = connect_options.name(name);
        }

        let client = connect_options
            .connect(servers)
            .await
            .map_err(BrokerError::connection)?;

        let (shutdown, _) = watch::channel(false);
        *connection = Some(NatsConnection { client, shutdown });

        info!(address = %self.address(), "Connected to NATS");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), BrokerError> {
        let conn = self
            .connection
            .write()
            .await
            .take()
            .ok_or(BrokerError::NotConnected)?;

        // Stop dispatch loops before the client goes away
        let _ = conn.shutdown.send(true);
        conn.client.drain().await.map_err(BrokerError::connection)?;

        info!(address = %self.address(), "Disconnected from NATS");
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.connection.read().await.is_some()
    }

    #[instrument(skip(self, message, _options), fields(backend = "nats"))]
    async fn publish(
        &self,
        topic: &str,
        message: &Message,
        _options: PublishOptions,
    ) -> Result<(), BrokerError> {
        self.connected().await?;
        let payload = codec::encode(message)?;
        self.send(topic, payload).await
    }

    #[instrument(skip(self, payload), fields(backend = "nats", bytes = payload.len()))]
    async fn publish_raw(&self, topic: &str, payload: &[u8]) -> Result<(), BrokerError> {
        self.send(topic, payload.to_vec()).await
    }

    #[instrument(skip(self, handler, options), fields(backend = "nats"))]
    async fn subscribe(
        &self,
        topic: &str,
        handler: Arc<dyn Handler>,
        options: SubscribeOptions,
    ) -> Result<Box<dyn Subscriber>, BrokerError> {
        let (client, shutdown) = self.connected().await?;
        if !valid_topic(topic) {
            return Err(BrokerError::subscription(format!(
                "invalid subject: {:?}",
                topic
            )));
        }

        let options = options.resolve(&self.options);
        let subscription = match options.queue_group() {
            Some(queue) => {
                client
                    .queue_subscribe(topic.to_string(), queue.to_string())
                    .await
            }
            None => client.subscribe(topic.to_string()).await,
        }
        .map_err(BrokerError::subscription)?;

        let dispatcher = Dispatcher::new(
            topic,
            handler,
            options.decode_policy(&self.options).clone(),
            Arc::new(ClientSink { client }),
            self.metrics.clone(),
        );

        debug!(topic = %topic, queue = ?options.queue_group(), "Subscribed");

        Ok(Box::new(dispatch::spawn(
            NatsInbox { subscription },
            dispatcher,
            options,
            shutdown,
        )))
    }
}

struct NatsInbox {
    subscription: async_nats::Subscriber,
}

#[async_trait]
impl Inbox for NatsInbox {
    async fn next(&mut self) -> Option<Delivery> {
        let message = self.subscription.next().await?;
        Some(Delivery::auto_acked(message.payload.to_vec()))
    }

    async fn close(&mut self) -> Result<(), BrokerError> {
        self.subscription
            .unsubscribe()
            .await
            .map_err(BrokerError::subscription)
    }
}

/// Dead-letter target publishing on the subscription's own connection.
struct ClientSink {
    client: Client,
}

#[async_trait]
impl DeadLetterSink for ClientSink {
    async fn forward(&self, topic: &str, payload: &[u8]) -> Result<(), BrokerError> {
        self.client
            .publish(topic.to_string(), payload.to_vec().into())
            .await
            .map_err(BrokerError::publish)
    }
}
