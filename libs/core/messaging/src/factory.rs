//! Name-to-constructor registry for broker backends.
//!
//! Applications pick a backend by name from configuration and build it here,
//! so they only ever see `Box<dyn Broker>`.

use crate::broker::Broker;
use crate::config::BrokerOptions;
use crate::error::BrokerError;
use crate::memory::{MemoryBroker, MemoryHub};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

type Constructor = Arc<dyn Fn(Vec<String>, BrokerOptions) -> Box<dyn Broker> + Send + Sync>;

/// Registry of broker constructors keyed by backend name.
#[derive(Clone, Default)]
pub struct BrokerFactory {
    constructors: BTreeMap<String, Constructor>,
}

impl BrokerFactory {
    /// Empty factory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory with every built-in backend registered.
    ///
    /// `"memory"` brokers built from the same factory share one hub and
    /// therefore see each other's messages. `"nats"` is present when the
    /// `nats` feature is enabled.
    pub fn with_defaults() -> Self {
        let hub = MemoryHub::new();
        let factory = Self::new().register("memory", move |addrs, options| {
            Box::new(MemoryBroker::with_hub(hub.clone(), addrs, options)) as Box<dyn Broker>
        });

        #[cfg(feature = "nats")]
        let factory = factory.register("nats", |addrs, options| {
            Box::new(crate::nats::NatsBroker::new(addrs, options)) as Box<dyn Broker>
        });

        factory
    }

    /// Register `constructor` under `name`, replacing any previous entry.
    pub fn register<F>(mut self, name: impl Into<String>, constructor: F) -> Self
    where
        F: Fn(Vec<String>, BrokerOptions) -> Box<dyn Broker> + Send + Sync + 'static,
    {
        self.constructors.insert(name.into(), Arc::new(constructor));
        self
    }

    /// Registered backend names, sorted.
    pub fn backends(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }

    /// Build an unconnected broker of the named backend.
    pub fn build(
        &self,
        name: &str,
        addrs: Vec<String>,
        options: BrokerOptions,
    ) -> Result<Box<dyn Broker>, BrokerError> {
        let constructor = self
            .constructors
            .get(name)
            .ok_or_else(|| BrokerError::UnknownBackend(name.to_string()))?;
        Ok(constructor(addrs, options))
    }
}

impl fmt::Debug for BrokerFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerFactory")
            .field("backends", &self.backends())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PublishOptions, SubscribeOptions};
    use crate::message::{Message, Publication};
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[test]
    fn test_unknown_backend() {
        let factory = BrokerFactory::new();
        assert!(factory.backends().is_empty());

        let err = factory
            .build("kafka", vec![], BrokerOptions::default())
            .err()
            .unwrap();
        assert!(matches!(err, BrokerError::UnknownBackend(ref name) if name == "kafka"));
        assert_eq!(err.to_string(), "unknown broker backend: kafka");
    }

    #[test]
    fn test_defaults_are_registered() {
        let factory = BrokerFactory::with_defaults();
        assert!(factory.backends().contains(&"memory"));
        #[cfg(feature = "nats")]
        assert_eq!(factory.backends(), vec!["memory", "nats"]);

        let broker = factory
            .build("memory", vec!["local".to_string()], BrokerOptions::default())
            .unwrap();
        assert_eq!(broker.name(), "memory");
        assert_eq!(broker.address(), "memory://local");
    }

    #[cfg(feature = "nats")]
    #[test]
    fn test_builds_nats_without_connecting() {
        let broker = BrokerFactory::with_defaults()
            .build("nats", vec![], BrokerOptions::default())
            .unwrap();
        assert_eq!(broker.to_string(), "nats");
        assert_eq!(broker.address(), crate::nats::DEFAULT_URL);
    }

    #[test]
    fn test_register_replaces_entry() {
        let factory = BrokerFactory::new()
            .register("custom", |addrs, options| {
                Box::new(MemoryBroker::new(addrs, options)) as Box<dyn Broker>
            })
            .register("custom", |_, options| {
                Box::new(MemoryBroker::new(["replaced"], options)) as Box<dyn Broker>
            });

        let broker = factory
            .build("custom", vec![], BrokerOptions::default())
            .unwrap();
        assert_eq!(broker.address(), "memory://replaced");
    }

    #[tokio::test]
    async fn test_memory_brokers_share_a_hub() {
        let factory = BrokerFactory::with_defaults();
        let publisher = factory
            .build("memory", vec![], BrokerOptions::default())
            .unwrap();
        let consumer = factory
            .build("memory", vec![], BrokerOptions::default())
            .unwrap();
        publisher.connect().await.unwrap();
        consumer.connect().await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = consumer
            .subscribe(
                "greetings",
                Arc::new(move |publication: Publication| {
                    let tx = tx.clone();
                    async move {
                        let _ = tx.send(publication.into_message());
                        Ok::<(), BrokerError>(())
                    }
                }),
                SubscribeOptions::default(),
            )
            .await
            .unwrap();

        publisher
            .publish("greetings", &Message::new("hi"), PublishOptions::default())
            .await
            .unwrap();

        let msg = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(msg.body(), b"hi");
    }
}
