//! Backend-agnostic publish/subscribe messaging.
//!
//! Application code talks to a [`Broker`]: connect, publish [`Message`]s to
//! topics, and subscribe [`Handler`]s that receive each message as a
//! [`Publication`]. Backends are interchangeable behind the trait:
//!
//! - **NATS** (`nats` feature, default): core NATS pub/sub with queue groups
//! - **Memory**: in-process hub with the same semantics, for tests and
//!   single-process deployments
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐      ┌───────────────┐      ┌────────────────────┐
//! │   Your Code     │      │ BrokerFactory │      │      Backends      │
//! │                 │─────▶│  "nats"       │─────▶│ NatsBroker         │
//! │ Box<dyn Broker> │      │  "memory"     │      │ MemoryBroker (hub) │
//! └─────────────────┘      └───────────────┘      └────────────────────┘
//!          │                                                │
//!          ▼                                                ▼
//!   Handler(Publication) ◀──── dispatch loop ◀──── JSON envelope (codec)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use messaging::{BrokerFactory, BrokerOptions, Message, Publication, PublishOptions, SubscribeOptions};
//! use std::sync::Arc;
//!
//! let broker = BrokerFactory::with_defaults().build(
//!     "nats",
//!     vec!["127.0.0.1:4222".into()],
//!     BrokerOptions::default().with_name("billing"),
//! )?;
//! broker.connect().await?;
//!
//! let mut sub = broker
//!     .subscribe(
//!         "orders.created",
//!         Arc::new(|publication: Publication| async move {
//!             println!("{:?}", publication.message());
//!             Ok(())
//!         }),
//!         SubscribeOptions::default().with_queue("billing"),
//!     )
//!     .await?;
//!
//! broker
//!     .publish("orders.created", &Message::new("{}"), PublishOptions::default())
//!     .await?;
//!
//! sub.unsubscribe().await?;
//! broker.disconnect().await?;
//! ```

mod address;
mod broker;
pub mod codec;
mod config;
mod dispatch;
mod error;
mod factory;
pub mod memory;
mod message;
mod metrics;

#[cfg(feature = "nats")]
pub mod nats;

pub use address::{first_address, normalize_addresses};
pub use broker::{Broker, Handler, Subscriber};
pub use config::{BrokerOptions, DecodeFailurePolicy, PublishOptions, SubscribeOptions};
pub use error::{BoxError, BrokerError};
pub use factory::BrokerFactory;
pub use memory::{MemoryBroker, MemoryHub};
pub use message::{Acknowledger, AutoAck, Message, Publication};
pub use self::metrics::BrokerMetrics;

#[cfg(feature = "nats")]
pub use nats::NatsBroker;
