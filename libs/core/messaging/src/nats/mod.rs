//! NATS core pub/sub backend.
//!
//! Messages travel as the JSON envelope from [`crate::codec`] over plain
//! (non-JetStream) NATS subjects. Queue subscriptions map onto NATS queue
//! groups; there is no server-side acknowledgment, so `ack`/`nack` on a
//! publication from this backend are no-ops.
//!
//! # Example
//!
//! ```rust,ignore
//! use messaging::nats::NatsBroker;
//! use messaging::{Broker, BrokerOptions, Message, PublishOptions};
//!
//! let broker = NatsBroker::new(["127.0.0.1:4222"], BrokerOptions::default());
//! broker.connect().await?;
//! broker
//!     .publish("orders.created", &Message::new("{}"), PublishOptions::default())
//!     .await?;
//! broker.disconnect().await?;
//! ```

mod broker;

pub use broker::{NatsBroker, DEFAULT_URL, SCHEME};
