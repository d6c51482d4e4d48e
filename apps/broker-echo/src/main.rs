//! Broker Echo
//!
//! Subscribes to a topic on the configured broker and logs every message it
//! receives until Ctrl-C.

mod config;

use crate::config::Config;
use core_config::tracing::{init_tracing, install_color_eyre};
use core_config::FromEnv;
use eyre::{Result, WrapErr};
use messaging::{BrokerError, BrokerFactory, Publication, SubscribeOptions};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    install_color_eyre();

    let config = Config::from_env().wrap_err("Failed to load configuration")?;
    init_tracing(&config.environment);

    info!(
        backend = %config.broker.backend,
        topic = %config.topic,
        queue = ?config.queue,
        "Starting broker echo"
    );

    let broker = BrokerFactory::with_defaults()
        .build(
            &config.broker.backend,
            config.broker.addresses.clone(),
            config.broker.to_broker_options(),
        )
        .wrap_err("Failed to build broker")?;

    broker
        .connect()
        .await
        .wrap_err_with(|| format!("Failed to connect to {}", broker.address()))?;

    let mut options = SubscribeOptions::default();
    if let Some(queue) = &config.queue {
        options = options.with_queue(queue);
    }

    let mut subscription = broker
        .subscribe(&config.topic, Arc::new(echo), options)
        .await
        .wrap_err_with(|| format!("Failed to subscribe to {}", config.topic))?;

    tokio::signal::ctrl_c()
        .await
        .wrap_err("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received");

    subscription.unsubscribe().await?;
    broker.disconnect().await?;

    Ok(())
}

async fn echo(publication: Publication) -> Result<(), BrokerError> {
    let message = publication.message();
    info!(
        topic = %publication.topic(),
        headers = ?message.headers(),
        body = %String::from_utf8_lossy(message.body()),
        "Received message"
    );
    Ok(())
}
