//! Configuration for the echo service

use core_config::{env_or_default, BrokerConfig, ConfigError, Environment, FromEnv};
use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,
    pub broker: BrokerConfig,

    /// Subject to subscribe to (wildcards allowed)
    pub topic: String,

    /// Queue group; unset means every echo instance sees every message
    pub queue: Option<String>,
}

impl FromEnv for Config {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            environment: Environment::from_env(),
            broker: BrokerConfig::from_env()?,
            topic: env_or_default("ECHO_TOPIC", ">"),
            queue: env::var("ECHO_QUEUE").ok().filter(|q| !q.is_empty()),
        })
    }
}
