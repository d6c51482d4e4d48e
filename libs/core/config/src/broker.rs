use crate::{env_or_default, ConfigError, FromEnv};
use messaging::BrokerOptions;
use std::env;
use std::time::Duration;

/// Message broker configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BrokerConfig {
    /// Backend name, as registered in `messaging::BrokerFactory`
    pub backend: String,
    /// Server addresses; empty means the backend's default endpoint
    pub addresses: Vec<String>,
    pub client_name: Option<String>,
    pub connect_timeout: Duration,
}

impl BrokerConfig {
    pub fn new(backend: impl Into<String>, addresses: Vec<String>) -> Self {
        Self {
            backend: backend.into(),
            addresses,
            ..Self::default()
        }
    }

    /// Broker-level options for `BrokerFactory::build`
    pub fn to_broker_options(&self) -> BrokerOptions {
        let options = BrokerOptions::default().with_connect_timeout(self.connect_timeout);
        match &self.client_name {
            Some(name) => options.with_name(name),
            None => options,
        }
    }
}

impl FromEnv for BrokerConfig {
    /// Reads from environment variables with sensible defaults:
    /// - BROKER_BACKEND: defaults to "nats"
    /// - BROKER_ADDRESSES: comma separated, defaults to none
    /// - BROKER_CLIENT_NAME: optional
    /// - BROKER_CONNECT_TIMEOUT_MS: defaults to 2000
    fn from_env() -> Result<Self, ConfigError> {
        let backend = env_or_default("BROKER_BACKEND", "nats");
        let addresses = env_or_default("BROKER_ADDRESSES", "")
            .split(',')
            .map(str::trim)
            .filter(|addr| !addr.is_empty())
            .map(str::to_string)
            .collect();
        let client_name = env::var("BROKER_CLIENT_NAME")
            .ok()
            .filter(|name| !name.is_empty());
        let timeout_ms: u64 = env_or_default("BROKER_CONNECT_TIMEOUT_MS", "2000")
            .parse()
            .map_err(|e| ConfigError::ParseError {
                key: "BROKER_CONNECT_TIMEOUT_MS".to_string(),
                details: format!("{}", e),
            })?;

        Ok(Self {
            backend,
            addresses,
            client_name,
            connect_timeout: Duration::from_millis(timeout_ms),
        })
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            backend: "nats".to_string(),
            addresses: Vec::new(),
            client_name: None,
            connect_timeout: Duration::from_secs(2),
        }
    }
}
