//! Executor configuration with environment overrides
//!
//! Connection parameters follow the deployment's `MQTT_*` environment
//! variables and fall back to the development defaults.

use std::env;
use std::time::Duration;

/// Runtime configuration for the executor peer
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Broker host
    pub broker_host: String,
    /// Plaintext broker port
    pub broker_port: u16,
    /// TLS broker port (advertised for deployments terminating TLS)
    pub broker_tls_port: u16,
    /// Executor identity; all topic names derive from it
    pub executor_id: String,
    /// Broker credentials
    pub username: String,
    pub password: String,
    /// MQTT keep-alive interval
    pub keep_alive: Duration,
    /// Device warm-up delay before the start signal is published
    pub warmup_delay: Duration,
    /// Backoff between reconnection attempts
    pub reconnect_delay: Duration,
    /// Idempotency cache capacity
    pub cache_capacity: usize,
    /// Point-command worker pool size
    pub worker_count: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            broker_host: "127.0.0.1".into(),
            broker_port: 4883,
            broker_tls_port: 4884,
            executor_id: "id1".into(),
            username: "B_user".into(),
            password: "B_password".into(),
            keep_alive: Duration::from_secs(45),
            warmup_delay: Duration::from_secs(1),
            reconnect_delay: Duration::from_secs(5),
            cache_capacity: crate::cache::DEFAULT_CAPACITY,
            worker_count: 4,
        }
    }
}

impl ExecutorConfig {
    /// Load configuration, letting environment variables override defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.broker_host = env_or("MQTT_BROKER_IP", config.broker_host);
        config.broker_port = env_parse("MQTT_PORT", config.broker_port);
        config.broker_tls_port = env_parse("MQTT_TLS_PORT", config.broker_tls_port);
        config.executor_id = env_or("MQTT_CLIENT_ID", config.executor_id);
        config.username = env_or("MQTT_B_USER", config.username);
        config.password = env_or("MQTT_B_PASSWORD", config.password);
        config
    }

    /// Bus client identifier for this peer
    pub fn client_id(&self) -> String {
        format!("B-{}", self.executor_id)
    }
}

fn env_or(key: &str, default: String) -> String {
    env::var(key).unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ExecutorConfig::default();
        assert_eq!(config.broker_port, 4883);
        assert_eq!(config.keep_alive, Duration::from_secs(45));
        assert_eq!(config.cache_capacity, 100);
    }

    #[test]
    fn test_client_id_derivation() {
        let config = ExecutorConfig {
            executor_id: "rig-7".into(),
            ..Default::default()
        };
        assert_eq!(config.client_id(), "B-rig-7");
    }
}
