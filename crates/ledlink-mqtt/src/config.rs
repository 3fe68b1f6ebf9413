//! Broker connection settings.

use crate::error::{MqttError, MqttResult};
use rumqttc::{MqttOptions, QoS, Transport};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Broker endpoint, credentials and timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_use_tls")]
    pub use_tls: bool,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    /// CONNACK must arrive within this many seconds.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Fixed delay between reconnect attempts.
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
    /// Upper bound on waiting for the event loop in `close()`.
    #[serde(default = "default_close_timeout_secs")]
    pub close_timeout_secs: u64,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    /// QoS for outbound publishes and subscriptions (0, 1 or 2).
    #[serde(default = "default_qos")]
    pub qos: u8,
    /// Capacity of the client request channel.
    #[serde(default = "default_request_capacity")]
    pub request_capacity: usize,
    /// Topics subscribed after every (re)connect.
    #[serde(default)]
    pub subscribe_topics: Vec<String>,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    8883
}

fn default_use_tls() -> bool {
    true
}

fn default_client_id() -> String {
    "ledlink-bridge".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_reconnect_delay_secs() -> u64 {
    5
}

fn default_close_timeout_secs() -> u64 {
    5
}

fn default_keep_alive_secs() -> u64 {
    60
}

fn default_qos() -> u8 {
    1
}

fn default_request_capacity() -> usize {
    64
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            use_tls: default_use_tls(),
            username: None,
            password: None,
            client_id: default_client_id(),
            connect_timeout_secs: default_connect_timeout_secs(),
            reconnect_delay_secs: default_reconnect_delay_secs(),
            close_timeout_secs: default_close_timeout_secs(),
            keep_alive_secs: default_keep_alive_secs(),
            qos: default_qos(),
            request_capacity: default_request_capacity(),
            subscribe_topics: Vec::new(),
        }
    }
}

impl BrokerConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_secs(self.close_timeout_secs)
    }

    /// Configured QoS level.
    pub fn qos_level(&self) -> MqttResult<QoS> {
        match self.qos {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            other => Err(MqttError::Config(format!("qos {other} is not 0, 1 or 2"))),
        }
    }

    /// Check values that would otherwise fail deep inside the client.
    pub fn validate(&self) -> MqttResult<()> {
        if self.host.trim().is_empty() {
            return Err(MqttError::Config("host is empty".to_string()));
        }
        if self.client_id.trim().is_empty() {
            return Err(MqttError::Config("client_id is empty".to_string()));
        }
        if self.keep_alive_secs < 5 {
            return Err(MqttError::Config(format!(
                "keep_alive_secs {} is below 5",
                self.keep_alive_secs
            )));
        }
        if self.request_capacity == 0 {
            return Err(MqttError::Config("request_capacity is 0".to_string()));
        }
        self.qos_level()?;
        Ok(())
    }

    /// Build client options. Fails on invalid settings.
    pub fn mqtt_options(&self) -> MqttResult<MqttOptions> {
        self.validate()?;

        let mut options = MqttOptions::new(&self.client_id, &self.host, self.port);
        options.set_keep_alive(Duration::from_secs(self.keep_alive_secs));
        options.set_clean_session(true);

        if let Some(username) = &self.username {
            options.set_credentials(username, self.password.as_deref().unwrap_or_default());
        }
        if self.use_tls {
            options.set_transport(Transport::tls_with_default_config());
        }

        Ok(options)
    }
}

/// Per-publish options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishOptions {
    pub qos: QoS,
    pub retain: bool,
}

impl PublishOptions {
    pub fn new(qos: QoS, retain: bool) -> Self {
        Self { qos, retain }
    }
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            qos: QoS::AtLeastOnce,
            retain: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BrokerConfig::default();
        assert_eq!(config.port, 8883);
        assert!(config.use_tls);
        assert_eq!(config.connect_timeout(), Duration::from_secs(30));
        assert_eq!(config.reconnect_delay(), Duration::from_secs(5));
        assert_eq!(config.qos_level().unwrap(), QoS::AtLeastOnce);
    }

    #[test]
    fn test_validate_rejects_bad_qos() {
        let config = BrokerConfig {
            qos: 3,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(MqttError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_empty_host() {
        let config = BrokerConfig {
            host: "  ".to_string(),
            ..Default::default()
        };
        assert!(config.mqtt_options().is_err());
    }

    #[test]
    fn test_mqtt_options_endpoint() {
        let config = BrokerConfig {
            host: "broker.local".to_string(),
            port: 1883,
            use_tls: false,
            username: Some("led".to_string()),
            password: Some("secret".to_string()),
            ..Default::default()
        };
        let options = config.mqtt_options().unwrap();
        assert_eq!(options.broker_address(), ("broker.local".to_string(), 1883));
        assert_eq!(options.client_id(), "ledlink-bridge");
    }

    #[test]
    fn test_password_is_not_serialized() {
        let config = BrokerConfig {
            password: Some("secret".to_string()),
            ..Default::default()
        };
        let text = toml::to_string(&config).unwrap();
        assert!(!text.contains("secret"));
    }
}
