//! MQTT broker connection manager for ledlink.
//!
//! Owns the single outbound broker connection:
//! - Connect with credentials and optional TLS, bounded by a CONNACK timeout
//! - Fail-fast publish while not connected, traffic log on every publish
//! - Inbound messages recorded in the traffic log
//! - Automatic reconnect with a fixed delay and re-subscription

pub mod config;
pub mod connection;
pub mod error;
pub mod publisher;

pub use config::{BrokerConfig, PublishOptions};
pub use connection::{ConnectionManager, ConnectionState, ConnectionStatus};
pub use error::{MqttError, MqttResult};
pub use publisher::{BoxFuture, DynPublisher, MockPublisher, PublishedMessage, Publisher};
pub use rumqttc::QoS;
