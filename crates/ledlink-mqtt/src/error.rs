//! Broker error types.

use crate::connection::ConnectionState;
use ledlink_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MqttError {
    #[error("Connect failed: {0}")]
    Connect(String),

    #[error("Not connected (state: {phase})")]
    NotConnected { phase: ConnectionState },

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Traffic log write failed: {0}")]
    Storage(#[from] StoreError),

    #[error("Invalid broker configuration: {0}")]
    Config(String),
}

pub type MqttResult<T> = Result<T, MqttError>;
