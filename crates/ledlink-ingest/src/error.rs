//! Ingestion error types.

use ledlink_core::CoreError;
use ledlink_mqtt::{ConnectionState, MqttError};
use ledlink_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    /// Transport failure or non-2xx status from an upstream API.
    #[error("Fetch failed: {0}")]
    Fetch(String),

    /// Unrecognized upstream shape, invalid rate or invalid display input.
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Broker not connected (state: {0})")]
    NotConnected(ConnectionState),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

impl From<MqttError> for IngestError {
    fn from(e: MqttError) -> Self {
        match e {
            MqttError::NotConnected { phase } => Self::NotConnected(phase),
            MqttError::Storage(e) => Self::Storage(e),
            other => Self::Publish(other.to_string()),
        }
    }
}

impl IngestError {
    /// Short label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Fetch(_) => "fetch",
            Self::Core(CoreError::Schema(_)) => "schema",
            Self::Core(CoreError::InvalidRate { .. }) => "invalid_rate",
            Self::Core(_) => "invalid",
            Self::Storage(_) => "storage",
            Self::NotConnected(_) => "not_connected",
            Self::Publish(_) => "publish",
            Self::NotFound(_) => "not_found",
            Self::Encode(_) => "encode",
        }
    }
}

pub type IngestResult<T> = Result<T, IngestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mqtt_not_connected_maps_through() {
        let err: IngestError = MqttError::NotConnected {
            phase: ConnectionState::Reconnecting,
        }
        .into();
        assert!(matches!(
            err,
            IngestError::NotConnected(ConnectionState::Reconnecting)
        ));
        assert_eq!(err.kind(), "not_connected");
    }

    #[test]
    fn test_kind_labels() {
        assert_eq!(IngestError::Fetch("x".into()).kind(), "fetch");
        assert_eq!(
            IngestError::from(CoreError::Schema("x".into())).kind(),
            "schema"
        );
        assert_eq!(
            IngestError::from(CoreError::InvalidRate {
                currency: "VND".into(),
                rate: 0.0
            })
            .kind(),
            "invalid_rate"
        );
    }
}
