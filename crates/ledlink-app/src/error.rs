//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Core error: {0}")]
    Core(#[from] ledlink_core::CoreError),

    #[error("Storage error: {0}")]
    Storage(#[from] ledlink_store::StoreError),

    #[error("Broker error: {0}")]
    Mqtt(#[from] ledlink_mqtt::MqttError),

    #[error("Ingest error: {0}")]
    Ingest(#[from] ledlink_ingest::IngestError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] ledlink_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(e: config::ConfigError) -> Self {
        AppError::Config(e.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
