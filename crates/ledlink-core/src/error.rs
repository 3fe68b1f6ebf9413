//! Error types for ledlink-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Upstream payload carried none of the recognized fields.
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Invalid rate for {currency}: {rate}")]
    InvalidRate { currency: String, rate: f64 },

    #[error("Invalid currency code: {0}")]
    InvalidCurrency(String),

    #[error("Invalid display settings: {0}")]
    InvalidSettings(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
