//! ledlink bridge application.
//!
//! Wires the pipeline together:
//! - SQLite store and the single MQTT broker connection
//! - Weather and exchange-rate schedulers
//! - Optional Prometheus textfile export
//! - Signal-driven graceful shutdown

pub mod app;
pub mod config;
pub mod error;

pub use app::Application;
pub use config::AppConfig;
pub use error::{AppError, AppResult};
