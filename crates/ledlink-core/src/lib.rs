//! Core domain types for the ledlink display bridge.
//!
//! This crate provides the provider-agnostic pieces used throughout the pipeline:
//! - `WeatherRecord`, `ExchangeRecord`: canonical records produced by ingestion
//! - `TrafficLogEntry`, `DisplayMessage`: bus audit and display history rows
//! - `normalize`: upstream response shapes -> canonical records
//! - `format`: canonical records -> bounded device display strings

pub mod error;
pub mod format;
pub mod normalize;
pub mod types;

pub use error::{CoreError, Result};
pub use format::{
    format_clock, format_exchange, format_weather, format_weather_summary, truncate_text,
    NO_DATA,
};
pub use normalize::{
    describe_weather_code, normalize_exchange, normalize_weather, CurrentConditions, RateTable,
    WeatherResponse, UNKNOWN_DESCRIPTION,
};
pub use types::{
    CurrencyCode, Direction, DisplayMessage, DisplayMode, DisplaySettings, ExchangeRecord,
    Location, TrafficLogEntry, WeatherRecord,
};
