//! Application configuration.
//!
//! Loaded from a TOML file and layered with `LEDLINK__`-prefixed environment
//! variables (`LEDLINK__BROKER__PASSWORD`, `LEDLINK__APIS__EXCHANGE_API_KEY`).
//! `LEDLINK__EXCHANGE__WATCH_LIST` takes a comma separated list.
//! Every section and field has a default, so a missing file is not an error.

use crate::error::{AppError, AppResult};
use config::{Config, Environment, File, FileFormat};
use ledlink_core::{CurrencyCode, Location};
use ledlink_ingest::{DisplayConfig, TopicConfig};
use ledlink_mqtt::BrokerConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Environment variable prefix for overrides.
const ENV_PREFIX: &str = "LEDLINK";

/// Upstream API endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_weather_url")]
    pub weather_url: String,
    /// Free exchange-rate endpoint, used when no API key is set.
    #[serde(default = "default_exchange_url")]
    pub exchange_url: String,
    /// Keyed endpoint root; requests go to `{root}/{key}/latest/{base}`.
    #[serde(default = "default_exchange_keyed_url")]
    pub exchange_keyed_url: String,
    #[serde(default, skip_serializing)]
    pub exchange_api_key: Option<String>,
    #[serde(default = "default_base_currency")]
    pub base_currency: String,
}

fn default_weather_url() -> String {
    "https://api.open-meteo.com/v1/forecast".to_string()
}

fn default_exchange_url() -> String {
    "https://api.exchangerate-api.com/v4/latest/USD".to_string()
}

fn default_exchange_keyed_url() -> String {
    "https://v6.exchangerate-api.com/v6".to_string()
}

fn default_base_currency() -> String {
    "USD".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            weather_url: default_weather_url(),
            exchange_url: default_exchange_url(),
            exchange_keyed_url: default_exchange_keyed_url(),
            exchange_api_key: None,
            base_currency: default_base_currency(),
        }
    }
}

impl ApiConfig {
    pub fn base_currency(&self) -> AppResult<CurrencyCode> {
        Ok(self.base_currency.parse()?)
    }
}

/// Scheduler timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_weather_interval_secs")]
    pub weather_interval_secs: u64,
    #[serde(default = "default_exchange_interval_secs")]
    pub exchange_interval_secs: u64,
    /// How long shutdown waits for in-flight cycles.
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

fn default_weather_interval_secs() -> u64 {
    300
}

fn default_exchange_interval_secs() -> u64 {
    600
}

fn default_shutdown_timeout_secs() -> u64 {
    10
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            weather_interval_secs: default_weather_interval_secs(),
            exchange_interval_secs: default_exchange_interval_secs(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

impl ScheduleConfig {
    pub fn weather_interval(&self) -> Duration {
        Duration::from_secs(self.weather_interval_secs)
    }

    pub fn exchange_interval(&self) -> Duration {
        Duration::from_secs(self.exchange_interval_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// Initial weather location.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LocationConfig {
    #[serde(default = "default_latitude")]
    pub latitude: f64,
    #[serde(default = "default_longitude")]
    pub longitude: f64,
}

fn default_latitude() -> f64 {
    10.762622
}

fn default_longitude() -> f64 {
    106.660172
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            latitude: default_latitude(),
            longitude: default_longitude(),
        }
    }
}

impl LocationConfig {
    pub fn location(&self) -> Location {
        Location::new(self.latitude, self.longitude)
    }
}

/// Currencies stored, published and rotated on the display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    #[serde(default = "default_watch_list")]
    pub watch_list: Vec<String>,
}

fn default_watch_list() -> Vec<String> {
    ["VND", "EUR", "GBP", "JPY", "CNY", "AUD"]
        .iter()
        .map(|c| c.to_string())
        .collect()
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            watch_list: default_watch_list(),
        }
    }
}

impl ExchangeConfig {
    pub fn watch_list(&self) -> AppResult<Vec<CurrencyCode>> {
        self.watch_list
            .iter()
            .map(|c| c.parse().map_err(AppError::from))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./database.sqlite")
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

/// Prometheus textfile export. Disabled unless a path is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default)]
    pub metrics_textfile: Option<PathBuf>,
    #[serde(default = "default_metrics_interval_secs")]
    pub metrics_interval_secs: u64,
}

fn default_metrics_interval_secs() -> u64 {
    15
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            metrics_textfile: None,
            metrics_interval_secs: default_metrics_interval_secs(),
        }
    }
}

impl TelemetryConfig {
    pub fn metrics_interval(&self) -> Duration {
        Duration::from_secs(self.metrics_interval_secs)
    }
}

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub topics: TopicConfig,
    #[serde(default)]
    pub apis: ApiConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub location: LocationConfig,
    #[serde(default)]
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    /// Load from `path` (optional) plus environment overrides, then validate.
    pub fn load(path: &str) -> AppResult<Self> {
        if !Path::new(path).exists() {
            warn!(path = %path, "Config file not found, using defaults");
        }

        let settings = Config::builder()
            .add_source(File::new(path, FileFormat::Toml).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("exchange.watch_list")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse TOML text without environment overrides.
    pub fn from_toml(content: &str) -> AppResult<Self> {
        let settings = Config::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?;
        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        self.broker.validate()?;

        if self.schedule.weather_interval_secs == 0 || self.schedule.exchange_interval_secs == 0 {
            return Err(AppError::Config(
                "schedule intervals must be greater than zero".to_string(),
            ));
        }
        if self.telemetry.metrics_textfile.is_some() && self.telemetry.metrics_interval_secs == 0 {
            return Err(AppError::Config(
                "telemetry.metrics_interval_secs must be greater than zero".to_string(),
            ));
        }

        let loc = self.location;
        if !(-90.0..=90.0).contains(&loc.latitude) || !(-180.0..=180.0).contains(&loc.longitude) {
            return Err(AppError::Config(format!(
                "location out of range: {}, {}",
                loc.latitude, loc.longitude
            )));
        }

        self.apis.base_currency()?;
        self.exchange.watch_list()?;
        Ok(())
    }
}
