//! Canonical records and value types shared by every ledlink crate.

use crate::error::{CoreError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Geographic location used for weather lookups.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}", self.latitude, self.longitude)
    }
}

/// Normalized weather observation.
///
/// Independent of the upstream provider's field names. Rows are immutable once
/// written; the "current" observation is simply the latest by `observed_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherRecord {
    pub latitude: f64,
    pub longitude: f64,
    /// Air temperature at 2m (°C).
    pub temperature: f64,
    /// Relative humidity at 2m (%).
    pub humidity: f64,
    /// Mean sea level pressure (hPa).
    pub pressure: f64,
    /// Wind speed at 10m (km/h).
    pub wind_speed: f64,
    /// Human readable condition (e.g. "Partly Cloudy").
    pub description: String,
    pub observed_at: DateTime<Utc>,
}

impl WeatherRecord {
    pub fn location(&self) -> Location {
        Location::new(self.latitude, self.longitude)
    }
}

/// ISO-4217 style three letter currency code (upper case ASCII).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode(String);

impl CurrencyCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for CurrencyCode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let code = s.trim().to_ascii_uppercase();
        if code.len() == 3 && code.bytes().all(|b| b.is_ascii_uppercase()) {
            Ok(Self(code))
        } else {
            Err(CoreError::InvalidCurrency(s.to_string()))
        }
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<CurrencyCode> for String {
    fn from(code: CurrencyCode) -> Self {
        code.0
    }
}

impl AsRef<str> for CurrencyCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalized exchange rate for one currency pair.
///
/// The constructor enforces `rate > 0` (and finite); there is no way to build
/// a record that violates it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExchangeRecord {
    base_currency: CurrencyCode,
    target_currency: CurrencyCode,
    rate: f64,
    observed_at: DateTime<Utc>,
}

impl ExchangeRecord {
    pub fn new(
        base_currency: CurrencyCode,
        target_currency: CurrencyCode,
        rate: f64,
        observed_at: DateTime<Utc>,
    ) -> Result<Self> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(CoreError::InvalidRate {
                currency: target_currency.to_string(),
                rate,
            });
        }

        Ok(Self {
            base_currency,
            target_currency,
            rate,
            observed_at,
        })
    }

    pub fn base_currency(&self) -> &CurrencyCode {
        &self.base_currency
    }

    pub fn target_currency(&self) -> &CurrencyCode {
        &self.target_currency
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn observed_at(&self) -> DateTime<Utc> {
        self.observed_at
    }
}

/// Traffic direction on the message bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Publish,
    Subscribe,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Publish => "publish",
            Self::Subscribe => "subscribe",
        }
    }
}

impl FromStr for Direction {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "publish" => Ok(Self::Publish),
            "subscribe" => Ok(Self::Subscribe),
            other => Err(CoreError::Schema(format!("unknown direction: {other}"))),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message seen on the bus, in either direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficLogEntry {
    pub topic: String,
    pub payload: String,
    pub direction: Direction,
    pub at: DateTime<Utc>,
}

impl TrafficLogEntry {
    pub fn publish(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            direction: Direction::Publish,
            at: Utc::now(),
        }
    }

    pub fn subscribe(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            direction: Direction::Subscribe,
            at: Utc::now(),
        }
    }
}

/// LED matrix display animation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayMode {
    ScrollLeft,
    ScrollRight,
    Blink,
}

impl DisplayMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ScrollLeft => "scroll_left",
            Self::ScrollRight => "scroll_right",
            Self::Blink => "blink",
        }
    }
}

impl FromStr for DisplayMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "scroll_left" => Ok(Self::ScrollLeft),
            "scroll_right" => Ok(Self::ScrollRight),
            "blink" => Ok(Self::Blink),
            other => Err(CoreError::InvalidSettings(format!("unknown mode: {other}"))),
        }
    }
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Free text sent to the display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayMessage {
    pub message: String,
    pub mode: Option<DisplayMode>,
    pub at: DateTime<Utc>,
}

impl DisplayMessage {
    pub fn new(message: impl Into<String>, mode: Option<DisplayMode>) -> Self {
        Self {
            message: message.into(),
            mode,
            at: Utc::now(),
        }
    }
}

/// Display settings pushed to the device. Absent fields are left unchanged
/// on the device and omitted from the payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplaySettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<DisplayMode>,
    /// Scroll speed, 1-10.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<u8>,
    /// Brightness, 1-15.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brightness: Option<u8>,
}

impl DisplaySettings {
    pub const SPEED_RANGE: std::ops::RangeInclusive<u8> = 1..=10;
    pub const BRIGHTNESS_RANGE: std::ops::RangeInclusive<u8> = 1..=15;

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if let Some(speed) = self.speed {
            if !Self::SPEED_RANGE.contains(&speed) {
                return Err(CoreError::InvalidSettings(format!(
                    "speed {speed} outside 1-10"
                )));
            }
        }
        if let Some(brightness) = self.brightness {
            if !Self::BRIGHTNESS_RANGE.contains(&brightness) {
                return Err(CoreError::InvalidSettings(format!(
                    "brightness {brightness} outside 1-15"
                )));
            }
        }
        Ok(())
    }

    /// Serialize to the JSON payload the device expects.
    pub fn to_payload(&self) -> Result<String> {
        self.validate()?;
        Ok(serde_json::to_string(self)?)
    }
}
