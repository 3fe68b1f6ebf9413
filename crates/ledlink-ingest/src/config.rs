//! Topic and display settings shared by the schedulers and the facade.

use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};

/// Bus topics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicConfig {
    #[serde(default = "default_weather_raw")]
    pub weather_raw: String,
    #[serde(default = "default_weather_display")]
    pub weather_display: String,
    #[serde(default = "default_exchange_raw")]
    pub exchange_raw: String,
    #[serde(default = "default_exchange_display")]
    pub exchange_display: String,
    #[serde(default = "default_custom_message")]
    pub custom_message: String,
    #[serde(default = "default_display_settings")]
    pub display_settings: String,
}

fn default_weather_raw() -> String {
    "home/weather/raw".to_string()
}

fn default_weather_display() -> String {
    "home/weather/led".to_string()
}

fn default_exchange_raw() -> String {
    "home/exchange/raw".to_string()
}

fn default_exchange_display() -> String {
    "home/exchange/led".to_string()
}

fn default_custom_message() -> String {
    "home/custom/message".to_string()
}

fn default_display_settings() -> String {
    "home/led/settings".to_string()
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            weather_raw: default_weather_raw(),
            weather_display: default_weather_display(),
            exchange_raw: default_exchange_raw(),
            exchange_display: default_exchange_display(),
            custom_message: default_custom_message(),
            display_settings: default_display_settings(),
        }
    }
}

/// Display text limits and the clock's time zone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Free text longer than this (in characters) is truncated.
    #[serde(default = "default_max_text_len")]
    pub max_text_len: usize,
    /// Offset from UTC used by the clock display, in seconds (+07:00 default).
    #[serde(default = "default_utc_offset_secs")]
    pub utc_offset_secs: i32,
}

fn default_max_text_len() -> usize {
    100
}

fn default_utc_offset_secs() -> i32 {
    7 * 3600
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            max_text_len: default_max_text_len(),
            utc_offset_secs: default_utc_offset_secs(),
        }
    }
}

impl DisplayConfig {
    /// Clock offset; falls back to UTC when out of range.
    pub fn clock_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_secs).unwrap_or_else(|| Utc.fix())
    }
}
