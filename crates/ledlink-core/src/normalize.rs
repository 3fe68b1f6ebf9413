//! Upstream response normalization.
//!
//! Two provider schemas evolve independently of each other:
//! - weather: Open-Meteo style `{"current": {temperature_2m, ...}}`
//! - exchange: `{base, rates}` on the free tier, `{base_code, conversion_rates}`
//!   (or `{base, rates}`) on the keyed tier
//!
//! Both are decoded into typed structs first and then matched as variants.

use crate::error::{CoreError, Result};
use crate::types::{CurrencyCode, ExchangeRecord, Location, WeatherRecord};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;

/// Description used for weather codes outside the known table.
pub const UNKNOWN_DESCRIPTION: &str = "Unknown";

/// Base currency assumed when the provider omits it.
const DEFAULT_BASE: &str = "USD";

/// Current-conditions block of the weather provider response.
///
/// Every field is optional; missing values normalize to zero.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CurrentConditions {
    #[serde(default)]
    pub temperature_2m: Option<f64>,
    #[serde(default)]
    pub relative_humidity_2m: Option<f64>,
    #[serde(default)]
    pub pressure_msl: Option<f64>,
    #[serde(default)]
    pub weather_code: Option<i64>,
    #[serde(default)]
    pub wind_speed_10m: Option<f64>,
}

/// Top-level weather provider response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WeatherResponse {
    #[serde(default)]
    pub current: Option<CurrentConditions>,
}

impl WeatherResponse {
    /// Extract the current conditions block.
    pub fn into_current(self) -> Result<CurrentConditions> {
        self.current
            .ok_or_else(|| CoreError::Schema("weather response has no `current` block".into()))
    }
}

/// Map a WMO weather interpretation code to its description.
pub fn describe_weather_code(code: i64) -> &'static str {
    match code {
        0 => "Clear",
        1 => "Mainly Clear",
        2 => "Partly Cloudy",
        3 => "Overcast",
        45 => "Foggy",
        48 => "Depositing Rime Fog",
        51 => "Light Drizzle",
        53 => "Moderate Drizzle",
        55 => "Dense Drizzle",
        56 => "Light Freezing Drizzle",
        57 => "Dense Freezing Drizzle",
        61 => "Slight Rain",
        63 => "Moderate Rain",
        65 => "Heavy Rain",
        66 => "Light Freezing Rain",
        67 => "Heavy Freezing Rain",
        71 => "Slight Snow",
        73 => "Moderate Snow",
        75 => "Heavy Snow",
        77 => "Snow Grains",
        80 => "Slight Rain Showers",
        81 => "Moderate Rain Showers",
        82 => "Violent Rain Showers",
        85 => "Slight Snow Showers",
        86 => "Heavy Snow Showers",
        95 => "Thunderstorm",
        96 => "Thunderstorm with Hail",
        99 => "Thunderstorm with Heavy Hail",
        _ => UNKNOWN_DESCRIPTION,
    }
}

/// Build a canonical weather record. Never fails.
pub fn normalize_weather(
    location: Location,
    current: &CurrentConditions,
    observed_at: DateTime<Utc>,
) -> WeatherRecord {
    let code = current.weather_code.unwrap_or(0);

    WeatherRecord {
        latitude: location.latitude,
        longitude: location.longitude,
        temperature: current.temperature_2m.unwrap_or(0.0),
        humidity: current.relative_humidity_2m.unwrap_or(0.0),
        pressure: current.pressure_msl.unwrap_or(0.0),
        wind_speed: current.wind_speed_10m.unwrap_or(0.0),
        description: describe_weather_code(code).to_string(),
        observed_at,
    }
}

/// Every field either exchange tier may send.
#[derive(Debug, Default, Deserialize)]
struct RawRateResponse {
    #[serde(default)]
    base: Option<String>,
    #[serde(default)]
    rates: Option<BTreeMap<String, f64>>,
    #[serde(default)]
    base_code: Option<String>,
    #[serde(default)]
    conversion_rates: Option<BTreeMap<String, f64>>,
}

/// Recognized exchange response shapes.
#[derive(Debug)]
enum RateShape {
    /// `{base_code, conversion_rates}` (keyed tier).
    Conversion {
        base_code: Option<String>,
        conversion_rates: BTreeMap<String, f64>,
    },
    /// `{base, rates}` (free tier, also served by some keyed providers).
    Rates {
        base: Option<String>,
        rates: BTreeMap<String, f64>,
    },
}

impl RawRateResponse {
    fn classify(self, has_api_key: bool) -> Result<RateShape> {
        match (has_api_key, self.conversion_rates, self.rates) {
            (true, Some(conversion_rates), _) => Ok(RateShape::Conversion {
                base_code: self.base_code,
                conversion_rates,
            }),
            (_, _, Some(rates)) => Ok(RateShape::Rates {
                base: self.base,
                rates,
            }),
            (true, None, None) => Err(CoreError::Schema(
                "exchange response has neither `conversion_rates` nor `rates`".into(),
            )),
            (false, _, None) => Err(CoreError::Schema(
                "exchange response has no `rates`".into(),
            )),
        }
    }
}

/// Rate table for one base currency, as reported by the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct RateTable {
    pub base: CurrencyCode,
    /// Currency code -> rate (units of that currency per one `base`).
    pub rates: BTreeMap<String, f64>,
}

impl RateTable {
    pub fn rate(&self, target: &CurrencyCode) -> Option<f64> {
        self.rates.get(target.as_str()).copied()
    }

    /// Build the record for `target`.
    ///
    /// Returns `Ok(None)` if the provider did not quote `target`, and
    /// `InvalidRate` if it quoted a zero, negative or non-finite value.
    pub fn record(
        &self,
        target: &CurrencyCode,
        observed_at: DateTime<Utc>,
    ) -> Result<Option<ExchangeRecord>> {
        match self.rate(target) {
            Some(rate) => {
                ExchangeRecord::new(self.base.clone(), target.clone(), rate, observed_at).map(Some)
            }
            None => Ok(None),
        }
    }
}

/// Detect the response shape and extract the rate table.
pub fn normalize_exchange(response: &serde_json::Value, has_api_key: bool) -> Result<RateTable> {
    if !response.is_object() {
        return Err(CoreError::Schema("exchange response is not an object".into()));
    }

    let raw = RawRateResponse::deserialize(response)
        .map_err(|e| CoreError::Schema(format!("exchange response: {e}")))?;

    let (base, rates) = match raw.classify(has_api_key)? {
        RateShape::Conversion {
            base_code,
            conversion_rates,
        } => (base_code, conversion_rates),
        RateShape::Rates { base, rates } => (base, rates),
    };

    let base = base.as_deref().unwrap_or(DEFAULT_BASE).parse()?;
    Ok(RateTable { base, rates })
}
