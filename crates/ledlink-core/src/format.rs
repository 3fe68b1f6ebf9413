//! Display formatting for the LED matrix.
//!
//! All functions are pure and total: `None` input renders as [`NO_DATA`].

use crate::types::{ExchangeRecord, WeatherRecord};
use chrono::{DateTime, FixedOffset};

/// Text shown when there is nothing to display.
pub const NO_DATA: &str = "No data";

/// Maximum characters of the weather description shown on the device.
const DESCRIPTION_WIDTH: usize = 10;

/// Round half toward positive infinity.
fn round_half_up(value: f64) -> i64 {
    (value + 0.5).floor() as i64
}

/// Keep at most `max_chars` characters of `text`.
pub fn truncate_text(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// `"Temp: 31C Partly Clo H:70%"`
pub fn format_weather(weather: Option<&WeatherRecord>) -> String {
    let Some(weather) = weather else {
        return NO_DATA.to_string();
    };

    format!(
        "Temp: {}C {} H:{}%",
        round_half_up(weather.temperature),
        truncate_text(&weather.description, DESCRIPTION_WIDTH),
        round_half_up(weather.humidity)
    )
}

/// `"USD/VND: 24567.89"`
pub fn format_exchange(exchange: Option<&ExchangeRecord>) -> String {
    let Some(exchange) = exchange else {
        return NO_DATA.to_string();
    };

    format!(
        "{}/{}: {:.2}",
        exchange.base_currency(),
        exchange.target_currency(),
        exchange.rate()
    )
}

/// Long form used when the latest weather is pushed as a custom message.
pub fn format_weather_summary(weather: &WeatherRecord) -> String {
    format!(
        "{} - {}°C - {}%",
        weather.description, weather.temperature, weather.humidity
    )
}

/// `"14:05:09 - 16/10/2026"`
pub fn format_clock(now: DateTime<FixedOffset>) -> String {
    now.format("%H:%M:%S - %d/%m/%Y").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn weather(temperature: f64, humidity: f64, description: &str) -> WeatherRecord {
        WeatherRecord {
            latitude: 10.76,
            longitude: 106.66,
            temperature,
            humidity,
            pressure: 1010.0,
            wind_speed: 3.2,
            description: description.to_string(),
            observed_at: Utc::now(),
        }
    }

    #[test]
    fn test_format_exchange_two_decimals() {
        let record = ExchangeRecord::new(
            "USD".parse().unwrap(),
            "VND".parse().unwrap(),
            24567.891,
            Utc::now(),
        )
        .unwrap();
        assert_eq!(format_exchange(Some(&record)), "USD/VND: 24567.89");
    }

    #[test]
    fn test_format_none_is_no_data() {
        assert_eq!(format_weather(None), "No data");
        assert_eq!(format_exchange(None), "No data");
    }

    #[test]
    fn test_format_weather_rounds_and_truncates() {
        let record = weather(31.5, 69.4, "Thunderstorm with Hail");
        assert_eq!(format_weather(Some(&record)), "Temp: 32C Thundersto H:69%");
    }

    #[test]
    fn test_format_weather_short_description_untouched() {
        let record = weather(-2.5, 100.0, "Clear");
        assert_eq!(format_weather(Some(&record)), "Temp: -2C Clear H:100%");
    }

    #[test]
    fn test_truncate_text_counts_characters() {
        assert_eq!(truncate_text("Mưa rào nhẹ", 3), "Mưa");
        assert_eq!(truncate_text("abc", 10), "abc");
        assert_eq!(truncate_text("", 5), "");
    }

    #[test]
    fn test_weather_summary() {
        let record = weather(30.5, 65.0, "Overcast");
        assert_eq!(format_weather_summary(&record), "Overcast - 30.5°C - 65%");
    }

    #[test]
    fn test_clock_format() {
        let tz = FixedOffset::east_opt(7 * 3600).unwrap();
        let now = tz.with_ymd_and_hms(2026, 10, 16, 14, 5, 9).unwrap();
        assert_eq!(format_clock(now), "14:05:09 - 16/10/2026");
    }
}
