//! Typed facade over the schedulers, store and broker.
//!
//! This is the surface an HTTP or CLI control layer calls into. Every
//! operation returns its error to the caller; nothing here is retried.

use crate::config::{DisplayConfig, TopicConfig};
use crate::error::{IngestError, IngestResult};
use crate::exchange::ExchangeScheduler;
use crate::weather::WeatherScheduler;
use chrono::{DateTime, Utc};
use ledlink_core::{
    format_clock, format_exchange, format_weather_summary, truncate_text, CoreError,
    CurrencyCode, DisplayMessage, DisplayMode, DisplaySettings, ExchangeRecord, Location,
    WeatherRecord,
};
use ledlink_mqtt::{ConnectionStatus, DynPublisher, PublishOptions};
use ledlink_store::{ExchangeFilter, Store};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

const PIVOT: &str = "USD";

/// Rate for a currency pair, either stored directly or derived through USD.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateQuote {
    pub base: CurrencyCode,
    pub target: CurrencyCode,
    pub rate: f64,
    pub observed_at: DateTime<Utc>,
    /// True when computed from the USD legs of both currencies.
    pub converted: bool,
}

impl RateQuote {
    fn direct(record: &ExchangeRecord) -> Self {
        Self {
            base: record.base_currency().clone(),
            target: record.target_currency().clone(),
            rate: record.rate(),
            observed_at: record.observed_at(),
            converted: false,
        }
    }

    /// Display line for this quote, e.g. `"EUR/VND: 27173.91"`.
    pub fn display_text(&self) -> IngestResult<String> {
        let record = ExchangeRecord::new(
            self.base.clone(),
            self.target.clone(),
            self.rate,
            self.observed_at,
        )?;
        Ok(format_exchange(Some(&record)))
    }
}

pub struct Pipeline {
    weather: Arc<WeatherScheduler>,
    exchange: Arc<ExchangeScheduler>,
    store: Arc<Store>,
    publisher: DynPublisher,
    topics: TopicConfig,
    display: DisplayConfig,
    options: PublishOptions,
}

impl Pipeline {
    pub fn new(
        weather: Arc<WeatherScheduler>,
        exchange: Arc<ExchangeScheduler>,
        store: Arc<Store>,
        publisher: DynPublisher,
        topics: TopicConfig,
        display: DisplayConfig,
        options: PublishOptions,
    ) -> Self {
        Self {
            weather,
            exchange,
            store,
            publisher,
            topics,
            display,
            options,
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn weather(&self) -> &Arc<WeatherScheduler> {
        &self.weather
    }

    pub fn exchange(&self) -> &Arc<ExchangeScheduler> {
        &self.exchange
    }

    /// Run a weather cycle now. A given location becomes the scheduler's
    /// location for later cycles too.
    pub async fn trigger_weather_fetch(
        &self,
        location: Option<Location>,
    ) -> IngestResult<WeatherRecord> {
        if let Some(location) = location {
            self.weather.set_location(location);
        }
        self.weather.run_once().await
    }

    /// Run an exchange cycle now. Rows are stored even while the broker is
    /// down; the publish error is returned afterwards.
    pub async fn trigger_exchange_fetch(&self) -> IngestResult<Vec<ExchangeRecord>> {
        self.exchange.run_once().await
    }

    /// Store and publish free text on the custom message topic.
    ///
    /// Text is trimmed and bounded to `max_text_len` characters. Fails with
    /// `NotConnected` before anything is stored if the broker is down.
    pub async fn publish_display_text(
        &self,
        text: &str,
        mode: Option<DisplayMode>,
    ) -> IngestResult<DisplayMessage> {
        let text = text.trim();
        if text.is_empty() {
            return Err(CoreError::InvalidSettings("message is empty".to_string()).into());
        }
        self.ensure_connected()?;

        let message = DisplayMessage::new(truncate_text(text, self.display.max_text_len), mode);
        let id = self.store.insert_message(&message)?;
        self.publisher
            .publish(&self.topics.custom_message, &message.message, self.options)
            .await?;

        info!(id, text = %message.message, mode = ?mode, "Display text published");
        Ok(message)
    }

    /// Validate and publish display settings; returns the JSON payload sent.
    pub async fn publish_display_settings(
        &self,
        settings: &DisplaySettings,
    ) -> IngestResult<String> {
        let payload = settings.to_payload()?;
        self.publisher
            .publish(&self.topics.display_settings, &payload, self.options)
            .await?;

        info!(payload = %payload, "Display settings published");
        Ok(payload)
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.publisher.status()
    }

    /// Latest rate for `base`/`target`.
    ///
    /// Falls back to the cross rate `(USD/target) / (USD/base)` when the pair
    /// itself was never stored and neither side is USD.
    pub fn lookup_rate(
        &self,
        base: &CurrencyCode,
        target: &CurrencyCode,
    ) -> IngestResult<RateQuote> {
        let direct = self
            .store
            .latest_exchange(&ExchangeFilter::pair(base.clone(), target.clone()))?;
        if let Some(row) = direct {
            return Ok(RateQuote::direct(&row.record));
        }

        if base.as_str() != PIVOT && target.as_str() != PIVOT {
            let pivot: CurrencyCode = PIVOT.parse()?;
            let usd_base = self
                .store
                .latest_exchange(&ExchangeFilter::pair(pivot.clone(), base.clone()))?;
            let usd_target = self
                .store
                .latest_exchange(&ExchangeFilter::pair(pivot, target.clone()))?;

            if let (Some(usd_base), Some(usd_target)) = (usd_base, usd_target) {
                let rate = usd_target.record.rate() / usd_base.record.rate();
                debug!(%base, %target, rate, "Derived cross rate through USD");
                return Ok(RateQuote {
                    base: base.clone(),
                    target: target.clone(),
                    rate,
                    observed_at: usd_base
                        .record
                        .observed_at()
                        .min(usd_target.record.observed_at()),
                    converted: true,
                });
            }
        }

        Err(IngestError::NotFound(format!(
            "no exchange rate for {base}/{target}"
        )))
    }

    /// Push one pair's rate to the display as custom text.
    pub async fn display_exchange_pair(
        &self,
        base: &CurrencyCode,
        target: &CurrencyCode,
    ) -> IngestResult<RateQuote> {
        let quote = self.lookup_rate(base, target)?;
        let text = quote.display_text()?;
        self.publish_display_text(&text, None).await?;
        Ok(quote)
    }

    /// Push the time at `now` (in the configured offset) to the display.
    pub async fn display_clock(&self, now: DateTime<Utc>) -> IngestResult<String> {
        let text = format_clock(now.with_timezone(&self.display.clock_offset()));
        self.publish_display_text(&text, None).await?;
        Ok(text)
    }

    /// Push the latest stored weather summary to the display.
    pub async fn display_latest_weather(&self) -> IngestResult<WeatherRecord> {
        let latest = self
            .store
            .latest_weather()?
            .ok_or_else(|| IngestError::NotFound("no weather data".to_string()))?;

        let text = format_weather_summary(&latest.record);
        self.publish_display_text(&text, None).await?;
        Ok(latest.record)
    }

    fn ensure_connected(&self) -> IngestResult<()> {
        let status = self.publisher.status();
        if status.is_connected() {
            Ok(())
        } else {
            Err(IngestError::NotConnected(status.phase))
        }
    }
}
