//! Weather ingestion scheduler.

use crate::config::TopicConfig;
use crate::cycle::{spawn_periodic, CyclePhase, PhaseTracker};
use crate::error::IngestResult;
use crate::source::WeatherSource;
use chrono::Utc;
use ledlink_core::{format_weather, normalize_weather, Location, WeatherRecord};
use ledlink_mqtt::{DynPublisher, PublishOptions};
use ledlink_store::Store;
use ledlink_telemetry::Metrics;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

const DOMAIN: &str = "weather";

/// Fetches current conditions for one location, persists them and publishes
/// both the raw JSON and the display line.
pub struct WeatherScheduler {
    source: Arc<dyn WeatherSource>,
    store: Arc<Store>,
    publisher: DynPublisher,
    topics: TopicConfig,
    options: PublishOptions,
    location: RwLock<Location>,
    phase: PhaseTracker,
}

impl WeatherScheduler {
    pub fn new(
        source: Arc<dyn WeatherSource>,
        store: Arc<Store>,
        publisher: DynPublisher,
        topics: TopicConfig,
        options: PublishOptions,
        location: Location,
    ) -> Self {
        Self {
            source,
            store,
            publisher,
            topics,
            options,
            location: RwLock::new(location),
            phase: PhaseTracker::new(DOMAIN),
        }
    }

    pub fn location(&self) -> Location {
        *self.location.read()
    }

    /// Change the location used by subsequent cycles.
    pub fn set_location(&self, location: Location) {
        info!(%location, "Weather location updated");
        *self.location.write() = location;
    }

    pub fn phase(&self) -> CyclePhase {
        self.phase.current()
    }

    /// Run one cycle for the current location.
    pub async fn run_once(&self) -> IngestResult<WeatherRecord> {
        self.run_once_at(self.location()).await
    }

    /// Run one cycle for `location` without changing the stored location.
    pub async fn run_once_at(&self, location: Location) -> IngestResult<WeatherRecord> {
        let started = Instant::now();
        let result = self.cycle(location).await;

        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.kind(),
        };
        Metrics::cycle(DOMAIN, outcome, started.elapsed().as_secs_f64() * 1000.0);
        result
    }

    async fn cycle(&self, location: Location) -> IngestResult<WeatherRecord> {
        let guard = self.phase.begin();
        let response = self.source.fetch_current(location).await?;

        guard.advance(CyclePhase::Normalizing);
        let current = response.into_current()?;
        let record = normalize_weather(location, &current, Utc::now());

        guard.advance(CyclePhase::Persisting);
        let id = self.store.insert_weather(&record)?;

        guard.advance(CyclePhase::Publishing);
        let raw = serde_json::to_string(&record)?;
        self.publisher
            .publish(&self.topics.weather_raw, &raw, self.options)
            .await?;

        let text = format_weather(Some(&record));
        self.publisher
            .publish(&self.topics.weather_display, &text, self.options)
            .await?;

        info!(
            id,
            %location,
            temperature = record.temperature,
            humidity = record.humidity,
            description = %record.description,
            "Weather cycle complete"
        );
        Ok(record)
    }

    /// Start the fixed-interval timer. Failures are logged and counted only.
    pub fn start(
        self: &Arc<Self>,
        period: Duration,
        shutdown: CancellationToken,
        tracker: TaskTracker,
    ) -> JoinHandle<()> {
        let this = Arc::clone(self);
        spawn_periodic(DOMAIN, period, shutdown, tracker, move || {
            let this = Arc::clone(&this);
            async move {
                if let Err(e) = this.run_once().await {
                    warn!(error = %e, kind = e.kind(), "Scheduled weather cycle failed");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IngestError;
    use crate::source::StaticWeatherSource;
    use ledlink_mqtt::{ConnectionState, MockPublisher};
    use ledlink_store::Table;
    use serde_json::json;

    fn sample_body() -> serde_json::Value {
        json!({
            "current": {
                "temperature_2m": 31.6,
                "relative_humidity_2m": 70.2,
                "pressure_msl": 1008.4,
                "weather_code": 2,
                "wind_speed_10m": 9.1
            }
        })
    }

    fn scheduler(
        source: StaticWeatherSource,
    ) -> (Arc<WeatherScheduler>, Arc<MockPublisher>, Arc<Store>) {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let publisher = Arc::new(MockPublisher::new());
        let scheduler = WeatherScheduler::new(
            Arc::new(source),
            store.clone(),
            publisher.clone(),
            TopicConfig::default(),
            PublishOptions::default(),
            Location::new(10.762622, 106.660172),
        );
        (Arc::new(scheduler), publisher, store)
    }

    #[tokio::test]
    async fn test_cycle_persists_and_publishes_raw_then_display() {
        let (scheduler, publisher, store) = scheduler(StaticWeatherSource::ok(sample_body()));

        let record = scheduler.run_once().await.unwrap();
        assert_eq!(record.description, "Partly Cloudy");
        assert_eq!(store.count(Table::Weather).unwrap(), 1);

        let published = publisher.published();
        assert_eq!(published.len(), 2);
        assert_eq!(published[0].topic, "home/weather/raw");
        let raw: serde_json::Value = serde_json::from_str(&published[0].payload).unwrap();
        assert_eq!(raw["temperature"], 31.6);
        assert_eq!(published[1].topic, "home/weather/led");
        assert_eq!(published[1].payload, "Temp: 32C Partly Clo H:70%");
        assert_eq!(scheduler.phase(), CyclePhase::Idle);
    }

    #[tokio::test]
    async fn test_fetch_error_aborts_before_persist() {
        let source = StaticWeatherSource::new(vec![Err("timeout".to_string())]);
        let (scheduler, publisher, store) = scheduler(source);

        let err = scheduler.run_once().await.unwrap_err();
        assert!(matches!(err, IngestError::Fetch(_)));
        assert_eq!(store.count(Table::Weather).unwrap(), 0);
        assert!(publisher.published().is_empty());
        assert_eq!(scheduler.phase(), CyclePhase::Idle);
    }

    #[tokio::test]
    async fn test_missing_current_block_is_schema_error() {
        let (scheduler, _publisher, store) = scheduler(StaticWeatherSource::ok(json!({})));

        let err = scheduler.run_once().await.unwrap_err();
        assert_eq!(err.kind(), "schema");
        assert_eq!(store.count(Table::Weather).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_not_connected_keeps_persisted_row() {
        let (scheduler, publisher, store) = scheduler(StaticWeatherSource::ok(sample_body()));
        publisher.set_state(ConnectionState::Reconnecting);

        let err = scheduler.run_once().await.unwrap_err();
        assert!(matches!(
            err,
            IngestError::NotConnected(ConnectionState::Reconnecting)
        ));
        assert_eq!(store.count(Table::Weather).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_run_once_at_uses_given_location_only() {
        let (scheduler, _publisher, _store) = scheduler(StaticWeatherSource::ok(sample_body()));
        let hanoi = Location::new(21.0285, 105.8542);

        let record = scheduler.run_once_at(hanoi).await.unwrap();
        assert_eq!(record.location(), hanoi);
        assert_eq!(scheduler.location(), Location::new(10.762622, 106.660172));

        scheduler.set_location(hanoi);
        assert_eq!(scheduler.location(), hanoi);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_tick_does_not_stop_timer() {
        let source = StaticWeatherSource::new(vec![Err("down".to_string()), Ok(sample_body())]);
        let (scheduler, publisher, store) = scheduler(source);
        let shutdown = CancellationToken::new();
        let tracker = TaskTracker::new();

        scheduler.start(Duration::from_secs(300), shutdown.clone(), tracker.clone());

        // Tick at t=0 fails, tick at t=300 succeeds.
        tokio::time::sleep(Duration::from_secs(301)).await;

        assert_eq!(store.count(Table::Weather).unwrap(), 1);
        assert_eq!(publisher.payloads_on("home/weather/led").len(), 1);

        shutdown.cancel();
        tracker.close();
        tracker.wait().await;
    }
}
