//! Exchange-rate ingestion scheduler.

use crate::config::TopicConfig;
use crate::cycle::{spawn_periodic, CyclePhase, PhaseTracker};
use crate::error::IngestResult;
use crate::rotation::RotationCursor;
use crate::source::RateSource;
use chrono::Utc;
use ledlink_core::{format_exchange, normalize_exchange, CurrencyCode, ExchangeRecord};
use ledlink_mqtt::{DynPublisher, PublishOptions};
use ledlink_store::Store;
use ledlink_telemetry::Metrics;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

const DOMAIN: &str = "exchange";

/// Fetches the rate table once per cycle, stores and publishes every watched
/// currency, and shows one of them on the display in rotation.
pub struct ExchangeScheduler {
    source: Arc<dyn RateSource>,
    store: Arc<Store>,
    publisher: DynPublisher,
    topics: TopicConfig,
    options: PublishOptions,
    watch_list: Vec<CurrencyCode>,
    cursor: Mutex<RotationCursor>,
    phase: PhaseTracker,
}

impl ExchangeScheduler {
    pub fn new(
        source: Arc<dyn RateSource>,
        store: Arc<Store>,
        publisher: DynPublisher,
        topics: TopicConfig,
        options: PublishOptions,
        watch_list: Vec<CurrencyCode>,
    ) -> Self {
        Self {
            source,
            store,
            publisher,
            topics,
            options,
            watch_list,
            cursor: Mutex::new(RotationCursor::new()),
            phase: PhaseTracker::new(DOMAIN),
        }
    }

    pub fn watch_list(&self) -> &[CurrencyCode] {
        &self.watch_list
    }

    pub fn cursor(&self) -> RotationCursor {
        *self.cursor.lock()
    }

    pub fn phase(&self) -> CyclePhase {
        self.phase.current()
    }

    /// Run one cycle; returns the records stored in this cycle.
    pub async fn run_once(&self) -> IngestResult<Vec<ExchangeRecord>> {
        let started = Instant::now();
        let result = self.cycle().await;

        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.kind(),
        };
        Metrics::cycle(DOMAIN, outcome, started.elapsed().as_secs_f64() * 1000.0);
        result
    }

    async fn cycle(&self) -> IngestResult<Vec<ExchangeRecord>> {
        let guard = self.phase.begin();
        let response = self.source.fetch_rates().await?;

        guard.advance(CyclePhase::Normalizing);
        let table = normalize_exchange(&response, self.source.has_api_key())?;
        let observed_at = Utc::now();

        // Validate every watched rate before anything is written.
        let mut records = Vec::with_capacity(self.watch_list.len());
        for target in &self.watch_list {
            match table.record(target, observed_at)? {
                Some(record) => records.push(record),
                None => debug!(currency = %target, "Currency not quoted, skipping"),
            }
        }

        // Every row is stored before the first publish, so a broker outage
        // never leaves gaps in the history.
        guard.advance(CyclePhase::Persisting);
        for record in &records {
            self.store.insert_exchange(record)?;
        }

        guard.advance(CyclePhase::Publishing);
        for record in &records {
            let raw = serde_json::to_string(record)?;
            if let Err(e) = self
                .publisher
                .publish(&self.topics.exchange_raw, &raw, self.options)
                .await
            {
                warn!(
                    error = %e,
                    stored = records.len(),
                    "Exchange publish failed, rows kept"
                );
                return Err(e.into());
            }
        }

        self.publish_rotation(&records).await?;

        info!(
            base = %table.base,
            stored = records.len(),
            watched = self.watch_list.len(),
            "Exchange cycle complete"
        );
        Ok(records)
    }

    /// Show the record under the cursor, then advance it. Nothing happens for
    /// an empty result set.
    async fn publish_rotation(&self, records: &[ExchangeRecord]) -> IngestResult<()> {
        // The lock is not held across the publish; overlapping cycles may
        // show the same entry twice.
        let Some(idx) = self.cursor.lock().select(records.len()) else {
            debug!("No exchange records, display unchanged");
            return Ok(());
        };

        let text = format_exchange(Some(&records[idx]));
        self.publisher
            .publish(&self.topics.exchange_display, &text, self.options)
            .await?;

        let mut cursor = self.cursor.lock();
        cursor.advance(records.len());
        Metrics::rotation_index(cursor.index());
        Ok(())
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
                    warn!(error = %e, kind = e.kind(), "Scheduled exchange cycle failed");
                }
            }
        })
    }
}
