//! Main application orchestration.
//!
//! Startup order: open the store, connect the broker, build the schedulers,
//! start the timers. Only the first two steps can abort startup; after that
//! every failure stays inside the cycle that produced it.

use crate::config::AppConfig;
use crate::error::AppResult;
use ledlink_ingest::{
    ExchangeRateClient, ExchangeScheduler, OpenMeteoClient, Pipeline, WeatherScheduler,
};
use ledlink_mqtt::{ConnectionManager, DynPublisher, PublishOptions};
use ledlink_store::Store;
use ledlink_telemetry::Metrics;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Running bridge.
pub struct Application {
    config: AppConfig,
    broker: Arc<ConnectionManager>,
    pipeline: Arc<Pipeline>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl Application {
    /// Open storage, connect to the broker and start both schedulers.
    pub async fn start(config: AppConfig) -> AppResult<Self> {
        config.validate()?;

        let store = Arc::new(Store::open(&config.database.path)?);
        info!(path = %config.database.path.display(), "Database ready");

        let broker = Arc::new(ConnectionManager::new(config.broker.clone(), store.clone())?);
        broker.connect().await?;

        let pipeline = Arc::new(build_pipeline(&config, store, broker.clone())?);

        let shutdown = CancellationToken::new();
        let tracker = TaskTracker::new();

        pipeline.weather().start(
            config.schedule.weather_interval(),
            shutdown.clone(),
            tracker.clone(),
        );
        pipeline.exchange().start(
            config.schedule.exchange_interval(),
            shutdown.clone(),
            tracker.clone(),
        );

        if let Some(path) = &config.telemetry.metrics_textfile {
            spawn_metrics_writer(
                path.clone(),
                config.telemetry.metrics_interval(),
                shutdown.clone(),
                &tracker,
            );
        }

        info!(
            weather_interval_secs = config.schedule.weather_interval_secs,
            exchange_interval_secs = config.schedule.exchange_interval_secs,
            "Bridge started"
        );

        Ok(Self {
            config,
            broker,
            pipeline,
            shutdown,
            tracker,
        })
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    /// Run until Ctrl-C, then shut down.
    pub async fn run(self) -> AppResult<()> {
        tokio::signal::ctrl_c().await?;
        info!("Shutdown signal received");
        self.shutdown().await
    }

    /// Stop the timers, wait for in-flight cycles up to the shutdown timeout,
    /// then close the broker connection.
    pub async fn shutdown(self) -> AppResult<()> {
        self.shutdown.cancel();
        self.tracker.close();

        let timeout = self.config.schedule.shutdown_timeout();
        if tokio::time::timeout(timeout, self.tracker.wait())
            .await
            .is_err()
        {
            warn!(
                timeout_secs = timeout.as_secs(),
                remaining = self.tracker.len(),
                "In-flight cycles still running at shutdown"
            );
        }

        self.broker.close().await?;
        info!("Shutdown complete");
        Ok(())
    }
}

/// Build the sources, schedulers and facade around `publisher`.
pub fn build_pipeline(
    config: &AppConfig,
    store: Arc<Store>,
    publisher: DynPublisher,
) -> AppResult<Pipeline> {
    let options = PublishOptions::new(config.broker.qos_level()?, false);
    let base = config.apis.base_currency()?;

    let weather_source = Arc::new(OpenMeteoClient::new(config.apis.weather_url.clone())?);
    let rate_source = Arc::new(ExchangeRateClient::new(
        &config.apis.exchange_url,
        &config.apis.exchange_keyed_url,
        config.apis.exchange_api_key.as_deref(),
        &base,
    )?);
    debug!(
        keyed = config.apis.exchange_api_key.is_some(),
        "Exchange source configured"
    );

    let weather = Arc::new(WeatherScheduler::new(
        weather_source,
        store.clone(),
        publisher.clone(),
        config.topics.clone(),
        options,
        config.location.location(),
    ));
    let exchange = Arc::new(ExchangeScheduler::new(
        rate_source,
        store.clone(),
        publisher.clone(),
        config.topics.clone(),
        options,
        config.exchange.watch_list()?,
    ));

    Ok(Pipeline::new(
        weather,
        exchange,
        store,
        publisher,
        config.topics.clone(),
        config.display.clone(),
        options,
    ))
}

/// Periodically write the Prometheus registry to `path` for a textfile
/// collector. The file is replaced by rename so readers never see a partial
/// write.
pub fn spawn_metrics_writer(
    path: PathBuf,
    interval: Duration,
    shutdown: CancellationToken,
    tracker: &TaskTracker,
) -> JoinHandle<()> {
    tracker.spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = write_metrics(&path).await {
                        error!(error = %e, path = %path.display(), "Failed to write metrics");
                    }
                }
            }
        }
    })
}

async fn write_metrics(path: &Path) -> AppResult<()> {
    let text = Metrics::render()?;
    let tmp = path.with_extension("prom.tmp");
    tokio::fs::write(&tmp, text).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
