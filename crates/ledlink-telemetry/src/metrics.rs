//! Prometheus metrics for ledlink.
//!
//! Covers:
//! - Broker connection state and reconnects
//! - Publishes per topic and inbound traffic
//! - Fetch cycles per domain (weather, exchange) and their duration
//! - Exchange display rotation
//!
//! # Panics
//!
//! Registration uses `unwrap()`: a failure means duplicate metric names,
//! which is a programming error caught on first use.

use crate::error::TelemetryResult;
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, register_histogram_vec,
    register_int_counter, register_int_gauge, CounterVec, Encoder, Gauge, GaugeVec, HistogramVec,
    IntCounter, IntGauge, TextEncoder,
};

/// Broker connection state (1 = connected, 0 = otherwise).
pub static BROKER_CONNECTED: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "ledlink_broker_connected",
        "Broker connection state (1=connected)"
    )
    .unwrap()
});

/// Connection state machine.
/// Labels: state (disconnected/connecting/connected/reconnecting)
pub static BROKER_STATE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "ledlink_broker_state",
        "Broker connection state machine (1=active, 0=inactive)",
        &["state"]
    )
    .unwrap()
});

pub static BROKER_RECONNECT_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "ledlink_broker_reconnect_total",
        "Total broker reconnection attempts",
        &["reason"]
    )
    .unwrap()
});

/// Labels: topic, result (ok/not_connected/error)
pub static PUBLISH_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "ledlink_publish_total",
        "Total publish attempts",
        &["topic", "result"]
    )
    .unwrap()
});

pub static INBOUND_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "ledlink_inbound_total",
        "Total inbound messages received from the broker"
    )
    .unwrap()
});

/// Labels: domain (weather/exchange), outcome (ok or error kind)
pub static CYCLE_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "ledlink_cycle_total",
        "Total fetch cycles by outcome",
        &["domain", "outcome"]
    )
    .unwrap()
});

pub static CYCLE_DURATION_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "ledlink_cycle_duration_ms",
        "Fetch cycle duration in milliseconds",
        &["domain"],
        vec![50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0, 30000.0]
    )
    .unwrap()
});

pub static ROTATION_INDEX: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "ledlink_rotation_index",
        "Next exchange display rotation index"
    )
    .unwrap()
});

const BROKER_STATES: [&str; 4] = ["disconnected", "connecting", "connected", "reconnecting"];

/// Metrics facade.
pub struct Metrics;

impl Metrics {
    /// Set the active broker state; every other state label goes to 0.
    pub fn broker_state_set(state: &str) {
        for s in BROKER_STATES {
            BROKER_STATE.with_label_values(&[s]).set(0.0);
        }
        BROKER_STATE.with_label_values(&[state]).set(1.0);
        BROKER_CONNECTED.set(if state == "connected" { 1.0 } else { 0.0 });
    }

    pub fn broker_reconnect(reason: &str) {
        BROKER_RECONNECT_TOTAL.with_label_values(&[reason]).inc();
    }

    pub fn publish(topic: &str, result: &str) {
        PUBLISH_TOTAL.with_label_values(&[topic, result]).inc();
    }

    pub fn inbound() {
        INBOUND_TOTAL.inc();
    }

    /// Record one finished cycle.
    pub fn cycle(domain: &str, outcome: &str, duration_ms: f64) {
        CYCLE_TOTAL.with_label_values(&[domain, outcome]).inc();
        CYCLE_DURATION_MS
            .with_label_values(&[domain])
            .observe(duration_ms);
    }

    pub fn rotation_index(index: usize) {
        ROTATION_INDEX.set(i64::try_from(index).unwrap_or(i64::MAX));
    }

    /// Encode every registered metric in the Prometheus text format.
    pub fn render() -> TelemetryResult<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
