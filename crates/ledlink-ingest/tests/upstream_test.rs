//! Upstream client integration tests.
//!
//! Drives the reqwest clients and full scheduler cycles against a local
//! mock HTTP server:
//! - query construction and response decoding
//! - non-2xx statuses and undecodable bodies
//! - end-to-end weather and exchange cycles

mod common;
use common::mock_http::{MockHttpServer, Route};

use ledlink_core::{CurrencyCode, Location};
use ledlink_ingest::{
    ExchangeRateClient, ExchangeScheduler, IngestError, OpenMeteoClient, TopicConfig,
    WeatherScheduler,
};
use ledlink_mqtt::{MockPublisher, PublishOptions};
use ledlink_store::{Store, Table};
use std::sync::Arc;

const WEATHER_BODY: &str = r#"{
    "latitude": 10.75,
    "longitude": 106.625,
    "current": {
        "time": "2026-10-16T14:00",
        "temperature_2m": 29.4,
        "relative_humidity_2m": 78,
        "pressure_msl": 1009.1,
        "weather_code": 61,
        "wind_speed_10m": 7.6
    }
}"#;

const RATES_BODY: &str = r#"{
    "base": "USD",
    "date": "2026-10-16",
    "rates": {"USD": 1, "VND": 25340.5, "EUR": 0.93, "GBP": 0.8, "JPY": 150.2, "CNY": 7.28, "AUD": 1.52}
}"#;

fn usd() -> CurrencyCode {
    "USD".parse().unwrap()
}

#[tokio::test]
async fn test_open_meteo_query_and_decode() {
    let server =
        MockHttpServer::start(vec![Route::new("/v1/forecast", 200, WEATHER_BODY)]).await;
    let client = OpenMeteoClient::new(server.url("/v1/forecast")).unwrap();

    let response = client.fetch(Location::new(10.762622, 106.660172)).await.unwrap();
    let current = response.into_current().unwrap();
    assert_eq!(current.weather_code, Some(61));

    let requests = server.requests().await;
    assert_eq!(requests.len(), 1);
    assert!(requests[0].contains("latitude=10.762622"));
    assert!(requests[0].contains("longitude=106.660172"));
    assert!(requests[0].contains("timezone=auto"));
    assert!(requests[0].contains("weather_code"));

    server.shutdown();
}

#[tokio::test]
async fn test_server_error_is_fetch_error() {
    let server = MockHttpServer::start(vec![Route::new(
        "/v1/forecast",
        503,
        r#"{"reason":"maintenance"}"#,
    )])
    .await;
    let client = OpenMeteoClient::new(server.url("/v1/forecast")).unwrap();

    let err = client.fetch(Location::new(0.0, 0.0)).await.unwrap_err();
    assert!(matches!(err, IngestError::Fetch(ref msg) if msg.contains("503")));

    server.shutdown();
}

#[tokio::test]
async fn test_undecodable_body_is_schema_error() {
    let server = MockHttpServer::start(vec![Route::new("/latest", 200, "<html>oops</html>")]).await;
    let client = ExchangeRateClient::new(&server.url("/latest"), "http://unused", None, &usd())
        .unwrap();

    let err = client.fetch().await.unwrap_err();
    assert_eq!(err.kind(), "schema");

    server.shutdown();
}

#[tokio::test]
async fn test_keyed_exchange_client_path() {
    let server = MockHttpServer::start(vec![Route::new(
        "/v6/secret-key/latest/USD",
        200,
        r#"{"result":"success","base_code":"USD","conversion_rates":{"VND":25000}}"#,
    )])
    .await;
    let client = ExchangeRateClient::new(
        "http://unused",
        &server.url("/v6"),
        Some("secret-key"),
        &usd(),
    )
    .unwrap();

    let body = client.fetch().await.unwrap();
    assert_eq!(body["base_code"], "USD");

    server.shutdown();
}

#[tokio::test]
async fn test_weather_cycle_end_to_end() {
    let server =
        MockHttpServer::start(vec![Route::new("/v1/forecast", 200, WEATHER_BODY)]).await;
    let store = Arc::new(Store::open_in_memory().unwrap());
    let publisher = Arc::new(MockPublisher::new());

    let scheduler = WeatherScheduler::new(
        Arc::new(OpenMeteoClient::new(server.url("/v1/forecast")).unwrap()),
        store.clone(),
        publisher.clone(),
        TopicConfig::default(),
        PublishOptions::default(),
        Location::new(10.762622, 106.660172),
    );

    let record = scheduler.run_once().await.unwrap();
    assert_eq!(record.description, "Slight Rain");
    assert_eq!(store.count(Table::Weather).unwrap(), 1);
    assert_eq!(
        publisher.payloads_on("home/weather/led"),
        vec!["Temp: 29C Slight Rai H:78%"]
    );

    server.shutdown();
}

#[tokio::test]
async fn test_exchange_cycle_end_to_end() {
    let server = MockHttpServer::start(vec![Route::new("/v4/latest/USD", 200, RATES_BODY)]).await;
    let store = Arc::new(Store::open_in_memory().unwrap());
    let publisher = Arc::new(MockPublisher::new());
    let watch: Vec<CurrencyCode> = ["VND", "EUR", "GBP", "JPY", "CNY", "AUD"]
        .iter()
        .map(|c| c.parse().unwrap())
        .collect();

    let scheduler = ExchangeScheduler::new(
        Arc::new(
            ExchangeRateClient::new(&server.url("/v4/latest/USD"), "http://unused", None, &usd())
                .unwrap(),
        ),
        store.clone(),
        publisher.clone(),
        TopicConfig::default(),
        PublishOptions::default(),
        watch,
    );

    let records = scheduler.run_once().await.unwrap();
    assert_eq!(records.len(), 6);
    assert_eq!(store.count(Table::Exchange).unwrap(), 6);
    assert_eq!(publisher.payloads_on("home/exchange/raw").len(), 6);
    assert_eq!(
        publisher.payloads_on("home/exchange/led"),
        vec!["USD/VND: 25340.50"]
    );

    server.shutdown();
}
